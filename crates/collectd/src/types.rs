//! collectd 값 모델 -- 값 종류, 원시 값, 디코딩된 샘플

use std::fmt;

/// collectd 데이터 소스 종류
///
/// 와이어 상의 타입 바이트와 types.db의 종류 문자열 모두에 대응합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 단조 증가 카운터, 감소 시 32/64비트 오버플로우로 해석
    Counter,
    /// 순간 값
    Gauge,
    /// 부호 있는 카운터, 오버플로우 보정 없음
    Derive,
    /// 읽을 때마다 초기화되는 카운터
    Absolute,
}

impl ValueKind {
    /// 와이어 타입 바이트(0..=3)에서 종류를 해석합니다.
    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Counter),
            1 => Some(Self::Gauge),
            2 => Some(Self::Derive),
            3 => Some(Self::Absolute),
            _ => None,
        }
    }

    /// 와이어 타입 바이트를 반환합니다.
    pub fn wire_code(self) -> u8 {
        match self {
            Self::Counter => 0,
            Self::Gauge => 1,
            Self::Derive => 2,
            Self::Absolute => 3,
        }
    }

    /// types.db 종류 문자열(`COUNTER`, `GAUGE`, `DERIVE`, `ABSOLUTE`)을 해석합니다.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "COUNTER" => Some(Self::Counter),
            "GAUGE" => Some(Self::Gauge),
            "DERIVE" => Some(Self::Derive),
            "ABSOLUTE" => Some(Self::Absolute),
            _ => None,
        }
    }

    /// COUNTER/DERIVE 호환 쌍인지 확인합니다.
    pub fn counter_derive_pair(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Counter, Self::Derive) | (Self::Derive, Self::Counter)
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "COUNTER"),
            Self::Gauge => write!(f, "GAUGE"),
            Self::Derive => write!(f, "DERIVE"),
            Self::Absolute => write!(f, "ABSOLUTE"),
        }
    }
}

/// 와이어에서 디코딩한 원시 값
///
/// COUNTER/ABSOLUTE는 빅엔디언 u64, DERIVE는 빅엔디언 i64,
/// GAUGE는 리틀엔디언 f64로 인코딩됩니다.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// COUNTER 값
    Counter(u64),
    /// GAUGE 값
    Gauge(f64),
    /// DERIVE 값
    Derive(i64),
    /// ABSOLUTE 값
    Absolute(u64),
}

impl Value {
    /// 지정한 종류의 레이아웃으로 8바이트를 디코딩합니다.
    pub fn decode(kind: ValueKind, bytes: [u8; 8]) -> Self {
        match kind {
            ValueKind::Counter => Self::Counter(u64::from_be_bytes(bytes)),
            ValueKind::Gauge => Self::Gauge(f64::from_le_bytes(bytes)),
            ValueKind::Derive => Self::Derive(i64::from_be_bytes(bytes)),
            ValueKind::Absolute => Self::Absolute(u64::from_be_bytes(bytes)),
        }
    }

    /// 와이어 레이아웃으로 8바이트를 인코딩합니다.
    pub fn encode(self) -> [u8; 8] {
        match self {
            Self::Counter(v) | Self::Absolute(v) => v.to_be_bytes(),
            Self::Gauge(v) => v.to_le_bytes(),
            Self::Derive(v) => v.to_be_bytes(),
        }
    }

    /// 값 종류를 반환합니다.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Counter(_) => ValueKind::Counter,
            Self::Gauge(_) => ValueKind::Gauge,
            Self::Derive(_) => ValueKind::Derive,
            Self::Absolute(_) => ValueKind::Absolute,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter(v) | Self::Absolute(v) => write!(f, "{v}"),
            Self::Gauge(v) => write!(f, "{v}"),
            Self::Derive(v) => write!(f, "{v}"),
        }
    }
}

/// 패킷에서 디코딩된 값 하나
///
/// 값 파트를 만나는 시점까지 누적된 컨텍스트(host, plugin, type 등)의
/// 복사본과 해당 값의 필드 이름/종류/원시 값을 담습니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSample {
    /// 송신 호스트
    pub host: Option<String>,
    /// 플러그인 이름
    pub plugin: Option<String>,
    /// 플러그인 인스턴스
    pub plugin_instance: Option<String>,
    /// types.db 타입 이름
    pub type_name: Option<String>,
    /// 타입 인스턴스
    pub type_instance: Option<String>,
    /// 샘플 시각 (초)
    pub time: Option<f64>,
    /// 수집 주기 (초)
    pub interval: Option<f64>,
    /// types.db 필드 이름
    pub value_name: String,
    /// 원시 값 (종류 포함)
    pub value: Option<Value>,
}

impl RawSample {
    /// 값 종류를 반환합니다.
    pub fn value_kind(&self) -> Option<ValueKind> {
        self.value.as_ref().map(Value::kind)
    }
}

impl fmt::Display for RawSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        write!(
            f,
            "host={} plugin={} plugin_instance={} type={} type_instance={} value_name={}",
            field(&self.host),
            field(&self.plugin),
            field(&self.plugin_instance),
            field(&self.type_name),
            field(&self.type_instance),
            self.value_name,
        )?;
        if let Some(value) = &self.value {
            write!(f, " value={value} kind={}", value.kind())?;
        }
        if let Some(time) = self.time {
            write!(f, " time={time}")?;
        }
        Ok(())
    }
}

/// 상태와 출력을 추적하는 고유 식별자 `(host, 정규 이름)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey {
    /// 호스트
    pub host: String,
    /// 정규 이름
    pub name: String,
}

impl CanonicalKey {
    /// 새 키를 생성합니다.
    pub fn new(host: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.name)
    }
}
