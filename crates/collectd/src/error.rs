//! collectd 수신기 에러 타입
//!
//! [`CollectdError`]는 설정 로딩, 소켓 바인드, 패킷 해석 등 패킷/프로세스 단위의
//! 에러를 표현합니다. `From<CollectdError> for TelemonError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! [`SampleError`]는 값 하나만 버리고 처리를 계속하는 값 단위 에러입니다.

use telemon_core::error::{CollectorError, ConfigError, TelemonError};

use crate::types::ValueKind;

/// collectd 수신기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CollectdError {
    /// types.db / 인증 파일 / 설정 값 에러 (시작 불가)
    #[error("config error: {field}: {reason}")]
    Config {
        /// 문제가 된 설정 항목 또는 파일
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 소켓 바인드 실패 (시작 불가)
    #[error("connect error: {addr}: {reason}")]
    Connect {
        /// 바인드 대상 주소
        addr: String,
        /// 에러 사유
        reason: String,
    },

    /// 잘린 헤더/파트, 잘못된 서명, 체크섬 불일치, 값 개수/종류 불일치 등
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectdError {
    /// 프로토콜 에러를 생성합니다.
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// 설정 에러를 생성합니다.
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<CollectdError> for TelemonError {
    fn from(err: CollectdError) -> Self {
        match err {
            CollectdError::Config { field, reason } => {
                TelemonError::Config(ConfigError::InvalidValue { field, reason })
            }
            CollectdError::Io(e) => TelemonError::Io(e),
            other => TelemonError::Collector(CollectorError::StartFailed(other.to_string())),
        }
    }
}

/// 값 단위 에러 -- 해당 샘플만 버리고 다음 값으로 진행합니다.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    /// 이름 변환기 실패
    #[error("converter for plugin '{plugin}' failed: {reason}")]
    Convert {
        /// 플러그인 이름
        plugin: String,
        /// 실패 사유
        reason: String,
    },

    /// 이전 관측 이후 시각이 증가하지 않음
    #[error("invalid {kind} update for {host}:{name} (time {current} <= {prev})")]
    TimeNotAdvancing {
        /// 값 종류
        kind: ValueKind,
        /// 호스트
        host: String,
        /// 정규 이름
        name: String,
        /// 이전 시각
        prev: f64,
        /// 현재 시각
        current: f64,
    },

    /// types.db 범위를 벗어난 값
    #[error("invalid value {value} for {type_name}/{value_name} (range {min:?}..{max:?})")]
    OutOfRange {
        /// types.db 타입 이름
        type_name: String,
        /// 필드 이름
        value_name: String,
        /// 계산된 값
        value: f64,
        /// 하한
        min: Option<f64>,
        /// 상한
        max: Option<f64>,
    },
}
