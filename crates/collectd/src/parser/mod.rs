//! 패킷 파서 -- collectd 바이너리 프로토콜(TLV 파트)을 디코딩합니다.
//!
//! 각 파트는 `[u16 type][u16 length(헤더 포함)][payload]` 형식이며 빅엔디언입니다.
//! host/time/plugin 등 스칼라 파트는 실행 중인 컨텍스트에 누적되고,
//! values 파트(`0x0006`)를 만날 때마다 값 하나당 [`RawSample`] 하나를 생성합니다.
//!
//! [`PacketParser::parse`]는 지연 이터레이터 [`Samples`]를 반환합니다.
//! 에러가 발생하면 그 에러를 한 번 내보낸 뒤 이터레이터가 종료되며,
//! 그 전에 생성된 샘플은 그대로 유효합니다.
//!
//! # 사용 예시
//! ```ignore
//! use telemon_collectd::parser::{PacketBuilder, PacketParser};
//!
//! let parser = PacketParser::new(catalog);
//! for sample in parser.parse(&packet) {
//!     let sample = sample?;
//!     println!("{sample}");
//! }
//! ```

pub mod builder;

pub use builder::PacketBuilder;

use std::iter::FusedIterator;
use std::sync::Arc;

use bytes::Buf;
use tracing::debug;

use crate::error::CollectdError;
use crate::types::{RawSample, Value, ValueKind};
use crate::types_db::TypeCatalog;

// ─── 파트 타입 ──────────────────────────────────────────────────────

/// 호스트명 (NUL 종료 문자열)
pub const TYPE_HOST: u16 = 0x0000;
/// 시각 (u64 초)
pub const TYPE_TIME: u16 = 0x0001;
/// 플러그인 이름
pub const TYPE_PLUGIN: u16 = 0x0002;
/// 플러그인 인스턴스
pub const TYPE_PLUGIN_INSTANCE: u16 = 0x0003;
/// types.db 타입 이름
pub const TYPE_TYPE: u16 = 0x0004;
/// 타입 인스턴스
pub const TYPE_TYPE_INSTANCE: u16 = 0x0005;
/// 값 목록
pub const TYPE_VALUES: u16 = 0x0006;
/// 수집 주기 (u64 초)
pub const TYPE_INTERVAL: u16 = 0x0007;
/// 고해상도 시각 (u64 × 2^-30 초)
pub const TYPE_TIME_HIRES: u16 = 0x0008;
/// 고해상도 수집 주기
pub const TYPE_INTERVAL_HIRES: u16 = 0x0009;
/// 알림 메시지
pub const TYPE_MESSAGE: u16 = 0x0100;
/// 알림 심각도
pub const TYPE_SEVERITY: u16 = 0x0101;
/// 서명 봉투
pub const TYPE_SIGN_SHA256: u16 = crate::security::TYPE_SIGN_SHA256;
/// 암호화 봉투
pub const TYPE_ENCR_AES256: u16 = crate::security::TYPE_ENCR_AES256;

/// 파트 헤더 길이
pub const PART_HEADER_LEN: usize = 4;

/// 고해상도 시각 단위 (2^-30 초)
pub const HIRES_SCALE: f64 = 1.0 / (1u64 << 30) as f64;

/// collectd 패킷 파서
///
/// 값 파트의 개수와 종류를 타입 카탈로그와 대조하며, 원시 값은
/// 카탈로그에 선언된 종류의 레이아웃으로 디코딩합니다.
#[derive(Debug, Clone)]
pub struct PacketParser {
    catalog: Arc<TypeCatalog>,
    counter_eq_derive: bool,
    strict_parts: bool,
}

impl PacketParser {
    /// 타입 카탈로그로 파서를 생성합니다.
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self {
            catalog,
            counter_eq_derive: false,
            strict_parts: false,
        }
    }

    /// COUNTER/DERIVE 종류 불일치를 허용할지 설정합니다.
    pub fn counter_eq_derive(mut self, enabled: bool) -> Self {
        self.counter_eq_derive = enabled;
        self
    }

    /// 알 수 없는 파트 타입을 에러로 처리할지 설정합니다.
    pub fn strict_parts(mut self, enabled: bool) -> Self {
        self.strict_parts = enabled;
        self
    }

    /// 타입 카탈로그를 반환합니다.
    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// 패킷 하나를 지연 파싱하는 이터레이터를 반환합니다.
    pub fn parse<'a>(&'a self, data: &'a [u8]) -> Samples<'a> {
        Samples {
            parser: self,
            remaining: data,
            context: RawSample::default(),
            pending: Vec::new().into_iter(),
            done: false,
        }
    }

    /// values 파트를 `(필드 이름, 값)` 목록으로 디코딩합니다.
    fn decode_values(
        &self,
        type_name: &str,
        mut payload: &[u8],
    ) -> Result<Vec<(String, Value)>, CollectdError> {
        if payload.len() < 2 {
            return Err(CollectdError::protocol("Invalid value structure length."));
        }
        let count = usize::from(payload.get_u16());
        if payload.len() != 9 * count {
            return Err(CollectdError::protocol("Invalid value structure length."));
        }

        let fields = self.catalog.get(type_name)?;
        if count != fields.len() {
            return Err(CollectdError::protocol(
                "Values different than types.db info.",
            ));
        }

        let (kinds, values) = payload.split_at(count);
        let mut decoded = Vec::with_capacity(count);
        for ((field, &wire), chunk) in fields.iter().zip(kinds).zip(values.chunks_exact(8)) {
            match ValueKind::from_wire(wire) {
                Some(kind) if kind == field.kind => {}
                Some(kind) if self.counter_eq_derive && kind.counter_derive_pair(field.kind) => {
                    debug!(
                        type_name,
                        field = field.name.as_str(),
                        "type mismatch (counter/derive), using types.db kind"
                    );
                }
                _ => return Err(CollectdError::protocol("Type mismatch with types.db")),
            }

            let bytes: [u8; 8] = chunk
                .try_into()
                .map_err(|_| CollectdError::protocol("Invalid value structure length."))?;
            decoded.push((field.name.clone(), Value::decode(field.kind, bytes)));
        }

        Ok(decoded)
    }
}

/// 패킷 하나에서 생성되는 샘플 이터레이터
///
/// 에러를 한 번 내보내면 더 이상 아무것도 생성하지 않습니다.
pub struct Samples<'a> {
    parser: &'a PacketParser,
    remaining: &'a [u8],
    context: RawSample,
    pending: std::vec::IntoIter<RawSample>,
    done: bool,
}

impl Samples<'_> {
    /// 다음 파트 하나를 처리합니다.
    fn next_part(&mut self) -> Result<(), CollectdError> {
        if self.remaining.len() < PART_HEADER_LEN {
            return Err(CollectdError::protocol("Truncated header."));
        }
        let mut header = &self.remaining[..PART_HEADER_LEN];
        let part_type = header.get_u16();
        let part_len = usize::from(header.get_u16());

        if part_len < PART_HEADER_LEN {
            return Err(CollectdError::protocol(format!(
                "Invalid part length {part_len} for part type 0x{part_type:04x}"
            )));
        }
        if self.remaining.len() < part_len {
            return Err(CollectdError::protocol("Truncated value."));
        }

        let payload = &self.remaining[PART_HEADER_LEN..part_len];
        self.remaining = &self.remaining[part_len..];

        match part_type {
            TYPE_HOST => self.context.host = Some(parse_string(payload)?),
            TYPE_TIME => self.context.time = Some(parse_time(payload)?),
            TYPE_TIME_HIRES => self.context.time = Some(parse_time_hires(payload)?),
            TYPE_PLUGIN => self.context.plugin = Some(parse_string(payload)?),
            TYPE_PLUGIN_INSTANCE => self.context.plugin_instance = Some(parse_string(payload)?),
            TYPE_TYPE => self.context.type_name = Some(parse_string(payload)?),
            TYPE_TYPE_INSTANCE => self.context.type_instance = Some(parse_string(payload)?),
            TYPE_INTERVAL => self.context.interval = Some(parse_time(payload)?),
            TYPE_INTERVAL_HIRES => self.context.interval = Some(parse_time_hires(payload)?),
            TYPE_VALUES => self.emit_values(payload)?,
            TYPE_MESSAGE | TYPE_SEVERITY | TYPE_SIGN_SHA256 | TYPE_ENCR_AES256 => {
                debug!(part_type = format_args!("0x{part_type:04x}"), "ignoring part type");
            }
            _ if self.parser.strict_parts => {
                return Err(CollectdError::protocol(format!(
                    "Invalid part type: 0x{part_type:04x}"
                )));
            }
            _ => {
                debug!(part_type = format_args!("0x{part_type:04x}"), "ignoring unknown part type");
            }
        }

        Ok(())
    }

    fn emit_values(&mut self, payload: &[u8]) -> Result<(), CollectdError> {
        let type_name = self
            .context
            .type_name
            .as_deref()
            .ok_or_else(|| CollectdError::protocol("Values part before type part."))?;

        let samples: Vec<RawSample> = self
            .parser
            .decode_values(type_name, payload)?
            .into_iter()
            .map(|(value_name, value)| RawSample {
                value_name,
                value: Some(value),
                ..self.context.clone()
            })
            .collect();

        self.pending = samples.into_iter();
        Ok(())
    }
}

impl Iterator for Samples<'_> {
    type Item = Result<RawSample, CollectdError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(sample) = self.pending.next() {
                return Some(Ok(sample));
            }
            if self.done || self.remaining.is_empty() {
                return None;
            }
            if let Err(e) = self.next_part() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

impl FusedIterator for Samples<'_> {}

fn parse_string(payload: &[u8]) -> Result<String, CollectdError> {
    match payload.split_last() {
        Some((&0, text)) => std::str::from_utf8(text)
            .map(str::to_owned)
            .map_err(|_| CollectdError::protocol("Invalid string detected.")),
        _ => Err(CollectdError::protocol("Invalid string detected.")),
    }
}

fn read_u64(mut payload: &[u8], what: &str) -> Result<u64, CollectdError> {
    if payload.len() != 8 {
        return Err(CollectdError::protocol(format!(
            "Invalid {what} data length."
        )));
    }
    Ok(payload.get_u64())
}

fn parse_time(payload: &[u8]) -> Result<f64, CollectdError> {
    read_u64(payload, "time").map(|v| v as f64)
}

fn parse_time_hires(payload: &[u8]) -> Result<f64, CollectdError> {
    read_u64(payload, "hires time").map(|v| v as f64 * HIRES_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Arc<TypeCatalog> {
        let mut catalog = TypeCatalog::new();
        catalog.load_str(
            "cpu value:DERIVE:0:U\n\
             counter value:COUNTER:U:U\n\
             if_octets rx:DERIVE:0:U, tx:DERIVE:0:U\n\
             memory value:GAUGE:0:281474976710656\n",
        );
        Arc::new(catalog)
    }

    fn collect(parser: &PacketParser, data: &[u8]) -> Vec<Result<RawSample, CollectdError>> {
        parser.parse(data).collect()
    }

    #[test]
    fn round_trip_single_counter() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new()
            .host("h1")
            .time(10)
            .plugin("cpu")
            .plugin_instance("0")
            .type_name("counter")
            .type_instance("user")
            .values(&[Value::Counter(100)])
            .build();

        let samples = collect(&parser, &packet);
        assert_eq!(samples.len(), 1);
        let sample = samples[0].as_ref().unwrap();
        assert_eq!(sample.host.as_deref(), Some("h1"));
        assert_eq!(sample.plugin.as_deref(), Some("cpu"));
        assert_eq!(sample.plugin_instance.as_deref(), Some("0"));
        assert_eq!(sample.type_name.as_deref(), Some("counter"));
        assert_eq!(sample.type_instance.as_deref(), Some("user"));
        assert_eq!(sample.value_name, "value");
        assert_eq!(sample.value, Some(Value::Counter(100)));
        assert_eq!(sample.time, Some(10.0));
    }

    #[test]
    fn one_sample_per_value() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new()
            .host("h1")
            .plugin("interface")
            .type_name("if_octets")
            .values(&[Value::Derive(1), Value::Derive(2)])
            .build();

        let names: Vec<String> = parser
            .parse(&packet)
            .map(|s| s.unwrap().value_name)
            .collect();
        assert_eq!(names, ["rx", "tx"]);
    }

    #[test]
    fn context_carries_across_values_parts() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new()
            .host("h1")
            .time(5)
            .plugin("memory")
            .type_name("memory")
            .type_instance("used")
            .values(&[Value::Gauge(1.0)])
            .type_instance("free")
            .values(&[Value::Gauge(2.0)])
            .build();

        let samples: Vec<RawSample> = parser.parse(&packet).map(Result::unwrap).collect();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].host.as_deref(), Some("h1"));
        assert_eq!(samples[1].type_instance.as_deref(), Some("free"));
        assert_eq!(samples[1].value, Some(Value::Gauge(2.0)));
    }

    #[test]
    fn hires_time_is_scaled() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new()
            .time_hires(1.5)
            .type_name("memory")
            .values(&[Value::Gauge(0.0)])
            .build();
        let sample = parser.parse(&packet).next().unwrap().unwrap();
        assert_eq!(sample.time, Some(1.5));
    }

    #[test]
    fn truncated_part_is_error_and_fuses() {
        let parser = PacketParser::new(catalog());
        let mut packet = PacketBuilder::new().host("h1").build();
        packet.truncate(packet.len() - 1);

        let mut iter = parser.parse(&packet);
        let err = iter.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("Truncated"));
        assert!(iter.next().is_none());
    }

    #[test]
    fn truncated_header_is_error() {
        let parser = PacketParser::new(catalog());
        let results = collect(&parser, &[0x00, 0x00, 0x00]);
        assert!(results[0].as_ref().unwrap_err().to_string().contains("Truncated header"));
    }

    #[test]
    fn part_length_below_header_is_error() {
        let parser = PacketParser::new(catalog());
        let results = collect(&parser, &[0x00, 0x00, 0x00, 0x02]);
        assert!(results[0].is_err());
    }

    #[test]
    fn samples_before_error_are_kept() {
        let parser = PacketParser::new(catalog());
        let mut packet = PacketBuilder::new()
            .type_name("memory")
            .values(&[Value::Gauge(3.0)])
            .build();
        packet.extend_from_slice(&[0x00, 0x00]);

        let results = collect(&parser, &packet);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn string_without_nul_is_rejected() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new().part(TYPE_HOST, b"h1").build();
        let err = parser.parse(&packet).next().unwrap().unwrap_err();
        assert!(err.to_string().contains("Invalid string"));
    }

    #[test]
    fn time_with_bad_length_is_rejected() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new().part(TYPE_TIME, &[0u8; 4]).build();
        assert!(parser.parse(&packet).next().unwrap().is_err());
    }

    #[test]
    fn value_count_mismatch_with_catalog() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new()
            .type_name("if_octets")
            .values(&[Value::Derive(1)])
            .build();
        let err = parser.parse(&packet).next().unwrap().unwrap_err();
        assert!(err.to_string().contains("types.db"));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new()
            .type_name("cpu")
            .values(&[Value::Gauge(1.0)])
            .build();
        let err = parser.parse(&packet).next().unwrap().unwrap_err();
        assert!(err.to_string().contains("Type mismatch"));
    }

    #[test]
    fn counter_derive_mismatch_allowed_with_flag() {
        let packet = PacketBuilder::new()
            .type_name("cpu")
            .values(&[Value::Counter(42)])
            .build();

        let strict = PacketParser::new(catalog());
        assert!(strict.parse(&packet).next().unwrap().is_err());

        let lenient = PacketParser::new(catalog()).counter_eq_derive(true);
        let sample = lenient.parse(&packet).next().unwrap().unwrap();
        // 카탈로그 종류(DERIVE)로 디코딩
        assert_eq!(sample.value, Some(Value::Derive(42)));
    }

    #[test]
    fn values_without_type_is_error() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new().values(&[Value::Gauge(1.0)]).build();
        assert!(parser.parse(&packet).next().unwrap().is_err());
    }

    #[test]
    fn unknown_type_in_catalog_is_error() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new()
            .type_name("nope")
            .values(&[Value::Gauge(1.0)])
            .build();
        assert!(parser.parse(&packet).next().unwrap().is_err());
    }

    #[test]
    fn bad_values_length_is_error() {
        let parser = PacketParser::new(catalog());
        let packet = PacketBuilder::new()
            .type_name("memory")
            .part(TYPE_VALUES, &[0x00, 0x01, 0x01, 0x00])
            .build();
        let err = parser.parse(&packet).next().unwrap().unwrap_err();
        assert!(err.to_string().contains("value structure length"));
    }

    #[test]
    fn unknown_parts_skipped_unless_strict() {
        let packet = PacketBuilder::new()
            .part(0x7777, b"junk")
            .type_name("memory")
            .values(&[Value::Gauge(1.0)])
            .build();

        let lenient = PacketParser::new(catalog());
        assert_eq!(lenient.parse(&packet).filter(Result::is_ok).count(), 1);

        let strict = PacketParser::new(catalog()).strict_parts(true);
        let err = strict.parse(&packet).next().unwrap().unwrap_err();
        assert!(err.to_string().contains("0x7777"));
    }

    #[test]
    fn notification_parts_are_ignored() {
        let parser = PacketParser::new(catalog()).strict_parts(true);
        let packet = PacketBuilder::new()
            .part(TYPE_MESSAGE, b"hello\0")
            .part(TYPE_SEVERITY, &[0u8; 8])
            .build();
        assert_eq!(parser.parse(&packet).count(), 0);
    }

    #[test]
    fn empty_packet_yields_nothing() {
        let parser = PacketParser::new(catalog());
        assert_eq!(parser.parse(&[]).count(), 0);
    }
}
