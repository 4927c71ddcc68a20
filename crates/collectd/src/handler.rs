//! 패킷 핸들러 -- 보안 검사부터 범위 검증까지 패킷 하나를 처리합니다.
//!
//! ```text
//! bytes -> SecurityLayer -> PacketParser -> ConverterRegistry -> ValueCalculator -> RangeValidator
//! ```
//!
//! 핸들러는 패킷 단위의 단일 격리 경계입니다. 프로토콜 에러는 해당 패킷의
//! 나머지를 버리고, 값 단위 에러는 해당 값만 버립니다. 어떤 경우에도
//! 에러는 로그와 메트릭으로만 드러나며 호출자에게 전파되지 않습니다.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info};

use telemon_core::metrics as m;
use telemon_core::types::MetricSample;

use crate::calculator::{RangeValidator, ValueCalculator};
use crate::converter::ConverterRegistry;
use crate::error::SampleError;
use crate::parser::PacketParser;
use crate::security::SecurityLayer;
use crate::types::{RawSample, ValueKind};

/// collectd 패킷 핸들러
///
/// 직전 관측 캐시를 소유하므로 수집 세션마다 새로 생성합니다.
pub struct CollectdHandler {
    security: SecurityLayer,
    parser: PacketParser,
    converters: ConverterRegistry,
    calculator: ValueCalculator,
    validator: RangeValidator,
    last_sample: Option<RawSample>,
}

impl CollectdHandler {
    /// 구성 요소로 핸들러를 생성합니다.
    pub fn new(security: SecurityLayer, parser: PacketParser, converters: ConverterRegistry) -> Self {
        let validator = RangeValidator::new(Arc::clone(parser.catalog()));
        Self {
            security,
            parser,
            converters,
            calculator: ValueCalculator::new(),
            validator,
            last_sample: None,
        }
    }

    /// 데이터그램 하나를 처리하여 방출할 샘플 목록을 반환합니다.
    pub fn handle_packet(&mut self, data: &[u8]) -> Vec<MetricSample> {
        let Self {
            security,
            parser,
            converters,
            calculator,
            validator,
            last_sample,
        } = self;

        let payload = match security.open(data) {
            Ok(payload) => payload,
            Err(e) => {
                counter!(
                    m::COLLECTD_PROTOCOL_ERRORS_TOTAL,
                    m::LABEL_SECURITY_LEVEL => security.min_level().to_string()
                )
                .increment(1);
                error!(error = %e, "protocol error in security layer");
                return Vec::new();
            }
        };

        let mut emitted = Vec::new();
        for result in parser.parse(&payload) {
            let raw = match result {
                Ok(raw) => raw,
                Err(e) => {
                    counter!(m::COLLECTD_PROTOCOL_ERRORS_TOTAL).increment(1);
                    error!(error = %e, "protocol error");
                    if let Some(last) = last_sample.as_ref() {
                        info!(last_sample = %last, "last sample before protocol error");
                    }
                    break;
                }
            };

            let outcome = process_sample(converters, calculator, validator, &raw);
            *last_sample = Some(raw);

            match outcome {
                Ok(Some(sample)) => {
                    counter!(m::COLLECTD_SAMPLES_EMITTED_TOTAL).increment(1);
                    emitted.push(sample);
                }
                Ok(None) => {}
                Err(e) => log_sample_error(&e, last_sample.as_ref()),
            }
        }

        emitted
    }

    /// 마지막으로 디코딩한 원시 샘플을 반환합니다.
    pub fn last_sample(&self) -> Option<&RawSample> {
        self.last_sample.as_ref()
    }

    /// 값 계산기를 반환합니다.
    pub fn calculator(&self) -> &ValueCalculator {
        &self.calculator
    }

    /// 보안 레이어를 반환합니다.
    pub fn security(&self) -> &SecurityLayer {
        &self.security
    }
}

/// 변환 → 계산 → 범위 검증
fn process_sample(
    converters: &ConverterRegistry,
    calculator: &mut ValueCalculator,
    validator: &RangeValidator,
    raw: &RawSample,
) -> Result<Option<MetricSample>, SampleError> {
    let Some(converted) = converters.convert(raw)? else {
        return Ok(None);
    };
    let Some(value) = calculator.calculate(&converted)? else {
        return Ok(None);
    };

    let type_name = raw.type_name.as_deref().unwrap_or_default();
    let value = validator.check(type_name, &raw.value_name, value)?;

    Ok(Some(MetricSample {
        host: converted.host,
        name: converted.name,
        value,
        timestamp: converted.time,
    }))
}

fn log_sample_error(err: &SampleError, last: Option<&RawSample>) {
    let last = last.map(ToString::to_string).unwrap_or_default();
    match err {
        SampleError::Convert { .. } => {
            counter!(m::COLLECTD_SAMPLES_DROPPED_TOTAL, m::LABEL_REASON => m::REASON_CONVERT)
                .increment(1);
            error!(error = %err, "sample converter failed");
        }
        SampleError::TimeNotAdvancing { kind, .. } => {
            counter!(m::COLLECTD_SAMPLES_DROPPED_TOTAL, m::LABEL_REASON => m::REASON_TIME)
                .increment(1);
            if *kind == ValueKind::Derive {
                debug!(error = %err, last_sample = %last, "dropping sample");
            } else {
                error!(error = %err, "dropping sample");
                info!(last_sample = %last, "last sample");
            }
        }
        SampleError::OutOfRange { .. } => {
            counter!(m::COLLECTD_SAMPLES_DROPPED_TOTAL, m::LABEL_REASON => m::REASON_RANGE)
                .increment(1);
            debug!(error = %err, last_sample = %last, "dropping sample");
        }
    }
}
