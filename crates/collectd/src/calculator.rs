//! 값 계산기 -- COUNTER/GAUGE/DERIVE/ABSOLUTE 의미론과 범위 검증
//!
//! [`ValueCalculator`]는 `(host, 정규 이름)`별 직전 관측값 캐시를 소유합니다.
//! 캐시는 수집 세션 하나 동안만 유지되며, 결과 방출 여부와 관계없이
//! 매 관측마다 원시 값과 시각으로 갱신됩니다.
//!
//! | 종류 | 방출 값 |
//! |------|---------|
//! | GAUGE | 값 그대로 |
//! | COUNTER | `(v - p) / (t - pt)`, 감소 시 2^32 또는 2^64 오버플로우 보정 |
//! | DERIVE | `abs(v - p) / (t - pt)` |
//! | ABSOLUTE | `v / (t - pt)` |
//!
//! GAUGE를 제외한 종류는 첫 관측에서 아무것도 방출하지 않으며,
//! 시각이 엄격히 증가하지 않으면 [`SampleError::TimeNotAdvancing`]을 반환합니다.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::converter::ConvertedSample;
use crate::error::SampleError;
use crate::types::{CanonicalKey, Value};
use crate::types_db::TypeCatalog;

/// 32비트 카운터 오버플로우 경계
const WRAP_32: i128 = 1 << 32;
/// 64비트 카운터 오버플로우 경계
const WRAP_64: i128 = 1 << 64;

/// 직전 관측
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrevValue {
    /// 원시 값 (보정 전)
    pub value: Value,
    /// 시각 (초)
    pub time: f64,
}

/// 상태를 가진 값 계산기
#[derive(Debug, Default)]
pub struct ValueCalculator {
    prev: HashMap<CanonicalKey, PrevValue>,
}

impl ValueCalculator {
    /// 빈 캐시로 계산기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 샘플의 방출 값을 계산합니다.
    ///
    /// 첫 관측이면 `Ok(None)`을 반환합니다.
    pub fn calculate(&mut self, sample: &ConvertedSample) -> Result<Option<f64>, SampleError> {
        let key = CanonicalKey::new(sample.host.as_str(), sample.name.as_str());
        let current = PrevValue {
            value: sample.value,
            time: sample.time,
        };
        let prev = self.prev.insert(key, current);

        if let Value::Gauge(v) = sample.value {
            return Ok(Some(v));
        }

        // 종류가 바뀐 경우도 첫 관측으로 취급
        let Some(prev) = prev.filter(|p| p.value.kind() == sample.value.kind()) else {
            return Ok(None);
        };

        if sample.time <= prev.time {
            return Err(SampleError::TimeNotAdvancing {
                kind: sample.kind,
                host: sample.host.clone(),
                name: sample.name.clone(),
                prev: prev.time,
                current: sample.time,
            });
        }
        let elapsed = sample.time - prev.time;

        let rate = match (prev.value, sample.value) {
            (Value::Counter(prev_raw), Value::Counter(raw)) => {
                let (p, mut v) = (i128::from(prev_raw), i128::from(raw));
                if v < p {
                    debug!(
                        host = sample.host.as_str(),
                        name = sample.name.as_str(),
                        prev = prev_raw,
                        current = raw,
                        "COUNTER wrap-around"
                    );
                    v += if p < WRAP_32 { WRAP_32 } else { WRAP_64 };
                }
                (v - p) as f64 / elapsed
            }
            (Value::Derive(p), Value::Derive(v)) => {
                (i128::from(v) - i128::from(p)).abs() as f64 / elapsed
            }
            (Value::Absolute(_), Value::Absolute(v)) => v as f64 / elapsed,
            _ => return Ok(None),
        };

        Ok(Some(rate))
    }

    /// 키의 직전 관측을 반환합니다.
    pub fn previous(&self, host: &str, name: &str) -> Option<&PrevValue> {
        self.prev.get(&CanonicalKey::new(host, name))
    }

    /// 캐시 항목 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.prev.len()
    }

    /// 캐시가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.prev.is_empty()
    }
}

/// types.db 범위 검증기
///
/// 범위를 벗어난 값은 보정하지 않고 버립니다.
#[derive(Debug, Clone)]
pub struct RangeValidator {
    catalog: Arc<TypeCatalog>,
}

impl RangeValidator {
    /// 카탈로그로 검증기를 생성합니다.
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self { catalog }
    }

    /// 값을 `(type, value_name)`의 범위와 대조합니다.
    ///
    /// 범위 정보가 없으면 에러 로그를 남기고 값을 그대로 통과시킵니다.
    pub fn check(&self, type_name: &str, value_name: &str, value: f64) -> Result<f64, SampleError> {
        let Some(field) = self.catalog.field(type_name, value_name) else {
            error!(type_name, value_name, "no range information in types.db");
            return Ok(value);
        };

        if field.contains(value) {
            Ok(value)
        } else {
            Err(SampleError::OutOfRange {
                type_name: type_name.to_owned(),
                value_name: value_name.to_owned(),
                value,
                min: field.min,
                max: field.max,
            })
        }
    }
}
