//! 이름 변환기 -- 플러그인별 규칙으로 정규 메트릭 이름을 만듭니다.
//!
//! [`ConverterRegistry`]는 플러그인 이름 → `(전략, 우선순위)` 매핑입니다.
//! `cpu`, `interface`, `memory`와 폴백 `_default`가 내장되어 있으며
//! 우선순위는 모두 [`BUILTIN_PRIORITY`]입니다.
//!
//! 같은 이름으로 다시 등록하면 새 우선순위가 기존보다 **엄격히 클 때만** 교체됩니다.
//!
//! # 내장 규칙
//! | 플러그인 | 이름 세그먼트 |
//! |----------|---------------|
//! | `cpu` | `cpu`, plugin_instance, type_instance |
//! | `interface` | `interface`, plugin_instance?, type_instance?, type, value_name |
//! | `memory` | `memory`, type_instance |
//! | `_default` | plugin, plugin_instance?, type (`value` 제외), type_instance?, value_name (`value` 제외) |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::error::SampleError;
use crate::types::{RawSample, Value, ValueKind};

/// 폴백 변환기 이름
pub const DEFAULT_CONVERTER: &str = "_default";

/// 내장 변환기 우선순위
pub const BUILTIN_PRIORITY: i32 = -1;

/// 사용자 정의 이름 변환기
///
/// 빈 세그먼트 목록을 반환하면 해당 샘플은 무시됩니다.
pub trait NameConverter: Send + Sync {
    /// 샘플에서 이름 세그먼트를 만듭니다.
    fn segments(&self, sample: &RawSample) -> Result<Vec<String>, SampleError>;
}

impl<F> NameConverter for F
where
    F: Fn(&RawSample) -> Result<Vec<String>, SampleError> + Send + Sync,
{
    fn segments(&self, sample: &RawSample) -> Result<Vec<String>, SampleError> {
        self(sample)
    }
}

/// 변환 전략
#[derive(Clone)]
pub enum ConverterStrategy {
    /// `cpu.<plugin_instance>.<type_instance>`
    Cpu,
    /// `interface.[plugin_instance.][type_instance.]<type>.<value_name>`
    Interface,
    /// `memory.<type_instance>`
    Memory,
    /// 일반 규칙
    Default,
    /// 사용자 정의 변환기
    Custom(Arc<dyn NameConverter>),
}

impl ConverterStrategy {
    /// 사용자 정의 변환기로 전략을 만듭니다.
    pub fn custom(converter: impl NameConverter + 'static) -> Self {
        Self::Custom(Arc::new(converter))
    }

    /// 로그용 전략 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Interface => "interface",
            Self::Memory => "memory",
            Self::Default => "default",
            Self::Custom(_) => "custom",
        }
    }

    /// 샘플에서 이름 세그먼트를 만듭니다.
    pub fn segments(&self, sample: &RawSample) -> Result<Vec<String>, SampleError> {
        match self {
            Self::Cpu => Ok(vec![
                "cpu".to_owned(),
                required(sample, "plugin_instance", &sample.plugin_instance)?,
                required(sample, "type_instance", &sample.type_instance)?,
            ]),
            Self::Interface => {
                let mut parts = vec!["interface".to_owned()];
                push_trimmed(&mut parts, sample.plugin_instance.as_deref());
                push_trimmed(&mut parts, sample.type_instance.as_deref());
                push_trimmed(&mut parts, sample.type_name.as_deref());
                push_trimmed(&mut parts, Some(sample.value_name.as_str()));
                Ok(parts)
            }
            Self::Memory => Ok(vec![
                "memory".to_owned(),
                required(sample, "type_instance", &sample.type_instance)?,
            ]),
            Self::Default => {
                let plugin = required(sample, "plugin", &sample.plugin)?;
                let mut parts = vec![plugin.trim().to_owned()];
                push_trimmed(&mut parts, sample.plugin_instance.as_deref());
                if let Some(stype) = sample.type_name.as_deref().map(str::trim)
                    && stype != "value"
                {
                    push_trimmed(&mut parts, Some(stype));
                }
                push_trimmed(&mut parts, sample.type_instance.as_deref());
                let vname = sample.value_name.trim();
                if vname != "value" {
                    push_trimmed(&mut parts, Some(vname));
                }
                Ok(parts)
            }
            Self::Custom(converter) => converter.segments(sample),
        }
    }
}

impl fmt::Debug for ConverterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => write!(f, "Custom(..)"),
            other => write!(f, "{}", other.name()),
        }
    }
}

fn required(sample: &RawSample, field: &str, value: &Option<String>) -> Result<String, SampleError> {
    value.clone().ok_or_else(|| SampleError::Convert {
        plugin: sample.plugin.clone().unwrap_or_default(),
        reason: format!("missing {field}"),
    })
}

fn push_trimmed(parts: &mut Vec<String>, value: Option<&str>) {
    if let Some(v) = value.map(str::trim)
        && !v.is_empty()
    {
        parts.push(v.to_owned());
    }
}

/// 변환을 마친 샘플
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedSample {
    /// 송신 호스트 (없으면 빈 문자열)
    pub host: String,
    /// 정규 이름
    pub name: String,
    /// 값 종류
    pub kind: ValueKind,
    /// 원시 값
    pub value: Value,
    /// 샘플 시각 (초)
    pub time: f64,
}

#[derive(Debug, Clone)]
struct Registration {
    strategy: ConverterStrategy,
    priority: i32,
}

/// 플러그인 이름 → 변환 전략 레지스트리
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    entries: HashMap<String, Registration>,
}

impl ConverterRegistry {
    /// 내장 변환기가 등록된 레지스트리를 생성합니다.
    pub fn with_builtins() -> Self {
        let mut entries = HashMap::new();
        for (plugin, strategy) in [
            ("cpu", ConverterStrategy::Cpu),
            ("interface", ConverterStrategy::Interface),
            ("memory", ConverterStrategy::Memory),
            (DEFAULT_CONVERTER, ConverterStrategy::Default),
        ] {
            entries.insert(
                plugin.to_owned(),
                Registration {
                    strategy,
                    priority: BUILTIN_PRIORITY,
                },
            );
        }
        Self { entries }
    }

    /// 변환기를 등록합니다.
    ///
    /// 이미 등록된 이름이면 새 우선순위가 엄격히 클 때만 교체합니다.
    /// 등록 또는 교체되었으면 `true`를 반환합니다.
    pub fn register(
        &mut self,
        plugin: impl Into<String>,
        strategy: ConverterStrategy,
        priority: i32,
    ) -> bool {
        let plugin = plugin.into();
        let existing = self.entries.get(&plugin).map(|r| r.priority);
        match existing {
            Some(existing_priority) if priority <= existing_priority => {
                info!(
                    plugin = plugin.as_str(),
                    converter = strategy.name(),
                    priority,
                    existing_priority,
                    "ignoring converter registration"
                );
                false
            }
            _ => {
                if existing.is_some() {
                    info!(plugin = plugin.as_str(), priority, "replacing converter");
                }
                info!(
                    plugin = plugin.as_str(),
                    converter = strategy.name(),
                    "registered converter"
                );
                self.entries.insert(plugin, Registration { strategy, priority });
                true
            }
        }
    }

    /// 플러그인에 적용될 전략을 반환합니다. 등록되지 않은 플러그인은 `_default`입니다.
    pub fn strategy_for(&self, plugin: &str) -> Option<&ConverterStrategy> {
        self.entries
            .get(plugin)
            .or_else(|| self.entries.get(DEFAULT_CONVERTER))
            .map(|r| &r.strategy)
    }

    /// 등록된 우선순위를 반환합니다.
    pub fn priority(&self, plugin: &str) -> Option<i32> {
        self.entries.get(plugin).map(|r| r.priority)
    }

    /// 원시 샘플을 정규 이름의 샘플로 변환합니다.
    ///
    /// 변환기가 빈 세그먼트를 반환하거나 이름이 공백뿐이면 `Ok(None)`입니다.
    pub fn convert(&self, sample: &RawSample) -> Result<Option<ConvertedSample>, SampleError> {
        let plugin = sample.plugin.as_deref().unwrap_or_default();
        let convert_error = |reason: &str| SampleError::Convert {
            plugin: plugin.to_owned(),
            reason: reason.to_owned(),
        };

        let strategy = self
            .strategy_for(plugin)
            .ok_or_else(|| convert_error("no converter registered"))?;
        let segments = strategy.segments(sample)?;
        if segments.is_empty() {
            return Ok(None);
        }

        let name = segments.join(".");
        if name.trim().is_empty() {
            return Ok(None);
        }

        let value = sample.value.ok_or_else(|| convert_error("missing value"))?;
        let time = sample.time.ok_or_else(|| convert_error("missing time"))?;

        Ok(Some(ConvertedSample {
            host: sample.host.clone().unwrap_or_default(),
            name,
            kind: value.kind(),
            value,
            time,
        }))
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
