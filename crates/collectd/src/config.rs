//! collectd 수신기 설정
//!
//! [`CollectdConfig`]는 core의 [`CollectdSection`]을
//! 기반으로 수신기 내부에서 사용하는 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use telemon_core::config::TelemonConfig;
//! use telemon_collectd::config::CollectdConfig;
//!
//! let core_config = TelemonConfig::default();
//! let config = CollectdConfig::from_core(&core_config.collectd);
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use telemon_core::config::{CollectdSection, SecurityLevel};

use crate::error::CollectdError;

/// UDP 데이터그램 최대 크기
const MAX_DATAGRAM_SIZE: usize = 65535;

/// 카테고리별 허용 목록 키워드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterKeys {
    /// cpu 메트릭 키워드
    pub cpu: Vec<String>,
    /// processes 메트릭 키워드
    pub processes: Vec<String>,
    /// interface 메트릭 키워드
    pub interface: Vec<String>,
    /// interface 제외 키워드
    pub interface_exclude: Vec<String>,
    /// ovs_stats 메트릭 키워드
    pub ovs_stats: Vec<String>,
    /// dpdkstat 메트릭 키워드
    pub dpdkstat: Vec<String>,
    /// intel_rdt 메트릭 키워드
    pub intel_rdt: Vec<String>,
    /// intel_rdt 제외 코어 범위 (`"N"` 또는 `"N-M"`)
    pub intel_rdt_exclude: Vec<String>,
}

impl Default for FilterKeys {
    fn default() -> Self {
        Self::from_core(&CollectdSection::default())
    }
}

impl FilterKeys {
    /// core 설정에서 키워드를 복사합니다.
    pub fn from_core(core: &CollectdSection) -> Self {
        Self {
            cpu: core.cpu_keys.clone(),
            processes: core.processes_keys.clone(),
            interface: core.interface_keys.clone(),
            interface_exclude: core.interface_xkeys.clone(),
            ovs_stats: core.ovs_stats_keys.clone(),
            dpdkstat: core.dpdkstat_keys.clone(),
            intel_rdt: core.intel_rdt_keys.clone(),
            intel_rdt_exclude: core.intel_rdt_xkeys.clone(),
        }
    }

    /// 제외 코어 범위를 정수 집합으로 펼칩니다.
    pub fn excluded_cores(&self) -> Result<BTreeSet<u32>, CollectdError> {
        expand_core_ranges(&self.intel_rdt_exclude)
    }
}

/// collectd 수신기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectdConfig {
    /// 바인드 호스트
    pub bind_host: String,
    /// 바인드 포트 (0이면 임의 포트)
    pub port: u16,
    /// 최소 보안 레벨
    pub security_level: SecurityLevel,
    /// 인증 파일 경로
    pub auth_file: Option<PathBuf>,
    /// types.db 경로 목록 (비어 있으면 기본 위치 탐색)
    pub types_db: Vec<PathBuf>,
    /// COUNTER/DERIVE 종류 불일치 허용
    pub counter_eq_derive: bool,
    /// 알 수 없는 파트 타입을 에러로 처리
    pub strict_parts: bool,
    /// 리스너 → 라우터 큐 용량
    pub queue_capacity: usize,
    /// 최대 데이터그램 크기
    pub max_datagram_size: usize,
    /// 라우터 큐 폴링 간격
    pub poll_interval: Duration,
    /// 정지 시 태스크 join 타임아웃
    pub shutdown_timeout: Duration,
    /// 허용 목록 키워드
    pub filter: FilterKeys,
}

impl Default for CollectdConfig {
    fn default() -> Self {
        Self::from_core(&CollectdSection::default())
    }
}

impl CollectdConfig {
    /// core의 `CollectdSection`에서 수신기 설정을 생성합니다.
    pub fn from_core(core: &CollectdSection) -> Self {
        Self {
            bind_host: core.bind_host.clone(),
            port: core.port,
            security_level: core.security_level,
            auth_file: (!core.auth_file.is_empty()).then(|| PathBuf::from(&core.auth_file)),
            types_db: core.types_db.iter().map(PathBuf::from).collect(),
            counter_eq_derive: core.counter_eq_derive,
            strict_parts: core.strict_parts,
            queue_capacity: core.queue_capacity,
            max_datagram_size: core.max_datagram_size,
            poll_interval: Duration::from_millis(core.poll_interval_ms),
            shutdown_timeout: Duration::from_secs(core.shutdown_timeout_secs),
            filter: FilterKeys::from_core(core),
        }
    }

    /// 바인드 대상 `host:port` 문자열을 반환합니다.
    pub fn bind_addr(&self) -> String {
        if self.bind_host.contains(':') && !self.bind_host.starts_with('[') {
            format!("[{}]:{}", self.bind_host, self.port)
        } else {
            format!("{}:{}", self.bind_host, self.port)
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CollectdError> {
        if self.bind_host.trim().is_empty() {
            return Err(CollectdError::config("bind_host", "must not be empty"));
        }

        if self.security_level > SecurityLevel::None && self.auth_file.is_none() {
            return Err(CollectdError::config(
                "auth_file",
                format!(
                    "security level '{}' requires an auth file",
                    self.security_level
                ),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(CollectdError::config("queue_capacity", "must be greater than 0"));
        }

        if self.max_datagram_size == 0 || self.max_datagram_size > MAX_DATAGRAM_SIZE {
            return Err(CollectdError::config(
                "max_datagram_size",
                format!("must be 1-{MAX_DATAGRAM_SIZE}"),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(CollectdError::config("poll_interval_ms", "must be greater than 0"));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(CollectdError::config(
                "shutdown_timeout_secs",
                "must be greater than 0",
            ));
        }

        self.filter.excluded_cores()?;

        Ok(())
    }
}

/// `"N"` 또는 `"N-M"` 형식의 코어 범위 목록을 정수 집합으로 펼칩니다.
pub fn expand_core_ranges(ranges: &[String]) -> Result<BTreeSet<u32>, CollectdError> {
    let mut cores = BTreeSet::new();
    for raw in ranges {
        let invalid = || {
            CollectdError::config(
                "intel_rdt_xkeys",
                format!("invalid core range '{raw}', expected N or N-M"),
            )
        };
        let raw_trimmed = raw.trim();
        let (start, end) = match raw_trimmed.split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (raw_trimmed, raw_trimmed),
        };
        let start: u32 = start.parse().map_err(|_| invalid())?;
        let end: u32 = end.parse().map_err(|_| invalid())?;
        if start > end {
            return Err(invalid());
        }
        cores.extend(start..=end);
    }
    Ok(cores)
}

/// 수신기 설정 빌더
#[derive(Default)]
pub struct CollectdConfigBuilder {
    config: CollectdConfig,
}

impl CollectdConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 바인드 호스트를 설정합니다.
    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.config.bind_host = host.into();
        self
    }

    /// 바인드 포트를 설정합니다.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// 최소 보안 레벨을 설정합니다.
    pub fn security_level(mut self, level: SecurityLevel) -> Self {
        self.config.security_level = level;
        self
    }

    /// 인증 파일 경로를 설정합니다.
    pub fn auth_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.auth_file = Some(path.into());
        self
    }

    /// types.db 경로를 추가합니다.
    pub fn types_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.types_db.push(path.into());
        self
    }

    /// COUNTER/DERIVE 불일치 허용 여부를 설정합니다.
    pub fn counter_eq_derive(mut self, enabled: bool) -> Self {
        self.config.counter_eq_derive = enabled;
        self
    }

    /// 알 수 없는 파트 타입의 엄격 처리 여부를 설정합니다.
    pub fn strict_parts(mut self, enabled: bool) -> Self {
        self.config.strict_parts = enabled;
        self
    }

    /// 큐 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 라우터 폴링 간격을 설정합니다.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// 정지 타임아웃을 설정합니다.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// 허용 목록 키워드를 설정합니다.
    pub fn filter(mut self, filter: FilterKeys) -> Self {
        self.config.filter = filter;
        self
    }

    /// 설정을 검증하고 `CollectdConfig`를 생성합니다.
    pub fn build(self) -> Result<CollectdConfig, CollectdError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
