//! 설정 관리 — telemon.toml 파싱 및 런타임 설정
//!
//! [`TelemonConfig`]는 데몬과 수집기의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TELEMON_COLLECTD_PORT=25826` 형식)
//! 3. 설정 파일 (`telemon.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), telemon_core::error::TelemonError> {
//! use telemon_core::config::TelemonConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TelemonConfig::load("telemon.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TelemonConfig::parse("[collectd]\nport = 25827")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::{ConfigError, TelemonError};

/// Telemon 통합 설정
///
/// `telemon.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemonConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// collectd 수신기 설정
    #[serde(default)]
    pub collectd: CollectdSection,
}

impl TelemonConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TelemonError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TelemonError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TelemonError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TelemonError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TelemonError> {
        toml::from_str(toml_str).map_err(|e| {
            TelemonError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TELEMON_{SECTION}_{FIELD}`
    /// 예: `TELEMON_COLLECTD_BIND_HOST=0.0.0.0`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TELEMON_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TELEMON_GENERAL_LOG_FORMAT");

        // Collectd
        let c = &mut self.collectd;
        override_string(&mut c.bind_host, "TELEMON_COLLECTD_BIND_HOST");
        override_u16(&mut c.port, "TELEMON_COLLECTD_PORT");
        if let Ok(val) = std::env::var("TELEMON_COLLECTD_SECURITY_LEVEL") {
            c.security_level = SecurityLevel::from_name(&val);
        }
        override_string(&mut c.auth_file, "TELEMON_COLLECTD_AUTH_FILE");
        override_csv(&mut c.types_db, "TELEMON_COLLECTD_TYPES_DB");
        override_bool(
            &mut c.counter_eq_derive,
            "TELEMON_COLLECTD_COUNTER_EQ_DERIVE",
        );
        override_bool(&mut c.strict_parts, "TELEMON_COLLECTD_STRICT_PARTS");
        override_usize(&mut c.queue_capacity, "TELEMON_COLLECTD_QUEUE_CAPACITY");
        override_u64(
            &mut c.poll_interval_ms,
            "TELEMON_COLLECTD_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut c.shutdown_timeout_secs,
            "TELEMON_COLLECTD_SHUTDOWN_TIMEOUT_SECS",
        );

        // 필터 키워드
        override_csv(&mut c.cpu_keys, "TELEMON_COLLECTD_CPU_KEYS");
        override_csv(&mut c.processes_keys, "TELEMON_COLLECTD_PROCESSES_KEYS");
        override_csv(&mut c.interface_keys, "TELEMON_COLLECTD_INTERFACE_KEYS");
        override_csv(&mut c.interface_xkeys, "TELEMON_COLLECTD_INTERFACE_XKEYS");
        override_csv(&mut c.ovs_stats_keys, "TELEMON_COLLECTD_OVS_STATS_KEYS");
        override_csv(&mut c.dpdkstat_keys, "TELEMON_COLLECTD_DPDKSTAT_KEYS");
        override_csv(&mut c.intel_rdt_keys, "TELEMON_COLLECTD_INTEL_RDT_KEYS");
        override_csv(&mut c.intel_rdt_xkeys, "TELEMON_COLLECTD_INTEL_RDT_XKEYS");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// collectd 섹션의 세부 검증(코어 범위 파싱 등)은 수집기 크레이트가 담당합니다.
    pub fn validate(&self) -> Result<(), TelemonError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.collectd.bind_host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "collectd.bind_host".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.collectd.security_level != SecurityLevel::None
            && self.collectd.auth_file.trim().is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "collectd.auth_file".to_owned(),
                reason: format!(
                    "security level '{}' requires an auth file",
                    self.collectd.security_level
                ),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 패킷 보안 레벨
///
/// 수신 패킷이 최소한 갖춰야 하는 인증/암호화 수준입니다.
/// `None < Sign < Encrypt` 순서로 비교됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecurityLevel {
    /// 평문 허용
    #[default]
    None,
    /// HMAC-SHA256 서명 필요
    Sign,
    /// AES-256-OFB 암호화 필요
    Encrypt,
}

impl SecurityLevel {
    /// 설정 문자열에서 보안 레벨을 해석합니다.
    ///
    /// `sign`/`SIGN`/`Sign`/`1`, `encrypt`/`ENCRYPT`/`Encrypt`/`2`를 인식하며,
    /// 그 외 값은 모두 `None`으로 취급합니다.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "sign" | "SIGN" | "Sign" | "1" => Self::Sign,
            "encrypt" | "ENCRYPT" | "Encrypt" | "2" => Self::Encrypt,
            _ => Self::None,
        }
    }

    /// 숫자 레벨(0/1/2)에서 보안 레벨을 해석합니다.
    pub fn from_number(level: i64) -> Self {
        match level {
            1 => Self::Sign,
            2 => Self::Encrypt,
            _ => Self::None,
        }
    }

    /// 와이어 레벨 숫자를 반환합니다.
    pub fn as_number(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Sign => 1,
            Self::Encrypt => 2,
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Sign => write!(f, "sign"),
            Self::Encrypt => write!(f, "encrypt"),
        }
    }
}

impl Serialize for SecurityLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SecurityLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawLevel {
            Name(String),
            Number(i64),
        }

        Ok(match RawLevel::deserialize(deserializer)? {
            RawLevel::Name(name) => Self::from_name(&name),
            RawLevel::Number(level) => Self::from_number(level),
        })
    }
}

/// collectd 수신기 설정
///
/// 바인드 주소, 보안 설정, types.db 경로, 카테고리별 필터 키워드를 담습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectdSection {
    /// 바인드 호스트 (IPv4/IPv6 주소 또는 호스트명)
    pub bind_host: String,
    /// 바인드 포트
    pub port: u16,
    /// 최소 보안 레벨
    pub security_level: SecurityLevel,
    /// `user:password` 형식의 인증 파일 경로
    pub auth_file: String,
    /// types.db 파일 경로 목록 (비어 있으면 기본 위치 탐색)
    pub types_db: Vec<String>,
    /// COUNTER/DERIVE 종류 불일치 허용 여부
    pub counter_eq_derive: bool,
    /// 알 수 없는 파트 타입을 프로토콜 에러로 처리할지 여부
    pub strict_parts: bool,
    /// 리스너 → 라우터 큐 용량
    pub queue_capacity: usize,
    /// 최대 데이터그램 크기 (바이트)
    pub max_datagram_size: usize,
    /// 라우터 큐 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 정지 시 태스크 join 타임아웃 (초)
    pub shutdown_timeout_secs: u64,

    // --- 필터 키워드 ---
    /// cpu 메트릭 키워드
    pub cpu_keys: Vec<String>,
    /// processes 메트릭 키워드
    pub processes_keys: Vec<String>,
    /// interface 메트릭 키워드
    pub interface_keys: Vec<String>,
    /// interface 제외 키워드
    pub interface_xkeys: Vec<String>,
    /// ovs_stats 메트릭 키워드
    pub ovs_stats_keys: Vec<String>,
    /// dpdkstat 메트릭 키워드
    pub dpdkstat_keys: Vec<String>,
    /// intel_rdt 메트릭 키워드
    pub intel_rdt_keys: Vec<String>,
    /// intel_rdt 제외 코어 범위 (`"N"` 또는 `"N-M"`)
    pub intel_rdt_xkeys: Vec<String>,
}

impl Default for CollectdSection {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_owned(),
            port: 25826,
            security_level: SecurityLevel::None,
            auth_file: String::new(),
            types_db: Vec::new(),
            counter_eq_derive: false,
            strict_parts: false,
            queue_capacity: 10_000,
            max_datagram_size: 65535,
            poll_interval_ms: 1000,
            shutdown_timeout_secs: 5,
            cpu_keys: vec!["system".to_owned(), "idle".to_owned()],
            processes_keys: vec!["user_time".to_owned(), "system_time".to_owned()],
            interface_keys: vec!["dropped".to_owned()],
            interface_xkeys: vec!["docker".to_owned()],
            ovs_stats_keys: vec!["dropped".to_owned(), "broadcast".to_owned()],
            dpdkstat_keys: vec!["dropped".to_owned()],
            intel_rdt_keys: vec!["llc".to_owned()],
            intel_rdt_xkeys: vec!["7-12".to_owned()],
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = TelemonConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.collectd.bind_host, "127.0.0.1");
        assert_eq!(config.collectd.port, 25826);
        assert_eq!(config.collectd.security_level, SecurityLevel::None);
        assert_eq!(config.collectd.poll_interval_ms, 1000);
    }

    #[test]
    fn default_config_passes_validation() {
        TelemonConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = TelemonConfig::parse("").unwrap();
        assert_eq!(config.collectd.port, 25826);
        assert_eq!(config.collectd.cpu_keys, vec!["system", "idle"]);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[collectd]
port = 25999
cpu_keys = ["user"]
"#;
        let config = TelemonConfig::parse(toml).unwrap();
        assert_eq!(config.collectd.port, 25999);
        assert_eq!(config.collectd.cpu_keys, vec!["user"]);
        // 나머지 필드는 기본값 유지
        assert_eq!(config.collectd.bind_host, "127.0.0.1");
        assert_eq!(config.general.log_format, "json");
    }

    #[test]
    fn security_level_accepts_names_and_numbers() {
        let config = TelemonConfig::parse(
            "[collectd]\nsecurity_level = \"Sign\"\nauth_file = \"/etc/collectd/auth\"",
        )
        .unwrap();
        assert_eq!(config.collectd.security_level, SecurityLevel::Sign);

        let config = TelemonConfig::parse(
            "[collectd]\nsecurity_level = 2\nauth_file = \"/etc/collectd/auth\"",
        )
        .unwrap();
        assert_eq!(config.collectd.security_level, SecurityLevel::Encrypt);

        let config = TelemonConfig::parse("[collectd]\nsecurity_level = \"bogus\"").unwrap();
        assert_eq!(config.collectd.security_level, SecurityLevel::None);
    }

    #[test]
    fn security_level_ordering() {
        assert!(SecurityLevel::None < SecurityLevel::Sign);
        assert!(SecurityLevel::Sign < SecurityLevel::Encrypt);
        assert_eq!(SecurityLevel::Encrypt.as_number(), 2);
    }

    #[test]
    fn validate_rejects_security_without_auth_file() {
        let mut config = TelemonConfig::default();
        config.collectd.security_level = SecurityLevel::Sign;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth_file"));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = TelemonConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_empty_bind_host() {
        let mut config = TelemonConfig::default();
        config.collectd.bind_host = "  ".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = TelemonConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            TelemonError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = TelemonConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = TelemonConfig::parse(&toml_str).unwrap();
        assert_eq!(config.collectd.port, parsed.collectd.port);
        assert_eq!(config.collectd.security_level, parsed.collectd.security_level);
        assert_eq!(config.collectd.intel_rdt_xkeys, parsed.collectd.intel_rdt_xkeys);
    }

    #[test]
    #[serial]
    fn env_override_port_and_csv() {
        let mut config = TelemonConfig::default();
        // SAFETY: serial 테스트로 실행되어 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe {
            std::env::set_var("TELEMON_COLLECTD_PORT", "26000");
            std::env::set_var("TELEMON_COLLECTD_CPU_KEYS", "user, nice,");
        }
        config.apply_env_overrides();
        assert_eq!(config.collectd.port, 26000);
        assert_eq!(config.collectd.cpu_keys, vec!["user", "nice"]);
        unsafe {
            std::env::remove_var("TELEMON_COLLECTD_PORT");
            std::env::remove_var("TELEMON_COLLECTD_CPU_KEYS");
        }
    }

    #[test]
    #[serial]
    fn env_override_invalid_port_keeps_original() {
        let mut config = TelemonConfig::default();
        // SAFETY: serial 테스트로 실행되어 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TELEMON_COLLECTD_PORT", "not-a-port") };
        config.apply_env_overrides();
        assert_eq!(config.collectd.port, 25826);
        unsafe { std::env::remove_var("TELEMON_COLLECTD_PORT") };
    }

    #[test]
    #[serial]
    fn env_override_security_level() {
        let mut config = TelemonConfig::default();
        // SAFETY: serial 테스트로 실행되어 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TELEMON_COLLECTD_SECURITY_LEVEL", "encrypt") };
        config.apply_env_overrides();
        assert_eq!(config.collectd.security_level, SecurityLevel::Encrypt);
        unsafe { std::env::remove_var("TELEMON_COLLECTD_SECURITY_LEVEL") };
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = TelemonConfig::from_file("/nonexistent/path/telemon.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TelemonError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
