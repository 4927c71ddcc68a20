//! 에러 타입 — 도메인별 에러 정의

/// Telemon 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TelemonError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 수집기 생명주기 에러
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 수집기 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// 이미 실행 중
    #[error("collector already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("collector not running")]
    NotRunning,

    /// 시작 실패 (소켓 바인드 등)
    #[error("collector start failed: {0}")]
    StartFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_wraps_into_telemon_error() {
        let err: TelemonError = ConfigError::InvalidValue {
            field: "collectd.port".to_owned(),
            reason: "must not be 0".to_owned(),
        }
        .into();
        assert!(matches!(err, TelemonError::Config(_)));
        assert!(err.to_string().contains("collectd.port"));
    }

    #[test]
    fn collector_error_display() {
        let err = CollectorError::StartFailed("bind 127.0.0.1:25826".to_owned());
        assert!(err.to_string().contains("25826"));
    }
}
