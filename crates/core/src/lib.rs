//! Telemon 공통 크레이트
//!
//! 수집기 크레이트와 데몬이 함께 사용하는 타입, trait, 에러, 설정을 제공합니다.
//!
//! # 모듈 구성
//!
//! - [`config`]: `telemon.toml` 파싱, 환경변수 오버라이드, 검증
//! - [`error`]: 최상위 에러 타입
//! - [`metrics`]: 메트릭 이름 상수 및 설명 등록
//! - [`pipeline`]: 수집기 생명주기 trait, 헬스 상태
//! - [`types`]: 메트릭 샘플, 결과 저장소

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{CollectorError, ConfigError, TelemonError};

// 설정
pub use config::{CollectdSection, GeneralConfig, SecurityLevel, TelemonConfig};

// 수집기 trait
pub use pipeline::{Collector, HealthStatus};

// 도메인 타입
pub use types::{MetricSample, ResultStore, SeriesPoint};
