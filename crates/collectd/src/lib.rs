//! # telemon-collectd
//!
//! collectd 네트워크 프로토콜(UDP, TLV 파트)로 전송되는 텔레메트리를 수신하여
//! 정규 이름의 시계열로 정리하는 수집기입니다.
//!
//! # 모듈 구성
//!
//! - [`security`]: 서명(HMAC-SHA256) 검증 및 암호화(AES-256-OFB) 패킷 복호화
//! - [`types_db`]: types.db 카탈로그 (타입별 필드, 값 종류, 범위)
//! - [`parser`]: TLV 패킷 파서 및 테스트/퍼징용 패킷 빌더
//! - [`converter`]: 플러그인별 정규 이름 변환기 레지스트리 (우선순위 기반)
//! - [`calculator`]: COUNTER/GAUGE/DERIVE/ABSOLUTE 값 계산 및 범위 검증
//! - [`handler`]: 패킷 단위 처리 및 에러 격리 경계
//! - [`listener`]: UDP 리스너와 종료 페이로드 처리
//! - [`router`]: 허용 목록 필터 및 결과 저장소 기록
//! - [`collector`]: 생명주기 파사드 (core `Collector` trait 구현)
//! - [`config`]: 수신기 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! UDP -> UdpListener -> CollectdHandler -> mpsc -> SampleRouter -> ResultStore
//!                          |
//!        SecurityLayer -> PacketParser -> ConverterRegistry -> ValueCalculator -> RangeValidator
//! ```

pub mod calculator;
pub mod collector;
pub mod config;
pub mod converter;
pub mod error;
pub mod handler;
pub mod listener;
pub mod parser;
pub mod router;
pub mod security;
pub mod types;
pub mod types_db;

// --- 주요 타입 re-export ---

// 수집기
pub use collector::{CollectdCollector, CollectorBuilder, CollectorState};

// 설정
pub use config::{CollectdConfig, CollectdConfigBuilder, FilterKeys};

// 에러
pub use error::{CollectdError, SampleError};

// 처리 단계
pub use calculator::{RangeValidator, ValueCalculator};
pub use converter::{ConverterRegistry, ConverterStrategy, NameConverter};
pub use handler::CollectdHandler;
pub use parser::{PacketBuilder, PacketParser};
pub use security::{AuthDb, SecurityLayer};
pub use types_db::TypeCatalog;

// 수신/라우팅
pub use listener::{DatagramHandler, EXIT_SENTINEL, ListenerHandle, UdpListener};
pub use router::{SampleFilter, SampleRouter};

// 도메인 타입
pub use types::{RawSample, Value, ValueKind};
