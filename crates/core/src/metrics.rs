//! 메트릭 상수 및 설명 등록
//!
//! 수집기의 내부 메트릭 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//! 레코더가 설치되지 않은 경우 모든 기록은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `telemon_`
//! - 모듈명: `collectd_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(telemon_core::metrics::COLLECTD_DATAGRAMS_RECEIVED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 드롭 사유 레이블 키 (convert, time, range, queue_full)
pub const LABEL_REASON: &str = "reason";

/// 보안 레벨 레이블 키 (none, sign, encrypt)
pub const LABEL_SECURITY_LEVEL: &str = "security_level";

// ─── 드롭 사유 레이블 값 ──────────────────────────────────────────

/// 이름 변환 실패
pub const REASON_CONVERT: &str = "convert";

/// 타임스탬프가 증가하지 않음
pub const REASON_TIME: &str = "time";

/// types.db 범위 밖의 값
pub const REASON_RANGE: &str = "range";

/// 라우터 큐 포화
pub const REASON_QUEUE_FULL: &str = "queue_full";

// ─── Collectd 수신기 메트릭 ────────────────────────────────────────

/// Collectd: 수신한 데이터그램 수 (counter)
pub const COLLECTD_DATAGRAMS_RECEIVED_TOTAL: &str = "telemon_collectd_datagrams_received_total";

/// Collectd: 프로토콜 에러로 거부된 패킷 수 (counter)
pub const COLLECTD_PROTOCOL_ERRORS_TOTAL: &str = "telemon_collectd_protocol_errors_total";

/// Collectd: 계산을 마치고 큐로 전달된 샘플 수 (counter)
pub const COLLECTD_SAMPLES_EMITTED_TOTAL: &str = "telemon_collectd_samples_emitted_total";

/// Collectd: 값 단위로 드롭된 샘플 수 (counter, label: reason)
pub const COLLECTD_SAMPLES_DROPPED_TOTAL: &str = "telemon_collectd_samples_dropped_total";

/// Collectd: 필터를 통과해 결과 저장소에 기록된 샘플 수 (counter)
pub const COLLECTD_SAMPLES_STORED_TOTAL: &str = "telemon_collectd_samples_stored_total";

/// Collectd: 허용 목록에 걸리지 않아 버려진 샘플 수 (counter)
pub const COLLECTD_SAMPLES_FILTERED_TOTAL: &str = "telemon_collectd_samples_filtered_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::describe_counter;

    describe_counter!(
        COLLECTD_DATAGRAMS_RECEIVED_TOTAL,
        "Total number of UDP datagrams received by the collectd listener"
    );
    describe_counter!(
        COLLECTD_PROTOCOL_ERRORS_TOTAL,
        "Total number of packets rejected with a protocol error"
    );
    describe_counter!(
        COLLECTD_SAMPLES_EMITTED_TOTAL,
        "Total number of calculated samples handed to the router"
    );
    describe_counter!(
        COLLECTD_SAMPLES_DROPPED_TOTAL,
        "Total number of samples dropped before reaching the router"
    );
    describe_counter!(
        COLLECTD_SAMPLES_STORED_TOTAL,
        "Total number of samples appended to the result store"
    );
    describe_counter!(
        COLLECTD_SAMPLES_FILTERED_TOTAL,
        "Total number of samples rejected by the allow-list"
    );
}
