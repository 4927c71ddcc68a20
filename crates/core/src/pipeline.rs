//! 수집기 trait — 외부 오케스트레이터가 사용하는 생명주기 확장 포인트

use std::future::Future;

use serde::Serialize;

use crate::error::TelemonError;
use crate::types::ResultStore;

/// 수집기 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상 동작
    Healthy,
    /// 동작 중이지만 성능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 메트릭 수집기 trait
///
/// 벤치마크 오케스트레이터는 이 trait으로 수집기를 시작/정지하고,
/// 정지 후 결과 스냅샷을 읽습니다.
///
/// # 생명주기
/// ```text
/// Idle → start() → Running → stop() → Stopped → results()
/// ```
pub trait Collector: Send {
    /// 수집을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), TelemonError>> + Send;

    /// 수집을 정지하고 결과 스냅샷을 확정합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), TelemonError>> + Send;

    /// 결과 스냅샷을 반환합니다.
    ///
    /// 정지 단계에 들어가기 전에는 `None`입니다.
    fn results(&self) -> Option<&ResultStore>;

    /// 수집기의 건강 상태를 확인합니다.
    fn health_check(&self) -> HealthStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded("slow".to_owned()).is_healthy());
        assert!(HealthStatus::Unhealthy("stopped".to_owned()).is_unhealthy());
    }
}
