//! 샘플 라우터 -- 큐에서 샘플을 꺼내 허용 목록 필터를 거쳐 [`ResultStore`]에 기록합니다.
//!
//! 라우터는 결과 저장소를 단독으로 소유하며, 종료 시 태스크 출력으로 돌려줍니다.
//!
//! # 종료 조건
//! - 큐의 송신측이 모두 닫힘
//! - 제어 토큰(ControlFlag) 취소: 리스너에 종료 페이로드를 보내고,
//!   최대 폴링 간격 한 번 동안 샘플을 더 받은 뒤 큐를 닫고
//!   버퍼에 남은 샘플을 비운 다음 종료합니다.

use std::collections::BTreeSet;
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use telemon_core::metrics as m;
use telemon_core::types::{MetricSample, ResultStore};

use crate::config::FilterKeys;
use crate::error::CollectdError;
use crate::listener::ListenerHandle;

/// 카테고리별 허용 목록 필터
///
/// 정규 이름이 아래 규칙 중 하나라도 만족하면 저장합니다.
///
/// | 카테고리 | 규칙 |
/// |----------|------|
/// | `cpu` | 키워드 중 하나 포함 |
/// | `processes` | 키워드 중 하나 포함 |
/// | `interface` | 키워드 중 하나 포함, 제외 키워드는 모두 미포함 |
/// | `ovs_stats` | 키워드 중 하나 포함 |
/// | `dpdkstat` | 키워드 중 하나 포함 |
/// | `intel_rdt` | 키워드 중 하나 포함, 두 번째 세그먼트의 코어 ID가 제외 집합에 없음 |
#[derive(Debug, Clone)]
pub struct SampleFilter {
    keys: FilterKeys,
    excluded_cores: BTreeSet<u32>,
}

impl SampleFilter {
    /// 키워드 목록으로 필터를 생성합니다. 코어 제외 범위는 여기서 한 번 전개됩니다.
    pub fn from_keys(keys: &FilterKeys) -> Result<Self, CollectdError> {
        let excluded_cores = keys.excluded_cores()?;
        Ok(Self {
            keys: keys.clone(),
            excluded_cores,
        })
    }

    /// 전개된 제외 코어 ID 집합을 반환합니다.
    pub fn excluded_cores(&self) -> &BTreeSet<u32> {
        &self.excluded_cores
    }

    /// 정규 이름이 허용 목록에 해당하는지 판정합니다.
    pub fn matches(&self, name: &str) -> bool {
        let keys = &self.keys;
        (name.contains("cpu") && contains_any(name, &keys.cpu))
            || (name.contains("processes") && contains_any(name, &keys.processes))
            || (name.contains("interface")
                && contains_any(name, &keys.interface)
                && !contains_any(name, &keys.interface_exclude))
            || (name.contains("ovs_stats") && contains_any(name, &keys.ovs_stats))
            || (name.contains("dpdkstat") && contains_any(name, &keys.dpdkstat))
            || (name.contains("intel_rdt")
                && contains_any(name, &keys.intel_rdt)
                && self.core_allowed(name))
    }

    fn core_allowed(&self, name: &str) -> bool {
        let segment = name.split('.').nth(1).unwrap_or_default();
        match segment.parse::<u32>() {
            Ok(core) => !self.excluded_cores.contains(&core),
            Err(_) => {
                warn!(name, segment, "intel_rdt sample without a numeric core id");
                false
            }
        }
    }
}

fn contains_any(name: &str, keys: &[String]) -> bool {
    keys.iter().any(|key| name.contains(key.as_str()))
}

/// 샘플 라우터
pub struct SampleRouter {
    filter: SampleFilter,
    rx: mpsc::Receiver<MetricSample>,
    control: CancellationToken,
    listener: Option<ListenerHandle>,
    poll_interval: Duration,
    store: ResultStore,
}

impl SampleRouter {
    /// 라우터를 생성합니다.
    ///
    /// `listener`가 주어지면 제어 토큰 취소 시 해당 리스너를 닫습니다.
    pub fn new(
        filter: SampleFilter,
        rx: mpsc::Receiver<MetricSample>,
        control: CancellationToken,
        listener: Option<ListenerHandle>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            filter,
            rx,
            control,
            listener,
            poll_interval,
            store: ResultStore::new(),
        }
    }

    /// 라우팅 루프를 실행하고 결과 저장소를 반환합니다.
    pub async fn run(mut self) -> ResultStore {
        info!(poll_ms = self.poll_interval.as_millis() as u64, "sample router started");

        loop {
            if self.control.is_cancelled() {
                self.shutdown().await;
                break;
            }

            tokio::select! {
                _ = self.control.cancelled() => {}
                received = tokio::time::timeout(self.poll_interval, self.rx.recv()) => {
                    match received {
                        Ok(Some(sample)) => self.route(sample),
                        Ok(None) => {
                            info!("sample queue closed");
                            break;
                        }
                        // 폴링 타임아웃: 제어 토큰 재확인
                        Err(_) => {}
                    }
                }
            }
        }

        info!(
            series = self.store.len(),
            samples = self.store.sample_count(),
            "sample router stopped"
        );
        self.store
    }

    /// 리스너를 닫고 큐에 남은 샘플을 비웁니다.
    async fn shutdown(&mut self) {
        info!("sample router received shutdown signal");
        if let Some(listener) = self.listener.take()
            && let Err(e) = listener.close().await
        {
            warn!(error = %e, "failed to close listener");
        }

        // 리스너가 종료 페이로드를 처리할 때까지 최대 폴링 간격 한 번만 기다림
        let deadline = tokio::time::Instant::now() + self.poll_interval;
        let mut drained = 0usize;
        while let Ok(Some(sample)) = tokio::time::timeout_at(deadline, self.rx.recv()).await {
            self.route(sample);
            drained += 1;
        }

        // 큐를 닫으면 리스너의 try_send가 Closed로 실패하므로
        // 종료 페이로드가 유실되어도 리스너가 멈춤. 남은 항목은 큐 용량으로 제한됨.
        self.rx.close();
        while let Some(sample) = self.rx.recv().await {
            self.route(sample);
            drained += 1;
        }
        debug!(drained, "drained sample queue");
    }

    fn route(&mut self, sample: MetricSample) {
        if self.filter.matches(&sample.name) {
            counter!(m::COLLECTD_SAMPLES_STORED_TOTAL).increment(1);
            self.store.append(sample.name, sample.value, sample.timestamp);
        } else {
            counter!(m::COLLECTD_SAMPLES_FILTERED_TOTAL).increment(1);
        }
    }
}
