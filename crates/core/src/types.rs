//! 도메인 타입 — 수집기와 오케스트레이터가 공유하는 메트릭 데이터

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 계산이 끝난 메트릭 샘플
///
/// 리스너가 생성하여 라우터로 전달하는 `(host, name, value, timestamp)` 튜플입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// 송신 호스트명
    pub host: String,
    /// 점(`.`)으로 구분된 정규 메트릭 이름
    pub name: String,
    /// 계산된 값 (rate 또는 gauge 값)
    pub value: f64,
    /// 샘플 시각 (초)
    pub timestamp: f64,
}

impl fmt::Display for MetricSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}={} @{}",
            self.host, self.name, self.value, self.timestamp
        )
    }
}

/// 시계열의 한 점
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// 값
    pub value: f64,
    /// 시각 (초)
    pub timestamp: f64,
}

/// 프로세스 통계 요약에 포함되는 프로세스 이름 키워드
const SUMMARY_PROCESSES: &[&str] = &["ovs", "vpp", "qemu"];

/// 메트릭 이름 → 시계열 매핑
///
/// 수집 세션 동안 라우터가 단독으로 기록하고, 정지 후에는
/// 읽기 전용 스냅샷으로 호출자에게 전달됩니다.
/// 같은 이름의 샘플은 덮어쓰지 않고 도착 순서대로 추가됩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultStore {
    series: BTreeMap<String, Vec<SeriesPoint>>,
}

impl ResultStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 이름에 해당하는 시계열 끝에 샘플을 추가합니다.
    pub fn append(&mut self, name: impl Into<String>, value: f64, timestamp: f64) {
        self.series
            .entry(name.into())
            .or_default()
            .push(SeriesPoint { value, timestamp });
    }

    /// 이름에 해당하는 시계열을 반환합니다.
    pub fn get(&self, name: &str) -> Option<&[SeriesPoint]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// 저장된 시계열 이름을 정렬된 순서로 반환합니다.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// 시계열 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// 시계열이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// 전체 샘플 수를 반환합니다.
    pub fn sample_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    /// 모든 시계열을 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SeriesPoint])> {
        self.series
            .iter()
            .map(|(name, points)| (name.as_str(), points.as_slice()))
    }

    /// 가상 스위치/VNF 프로세스 통계를 요약합니다.
    ///
    /// `processes`와 `ovs`/`vpp`/`qemu` 중 하나를 포함하는 시계열마다
    /// 두 번째 세그먼트에 `_collectd`를 붙인 키 아래에,
    /// 앞의 두 세그먼트를 제거한 이름으로 평균값을 기록합니다.
    ///
    /// 예: `processes.ovs-vswitchd.ps_cputime.user` →
    /// `{"ovs-vswitchd_collectd": {"ps_cputime.user": mean}}`
    pub fn process_summary(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        let mut summary: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();

        for (name, points) in &self.series {
            if !name.contains("processes") || !SUMMARY_PROCESSES.iter().any(|p| name.contains(p)) {
                continue;
            }

            let segments: Vec<&str> = name.split('.').collect();
            let Some(process) = segments.get(1) else {
                continue;
            };
            let metric = segments.get(2..).map(|s| s.join(".")).unwrap_or_default();

            let mean = if points.is_empty() {
                0.0
            } else {
                points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64
            };

            summary
                .entry(format!("{process}_collectd"))
                .or_default()
                .insert(metric, mean);
        }

        summary
    }
}
