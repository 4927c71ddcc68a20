//! 수집기 파사드 -- 리스너와 라우터 태스크의 생명주기를 관리합니다.
//!
//! [`CollectdCollector`]는 core의 [`Collector`] trait을 구현하여
//! 외부 오케스트레이터가 start/stop/results로 수집 세션을 제어하게 합니다.
//!
//! # 상태 전이
//! ```text
//! Idle → Starting → Running → Stopping → Stopped
//!   ↑                                       │
//!   └────────── start() (새 세션) ──────────┘
//! ```
//!
//! # 정지 순서
//! 1. 제어 토큰 취소
//! 2. 라우터가 리스너에 종료 페이로드를 보내고, 폴링 간격 한 번 뒤 큐를 닫고 남은 샘플을 비움
//! 3. 라우터와 리스너를 `shutdown_timeout` 이내로 join, 초과 시 abort
//! 4. 라우터가 반환한 저장소를 결과 스냅샷으로 확정

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use telemon_core::error::{CollectorError, TelemonError};
use telemon_core::pipeline::{Collector, HealthStatus};
use telemon_core::types::ResultStore;

use crate::config::CollectdConfig;
use crate::converter::{ConverterRegistry, ConverterStrategy};
use crate::error::CollectdError;
use crate::handler::CollectdHandler;
use crate::listener::{CollectdServer, ListenerHandle, UdpListener};
use crate::parser::PacketParser;
use crate::router::{SampleFilter, SampleRouter};
use crate::security::SecurityLayer;
use crate::types_db::TypeCatalog;

/// 수집기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// 생성됨, 아직 시작하지 않음
    Idle,
    /// 소켓 바인드 및 태스크 생성 중
    Starting,
    /// 수신 중
    Running,
    /// 정지 진행 중
    Stopping,
    /// 정지됨, 결과 스냅샷 확정
    Stopped,
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// 실행 중인 수집 세션
struct Session {
    control: CancellationToken,
    listener: ListenerHandle,
    local_addr: SocketAddr,
    listener_task: JoinHandle<()>,
    router_task: JoinHandle<ResultStore>,
}

/// collectd 수집기
///
/// # 사용 예시
/// ```ignore
/// use telemon_collectd::CollectorBuilder;
/// use telemon_core::pipeline::Collector;
///
/// let mut collector = CollectorBuilder::new().config(config).build()?;
/// collector.start().await?;
/// // ... 벤치마크 실행 ...
/// collector.stop().await?;
/// let results = collector.results();
/// ```
pub struct CollectdCollector {
    config: CollectdConfig,
    catalog: Arc<TypeCatalog>,
    security: SecurityLayer,
    filter: SampleFilter,
    converters: ConverterRegistry,
    state: CollectorState,
    session: Option<Session>,
    snapshot: Option<ResultStore>,
}

impl CollectdCollector {
    /// 현재 상태를 반환합니다.
    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// 실행 중일 때 리스너가 바인드된 주소를 반환합니다.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(|s| s.local_addr)
    }

    /// 수신기 설정을 반환합니다.
    pub fn config(&self) -> &CollectdConfig {
        &self.config
    }

    /// 로드된 types.db 카탈로그를 반환합니다.
    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// 새 세션의 핸들러를 만들고 리스너/라우터 태스크를 생성합니다.
    async fn spawn_session(&self) -> Result<Session, CollectdError> {
        let parser = PacketParser::new(Arc::clone(&self.catalog))
            .counter_eq_derive(self.config.counter_eq_derive)
            .strict_parts(self.config.strict_parts);
        let handler = CollectdHandler::new(self.security.clone(), parser, self.converters.clone());

        let listener =
            UdpListener::bind(&self.config.bind_addr(), self.config.max_datagram_size).await?;
        let local_addr = listener.local_addr();
        let listener_handle = listener.close_handle();

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let control = CancellationToken::new();
        let router = SampleRouter::new(
            self.filter.clone(),
            rx,
            control.clone(),
            Some(listener_handle),
            self.config.poll_interval,
        );

        let server = CollectdServer::new(handler, tx);
        let listener_task = tokio::spawn(async move {
            listener.run(server).await;
        });
        let router_task = tokio::spawn(router.run());

        Ok(Session {
            control,
            listener: listener_handle,
            local_addr,
            listener_task,
            router_task,
        })
    }
}

impl Collector for CollectdCollector {
    async fn start(&mut self) -> Result<(), TelemonError> {
        if matches!(
            self.state,
            CollectorState::Starting | CollectorState::Running | CollectorState::Stopping
        ) {
            return Err(CollectorError::AlreadyRunning.into());
        }

        let previous = self.state;
        self.state = CollectorState::Starting;
        info!(addr = %self.config.bind_addr(), "starting collectd collector");

        match self.spawn_session().await {
            Ok(session) => {
                info!(
                    local = %session.local_addr,
                    security_level = %self.security.min_level(),
                    "collectd collector started"
                );
                self.session = Some(session);
                self.snapshot = None;
                self.state = CollectorState::Running;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to start collectd collector");
                self.state = previous;
                Err(e.into())
            }
        }
    }

    async fn stop(&mut self) -> Result<(), TelemonError> {
        if self.state != CollectorState::Running {
            return Err(CollectorError::NotRunning.into());
        }
        let Some(session) = self.session.take() else {
            return Err(CollectorError::NotRunning.into());
        };

        self.state = CollectorState::Stopping;
        info!("stopping collectd collector");

        let Session {
            control,
            listener,
            listener_task: mut listener_task,
            router_task: mut router_task,
            ..
        } = session;
        let timeout = self.config.shutdown_timeout;

        control.cancel();

        let store = match tokio::time::timeout(timeout, &mut router_task).await {
            Ok(Ok(store)) => store,
            Ok(Err(e)) => {
                error!(error = %e, "sample router task failed, results are empty");
                ResultStore::new()
            }
            Err(_) => {
                router_task.abort();
                error!(
                    timeout_secs = timeout.as_secs(),
                    "sample router did not stop in time and was aborted, results are empty"
                );
                // 라우터가 리스너를 닫지 못했을 수 있음
                if let Err(e) = listener.close().await {
                    warn!(error = %e, "failed to close listener");
                }
                ResultStore::new()
            }
        };

        match tokio::time::timeout(timeout, &mut listener_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "listener task failed"),
            Err(_) => {
                listener_task.abort();
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "listener did not stop in time and was aborted"
                );
            }
        }

        info!(
            series = store.len(),
            samples = store.sample_count(),
            "collectd collector stopped"
        );
        self.snapshot = Some(store);
        self.state = CollectorState::Stopped;
        Ok(())
    }

    fn results(&self) -> Option<&ResultStore> {
        self.snapshot.as_ref()
    }

    fn health_check(&self) -> HealthStatus {
        match (self.state, self.session.as_ref()) {
            (CollectorState::Running, Some(session)) => {
                if session.listener_task.is_finished() {
                    HealthStatus::Unhealthy("listener task exited".to_owned())
                } else if session.router_task.is_finished() {
                    HealthStatus::Unhealthy("sample router task exited".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            (CollectorState::Starting | CollectorState::Stopping, _) => {
                HealthStatus::Degraded(format!("collector is {}", self.state))
            }
            (state, _) => HealthStatus::Unhealthy(format!("collector is {state}")),
        }
    }
}

/// 수집기 빌더
///
/// `build()`에서 설정 검증, types.db 로드, 인증 파일 로드를 마칩니다.
/// 여기서 실패하면 수집기는 시작할 수 없습니다.
pub struct CollectorBuilder {
    config: CollectdConfig,
    catalog: Option<Arc<TypeCatalog>>,
    converters: ConverterRegistry,
}

impl CollectorBuilder {
    /// 기본 설정과 내장 변환기로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: CollectdConfig::default(),
            catalog: None,
            converters: ConverterRegistry::with_builtins(),
        }
    }

    /// 수신기 설정을 지정합니다.
    pub fn config(mut self, config: CollectdConfig) -> Self {
        self.config = config;
        self
    }

    /// 이미 로드된 types.db 카탈로그를 지정합니다.
    ///
    /// 지정하지 않으면 설정의 `types_db` 경로에서 로드합니다.
    pub fn catalog(mut self, catalog: Arc<TypeCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// 플러그인 변환기를 등록합니다.
    ///
    /// 이미 등록된 변환기보다 우선순위가 높을 때만 교체됩니다.
    pub fn converter(
        mut self,
        plugin: impl Into<String>,
        strategy: ConverterStrategy,
        priority: i32,
    ) -> Self {
        self.converters.register(plugin, strategy, priority);
        self
    }

    /// 수집기를 빌드합니다.
    pub fn build(self) -> Result<CollectdCollector, CollectdError> {
        self.config.validate()?;

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => {
                let catalog = TypeCatalog::load(&self.config.types_db)?;
                info!(
                    paths = %describe_paths(&self.config.types_db),
                    types = catalog.len(),
                    "type catalog ready"
                );
                Arc::new(catalog)
            }
        };

        let security =
            SecurityLayer::from_config(self.config.security_level, self.config.auth_file.as_deref())?;
        let filter = SampleFilter::from_keys(&self.config.filter)?;

        Ok(CollectdCollector {
            config: self.config,
            catalog,
            security,
            filter,
            converters: self.converters,
            state: CollectorState::Idle,
            session: None,
            snapshot: None,
        })
    }
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// types.db 경로 목록을 사람이 읽을 수 있게 표시합니다.
fn describe_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<default locations>".to_owned();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
