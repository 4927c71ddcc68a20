//! Collection session -- builds the collector, runs it until shutdown, returns the snapshot.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;

use telemon_collectd::{CollectdCollector, CollectdConfig, CollectorBuilder};
use telemon_core::config::TelemonConfig;
use telemon_core::pipeline::Collector;
use telemon_core::types::ResultStore;

/// Build a collector from the loaded configuration.
///
/// Fails on the same conditions the collector treats as fatal at
/// construction: invalid settings, missing types.db, unreadable auth file.
pub fn build_collector(config: &TelemonConfig) -> Result<CollectdCollector> {
    let collectd_config = CollectdConfig::from_core(&config.collectd);
    CollectorBuilder::new()
        .config(collectd_config)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build collectd collector: {}", e))
}

/// Start the collector, wait for `shutdown` to resolve, stop it and return the results.
pub async fn collect_until<F>(collector: &mut CollectdCollector, shutdown: F) -> Result<ResultStore>
where
    F: Future<Output = ()>,
{
    collector
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start collectd collector: {}", e))?;

    if let Some(addr) = collector.local_addr() {
        tracing::info!(%addr, "collecting samples");
    }

    shutdown.await;
    tracing::info!("shutdown requested");

    collector
        .stop()
        .await
        .map_err(|e| anyhow::anyhow!("failed to stop collectd collector: {}", e))?;

    Ok(collector.results().cloned().unwrap_or_default())
}

/// Resolve on Ctrl-C, or after `duration` if one is given (whichever comes first).
pub async fn shutdown_signal(duration: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    match duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    tracing::info!(secs = duration.as_secs(), "collection duration elapsed");
                }
                _ = ctrl_c => {}
            }
        }
        None => ctrl_c.await,
    }
}
