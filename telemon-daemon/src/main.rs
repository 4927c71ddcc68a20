use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use telemon_core::config::TelemonConfig;
use telemon_daemon::cli::DaemonCli;
use telemon_daemon::logging;
use telemon_daemon::report::Report;
use telemon_daemon::session;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = TelemonConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;

    // CLI overrides take precedence over file and environment
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    if let Some(port) = cli.port {
        config.collectd.port = port;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    logging::init_tracing(&config.general)?;
    telemon_core::metrics::describe_all();

    let mut collector = session::build_collector(&config)?;

    if cli.validate {
        tracing::info!(config = %cli.config.display(), "configuration is valid");
        return Ok(());
    }

    tracing::info!("telemon-daemon starting");

    let shutdown = session::shutdown_signal(cli.duration.map(Duration::from_secs));
    let results = session::collect_until(&mut collector, shutdown).await?;

    Report::new(&results).write(cli.output.as_deref())?;

    tracing::info!("telemon-daemon shut down");
    Ok(())
}
