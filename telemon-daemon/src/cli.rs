//! CLI argument definitions for telemon-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Telemon collectd telemetry receiver.
///
/// Listens for collectd network-protocol datagrams, computes per-metric
/// rates and prints the collected series when stopped.
#[derive(Parser, Debug)]
#[command(name = "telemon-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to telemon.toml configuration file.
    #[arg(short, long, default_value = "/etc/telemon/telemon.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the UDP port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Stop collecting after this many seconds instead of waiting for Ctrl-C.
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Write the JSON report to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}
