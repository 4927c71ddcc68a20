//! Collection session and report tests.

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::net::UdpSocket;

use telemon_collectd::{PacketBuilder, Value};
use telemon_core::config::TelemonConfig;
use telemon_core::types::ResultStore;
use telemon_daemon::report::Report;
use telemon_daemon::session;

fn types_db() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp types.db");
    writeln!(file, "cpu value:DERIVE:0:U").expect("write types.db");
    writeln!(file, "ps_cputime user:DERIVE:0:U, syst:DERIVE:0:U").expect("write types.db");
    file
}

fn config(types_db: &NamedTempFile) -> TelemonConfig {
    let toml = format!(
        r#"
[collectd]
bind_host = "127.0.0.1"
port = 0
types_db = ["{}"]
poll_interval_ms = 50
cpu_keys = ["user"]
processes_keys = ["ps_cputime"]
"#,
        types_db.path().display()
    );
    TelemonConfig::parse(&toml).expect("test config should parse")
}

#[test]
fn test_build_collector_requires_types_db() {
    let mut config = TelemonConfig::default();
    config.collectd.types_db = vec!["/nonexistent/telemon/types.db".to_owned()];
    assert!(session::build_collector(&config).is_err());
}

#[tokio::test]
async fn test_collect_until_returns_snapshot() {
    let types_db = types_db();
    let mut collector = session::build_collector(&config(&types_db)).expect("collector builds");

    let results = session::collect_until(&mut collector, async {
        tokio::time::sleep(Duration::from_millis(50)).await;
    })
    .await
    .expect("session runs");
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_collect_until_records_samples() {
    let types_db = types_db();
    let mut config = config(&types_db);
    config.collectd.port = free_port();
    let target: SocketAddr = ([127, 0, 0, 1], config.collectd.port).into();
    let mut collector = session::build_collector(&config).expect("collector builds");

    let shutdown = async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        send(&cpu_packet(100, 10), target).await;
        send(&cpu_packet(150, 20), target).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    };
    let results = session::collect_until(&mut collector, shutdown)
        .await
        .expect("session runs");

    let series = results.get("cpu.0.user").expect("cpu series recorded");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].value, 5.0);
}

#[tokio::test]
async fn test_shutdown_signal_with_duration() {
    let elapsed = tokio::time::timeout(
        Duration::from_secs(5),
        session::shutdown_signal(Some(Duration::from_millis(20))),
    )
    .await;
    assert!(elapsed.is_ok());
}

#[test]
fn test_report_contains_summary_and_results() {
    let mut store = ResultStore::new();
    store.append("processes.ovs-vswitchd.ps_cputime.user", 2.0, 1.0);
    store.append("processes.ovs-vswitchd.ps_cputime.user", 4.0, 2.0);
    store.append("cpu.0.user", 5.0, 20.0);

    let report = Report::new(&store);
    assert_eq!(report.series, 2);
    assert_eq!(report.samples, 3);

    let json: serde_json::Value =
        serde_json::from_str(&report.to_json().expect("serializes")).expect("valid JSON");
    assert_eq!(
        json["process_summary"]["ovs-vswitchd_collectd"]["ps_cputime.user"],
        3.0
    );
    assert_eq!(json["results"]["cpu.0.user"][0]["value"], 5.0);
}

#[test]
fn test_report_written_to_file() {
    let mut store = ResultStore::new();
    store.append("cpu.0.user", 5.0, 20.0);

    let out = NamedTempFile::new().expect("temp output");
    Report::new(&store)
        .write(Some(out.path()))
        .expect("report written");

    let content = std::fs::read_to_string(out.path()).expect("read report");
    assert!(content.contains("cpu.0.user"));
}

fn free_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("probe socket");
    socket.local_addr().expect("probe addr").port()
}

async fn send(packet: &[u8], target: SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender");
    socket.send_to(packet, target).await.expect("send");
}

fn cpu_packet(value: i64, time: u64) -> Vec<u8> {
    PacketBuilder::new()
        .host("h1")
        .time(time)
        .plugin("cpu")
        .plugin_instance("0")
        .type_name("cpu")
        .type_instance("user")
        .values(&[Value::Derive(value)])
        .build()
}
