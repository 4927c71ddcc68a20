//! 통합 테스트 -- 패킷 수신부터 결과 스냅샷까지의 전체 흐름 검증

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use telemon_collectd::converter::BUILTIN_PRIORITY;
use telemon_collectd::{
    AuthDb, CollectdCollector, CollectdConfigBuilder, CollectdHandler, CollectorBuilder, CollectorState,
    ConverterRegistry, ConverterStrategy, FilterKeys, PacketBuilder, PacketParser, RawSample,
    SampleError, SecurityLayer, TypeCatalog, Value,
};
use telemon_core::config::SecurityLevel;
use telemon_core::pipeline::Collector;

const TYPES_DB: &str = "\
# 테스트용 types.db
cpu             value:COUNTER:0:U
if_dropped      rx:DERIVE:0:U, tx:DERIVE:0:U
percent         value:GAUGE:0:100
";

fn catalog() -> Arc<TypeCatalog> {
    let mut catalog = TypeCatalog::new();
    catalog.load_str(TYPES_DB);
    Arc::new(catalog)
}

fn cpu_filter() -> FilterKeys {
    FilterKeys {
        cpu: vec!["user".to_owned()],
        ..FilterKeys::default()
    }
}

fn cpu_packet(value: u64, time: u64) -> PacketBuilder {
    PacketBuilder::new()
        .host("h1")
        .time(time)
        .plugin("cpu")
        .plugin_instance("0")
        .type_name("cpu")
        .type_instance("user")
        .values(&[Value::Counter(value)])
}

async fn send(target: SocketAddr, packet: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(packet, target).await.unwrap();
}

async fn started(builder: CollectorBuilder) -> (CollectdCollector, SocketAddr) {
    let mut collector = builder.catalog(catalog()).build().unwrap();
    collector.start().await.unwrap();
    let addr = collector.local_addr().unwrap();
    (collector, addr)
}

fn local_config() -> CollectdConfigBuilder {
    CollectdConfigBuilder::new()
        .bind_host("127.0.0.1")
        .port(0)
        .poll_interval(Duration::from_millis(100))
        .shutdown_timeout(Duration::from_secs(5))
        .filter(cpu_filter())
}

/// 패킷 인코딩 → 파싱 결과가 입력 필드와 정확히 일치
#[test]
fn test_packet_round_trip() {
    let parser = PacketParser::new(catalog());
    let packet = cpu_packet(100, 10).build();

    let samples: Vec<RawSample> = parser.parse(&packet).collect::<Result<_, _>>().unwrap();
    assert_eq!(samples.len(), 1);

    let sample = &samples[0];
    assert_eq!(sample.host.as_deref(), Some("h1"));
    assert_eq!(sample.plugin.as_deref(), Some("cpu"));
    assert_eq!(sample.plugin_instance.as_deref(), Some("0"));
    assert_eq!(sample.type_name.as_deref(), Some("cpu"));
    assert_eq!(sample.type_instance.as_deref(), Some("user"));
    assert_eq!(sample.value, Some(Value::Counter(100)));
    assert_eq!(sample.time, Some(10.0));
    assert_eq!(sample.value_name, "value");
}

/// 2^32 오버플로우 보정
#[test]
fn test_counter_wraparound_through_handler() {
    let mut handler = CollectdHandler::new(
        SecurityLayer::new(SecurityLevel::None, AuthDb::new()),
        PacketParser::new(catalog()),
        ConverterRegistry::default(),
    );

    assert!(handler.handle_packet(&cpu_packet(5, 0).build()).is_empty());
    let emitted = handler.handle_packet(&cpu_packet(3, 10).build());
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].value, (3.0 + 4_294_967_296.0 - 5.0) / 10.0);
}

/// 우선순위가 높은 변환기만 기존 등록을 교체
#[test]
fn test_converter_priority() {
    fn named(tag: &'static str) -> ConverterStrategy {
        ConverterStrategy::custom(
            move |_: &RawSample| -> Result<Vec<String>, SampleError> {
                Ok(vec!["custom".to_owned(), tag.to_owned()])
            },
        )
    }

    let mut registry = ConverterRegistry::with_builtins();
    assert!(registry.register("custom", named("a"), 1));
    assert!(registry.register("custom", named("b"), 2));
    assert!(!registry.register("custom", named("c"), 1));
    assert_eq!(registry.priority("custom"), Some(2));
    assert_eq!(registry.priority("cpu"), Some(BUILTIN_PRIORITY));

    let sample = RawSample {
        host: Some("h1".to_owned()),
        plugin: Some("custom".to_owned()),
        time: Some(1.0),
        value: Some(Value::Gauge(1.0)),
        value_name: "value".to_owned(),
        ..Default::default()
    };
    let converted = registry.convert(&sample).unwrap().unwrap();
    assert_eq!(converted.name, "custom.b");
}

/// 두 COUNTER 패킷 → cpu.0.user = [5.0]
#[tokio::test]
async fn test_end_to_end_counter_rate() {
    let config = local_config().build().unwrap();
    let (mut collector, addr) = started(CollectorBuilder::new().config(config)).await;
    assert_eq!(collector.state(), CollectorState::Running);

    send(addr, &cpu_packet(100, 10).build()).await;
    send(addr, &cpu_packet(150, 20).build()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    collector.stop().await.unwrap();
    assert_eq!(collector.state(), CollectorState::Stopped);

    let results = collector.results().unwrap();
    let series = results.get("cpu.0.user").unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].value, 5.0);
    assert_eq!(series[0].timestamp, 20.0);
}

/// 필터에 걸리지 않는 샘플은 저장되지 않음
#[tokio::test]
async fn test_filter_excludes_unlisted_metrics() {
    let config = local_config().build().unwrap();
    let (mut collector, addr) = started(CollectorBuilder::new().config(config)).await;

    let packet = PacketBuilder::new()
        .host("h1")
        .time(1)
        .plugin("load")
        .type_name("percent")
        .values(&[Value::Gauge(12.0)])
        .build();
    send(addr, &packet).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    collector.stop().await.unwrap();
    assert!(collector.results().unwrap().is_empty());
}

/// 손상된 패킷이 수신 루프를 멈추지 않음
#[tokio::test]
async fn test_malformed_packets_are_isolated() {
    let config = local_config().build().unwrap();
    let (mut collector, addr) = started(CollectorBuilder::new().config(config)).await;

    send(addr, &[0x00, 0x06, 0xff]).await;
    send(addr, &[0xde, 0xad, 0xbe, 0xef, 0x00]).await;
    send(addr, &cpu_packet(100, 10).build()).await;
    send(addr, &[0x00, 0x00, 0x00, 0x01]).await;
    send(addr, &cpu_packet(130, 13).build()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(collector.health_check().is_healthy());
    collector.stop().await.unwrap();

    let series = collector.results().unwrap().get("cpu.0.user").unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].value, 10.0);
}

/// 커스텀 변환기로 정규 이름 변경
#[tokio::test]
async fn test_custom_converter_through_collector() {
    let config = local_config().build().unwrap();
    let strategy = ConverterStrategy::custom(
        |raw: &RawSample| -> Result<Vec<String>, SampleError> {
            Ok(vec![
                "cpu".to_owned(),
                format!("core{}", raw.plugin_instance.as_deref().unwrap_or_default()),
                raw.type_instance.clone().unwrap_or_default(),
            ])
        },
    );
    let builder = CollectorBuilder::new()
        .config(config)
        .converter("cpu", strategy, 10);
    let (mut collector, addr) = started(builder).await;

    send(addr, &cpu_packet(0, 1).build()).await;
    send(addr, &cpu_packet(40, 5).build()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    collector.stop().await.unwrap();

    let results = collector.results().unwrap();
    assert!(results.get("cpu.0.user").is_none());
    assert_eq!(results.get("cpu.core0.user").unwrap()[0].value, 10.0);
}

/// 암호화 레벨: 평문/서명 패킷은 거부, 올바른 키의 암호화 패킷만 수용
#[tokio::test]
async fn test_encrypted_session() {
    let mut auth = tempfile::NamedTempFile::new().unwrap();
    writeln!(auth, "# users").unwrap();
    writeln!(auth, "alice: s3cret").unwrap();

    let config = local_config()
        .security_level(SecurityLevel::Encrypt)
        .auth_file(auth.path())
        .build()
        .unwrap();
    let (mut collector, addr) = started(CollectorBuilder::new().config(config)).await;

    send(addr, &cpu_packet(0, 1).build()).await;
    send(addr, &cpu_packet(0, 1).build_signed("alice", "s3cret").unwrap()).await;
    send(addr, &cpu_packet(0, 1).build_encrypted("alice", "wrong").unwrap()).await;
    send(addr, &cpu_packet(100, 10).build_encrypted("alice", "s3cret").unwrap()).await;
    send(addr, &cpu_packet(200, 20).build_encrypted("alice", "s3cret").unwrap()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    collector.stop().await.unwrap();

    let series = collector.results().unwrap().get("cpu.0.user").unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].value, 10.0);
}

/// 정지 후 재시작하면 새 세션 (이전 캐시와 결과를 이어받지 않음)
#[tokio::test]
async fn test_restart_starts_fresh_session() {
    let config = local_config().build().unwrap();
    let (mut collector, addr) = started(CollectorBuilder::new().config(config)).await;

    send(addr, &cpu_packet(100, 10).build()).await;
    send(addr, &cpu_packet(150, 20).build()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    collector.stop().await.unwrap();
    assert_eq!(collector.results().unwrap().sample_count(), 1);

    collector.start().await.unwrap();
    assert!(collector.results().is_none());
    let addr = collector.local_addr().unwrap();

    // 새 세션의 첫 관측은 아무것도 방출하지 않음
    send(addr, &cpu_packet(200, 30).build()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    collector.stop().await.unwrap();
    assert!(collector.results().unwrap().is_empty());
}

/// 정지 중에도 패킷이 계속 도착하면 라우터가 큐를 닫고 지금까지의 결과를 돌려줌
#[tokio::test]
async fn test_stop_keeps_results_under_steady_traffic() {
    let config = local_config().build().unwrap();
    let (mut collector, addr) = started(CollectorBuilder::new().config(config)).await;

    let sender = tokio::spawn(async move {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for i in 0..500u64 {
            let packet = cpu_packet(100 + i * 10, 10 + i).build();
            if socket.send_to(&packet, addr).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let started_at = std::time::Instant::now();
    collector.stop().await.unwrap();
    let elapsed = started_at.elapsed();
    sender.abort();

    // 폴링 간격(100ms) 한 번 수준에서 끝나야 하며 shutdown_timeout(5s)까지 가지 않음
    assert!(elapsed < Duration::from_secs(2), "stop took {elapsed:?}");
    let results = collector.results().unwrap();
    let series = results.get("cpu.0.user").unwrap();
    assert!(!series.is_empty());
    assert!(series.iter().all(|p| p.value == 10.0));
}
