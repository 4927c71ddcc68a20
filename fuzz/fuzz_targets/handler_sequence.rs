#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use telemon_collectd::{
    AuthDb, CollectdHandler, ConverterRegistry, PacketBuilder, PacketParser, SecurityLayer,
    TypeCatalog, Value,
};
use telemon_core::config::SecurityLevel;

const TYPES_DB: &str = "\
cpu value:DERIVE:0:U
counter value:COUNTER:U:U
absolute value:ABSOLUTE:0:U
percent value:GAUGE:0:100
";

/// 퍼저용 구조적 입력: 같은 키에 대한 관측 시퀀스
#[derive(Arbitrary, Debug)]
struct Observation {
    plugin: FuzzPlugin,
    instance: u8,
    value: FuzzValue,
    time: u64,
    hires: bool,
}

#[derive(Arbitrary, Debug)]
enum FuzzPlugin {
    Cpu,
    Interface,
    Memory,
    Other,
}

#[derive(Arbitrary, Debug)]
enum FuzzValue {
    Counter(u64),
    Gauge(f64),
    Derive(i64),
    Absolute(u64),
}

fuzz_target!(|observations: Vec<Observation>| {
    let mut catalog = TypeCatalog::new();
    catalog.load_str(TYPES_DB);
    let mut handler = CollectdHandler::new(
        SecurityLayer::new(SecurityLevel::None, AuthDb::new()),
        PacketParser::new(Arc::new(catalog)),
        ConverterRegistry::default(),
    );

    for obs in observations.iter().take(64) {
        let plugin = match obs.plugin {
            FuzzPlugin::Cpu => "cpu",
            FuzzPlugin::Interface => "interface",
            FuzzPlugin::Memory => "memory",
            FuzzPlugin::Other => "other",
        };
        let (type_name, value) = match obs.value {
            FuzzValue::Counter(v) => ("counter", Value::Counter(v)),
            FuzzValue::Gauge(v) => ("percent", Value::Gauge(v)),
            FuzzValue::Derive(v) => ("cpu", Value::Derive(v)),
            FuzzValue::Absolute(v) => ("absolute", Value::Absolute(v)),
        };

        let builder = PacketBuilder::new().host("fuzz");
        let builder = if obs.hires {
            builder.time_hires(obs.time as f64 / 1024.0)
        } else {
            builder.time(obs.time)
        };
        let packet = builder
            .plugin(plugin)
            .plugin_instance(&obs.instance.to_string())
            .type_name(type_name)
            .type_instance("user")
            .values(&[value])
            .build();

        // 어떤 시퀀스에서도 패닉 없이 처리되어야 한다
        for sample in handler.handle_packet(&packet) {
            assert!(!sample.name.is_empty());
        }
    }
});
