#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use telemon_collectd::{PacketParser, TypeCatalog};

const TYPES_DB: &str = "\
cpu value:DERIVE:0:U
load shortterm:GAUGE:0:5000, midterm:GAUGE:0:5000, longterm:GAUGE:0:5000
if_octets rx:DERIVE:0:U, tx:DERIVE:0:U
";

fuzz_target!(|data: &[u8]| {
    let mut catalog = TypeCatalog::new();
    catalog.load_str(TYPES_DB);
    let parser = PacketParser::new(Arc::new(catalog)).strict_parts(data.first() == Some(&1));

    // 크래시나 패닉 없이 샘플 또는 에러를 내고 끝나야 한다
    let mut errors = 0;
    for result in parser.parse(data) {
        if result.is_err() {
            errors += 1;
        }
    }
    // 에러 이후 이터레이터는 종료된다
    assert!(errors <= 1);
});
