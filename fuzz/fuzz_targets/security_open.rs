#![no_main]

use libfuzzer_sys::fuzz_target;
use telemon_collectd::{AuthDb, SecurityLayer};
use telemon_core::config::SecurityLevel;

fuzz_target!(|data: &[u8]| {
    let mut auth = AuthDb::new();
    auth.insert("alice", "s3cret");

    // 모든 최소 레벨에서 패닉 없이 Ok 또는 Err을 반환해야 한다
    for level in [SecurityLevel::None, SecurityLevel::Sign, SecurityLevel::Encrypt] {
        let layer = SecurityLayer::new(level, auth.clone());
        if let Ok(payload) = layer.open(data) {
            assert!(payload.len() <= data.len());
        }
    }
});
