//! Resolver integration tests: the full persisted-URL lifecycle.

use otablink::app::source::{
    SourceOrigin, SourcePolicy, SourceResolver, OTA_URL_KEY, STORAGE_NAMESPACE,
};

use crate::mock_env::{MemStore, RecordingSink};

const DEFAULT: &str = "https://firmware.otablink.dev/releases/otablink.bin";

fn resolver() -> SourceResolver {
    SourceResolver::new(DEFAULT, SourcePolicy::ForceDefault).unwrap()
}

#[test]
fn first_boot_seeds_store_then_goes_quiet_then_heals_corruption() {
    let mut store = MemStore::new();
    let mut sink = RecordingSink::new();
    let res = resolver();

    // First boot: empty store, default persisted.
    let r = res.resolve(&mut store, &mut sink);
    assert_eq!(r.origin, SourceOrigin::SyncedToDefault);
    assert_eq!(store.value(STORAGE_NAMESPACE, OTA_URL_KEY), Some(DEFAULT));
    assert_eq!(store.writes, 1);

    // Second boot with no external change: no write observed.
    let r = res.resolve(&mut store, &mut sink);
    assert_eq!(r.origin, SourceOrigin::StoredDefault);
    assert_eq!(store.writes, 1);

    // Corrupt the stored value out from under the firmware.
    store.insert(STORAGE_NAMESPACE, OTA_URL_KEY, "http://old");

    // Next boot: store reset to the compiled default.
    let r = res.resolve(&mut store, &mut sink);
    assert_eq!(r.origin, SourceOrigin::SyncedToDefault);
    assert_eq!(store.value(STORAGE_NAMESPACE, OTA_URL_KEY), Some(DEFAULT));
    assert_eq!(r.url.as_str(), DEFAULT);
}

#[test]
fn repeated_resolution_is_write_free() {
    let mut store = MemStore::new();
    let mut sink = RecordingSink::new();
    let res = resolver();
    let _ = res.resolve(&mut store, &mut sink);
    for _ in 0..10 {
        let r = res.resolve(&mut store, &mut sink);
        assert_eq!(r.origin, SourceOrigin::StoredDefault);
    }
    assert_eq!(store.writes, 1, "only the first-boot seed write is allowed");
}

#[test]
fn preserve_custom_policy_is_an_override_channel() {
    let mut store = MemStore::new();
    store.insert(STORAGE_NAMESPACE, OTA_URL_KEY, "https://staging.otablink.dev/fw.bin");
    let res = SourceResolver::new(DEFAULT, SourcePolicy::PreserveCustom).unwrap();

    let r = res.resolve(&mut store, &mut RecordingSink::new());
    assert_eq!(r.origin, SourceOrigin::StoredCustom);
    assert_eq!(r.url.as_str(), "https://staging.otablink.dev/fw.bin");
    assert_eq!(store.writes, 0);
}

#[test]
fn unusable_storage_still_yields_the_compiled_default() {
    let mut store = MemStore::new();
    store.fail_reads = true;
    let r = resolver().resolve(&mut store, &mut RecordingSink::new());
    assert_eq!(r.origin, SourceOrigin::FallbackNoStorage);
    assert_eq!(r.url.as_str(), DEFAULT);
    assert!(!r.url.is_empty());
}
