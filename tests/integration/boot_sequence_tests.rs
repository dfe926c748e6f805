//! Boot-sequence integration tests: coordinator + storage together.

use otablink::app::boot::{self, BOOT_NAMESPACE, LAST_BOOT_KEY};
use otablink::app::events::AppEvent;
use otablink::app::ports::{PartitionPort, PartitionRole};

use crate::mock_env::{MemStore, MockPartitions, RecordingSink};

#[test]
fn healthy_boot_arms_fallback_before_restoring_intent() {
    let mut parts = MockPartitions::standard();
    let mut store = MemStore::new();
    let mut sink = RecordingSink::new();

    let report = boot::secure_startup(&mut parts, &mut store, &mut sink);

    assert!(report.fallback_armed);
    assert!(report.intent_restored);
    // The write sequence is factory first, then the running slot.
    let labels: Vec<&str> = parts.intent_writes.iter().map(|l| l.as_str()).collect();
    assert_eq!(labels, vec!["factory", "ota_0"]);
    assert_eq!(parts.boot_label(), "ota_0");
    assert_eq!(store.value(BOOT_NAMESPACE, LAST_BOOT_KEY), Some("ota_0"));
}

#[test]
fn pending_verification_is_cancelled_exactly_once() {
    let mut parts = MockPartitions::standard();
    parts.pending = true;
    let mut store = MemStore::new();
    let mut sink = RecordingSink::new();

    let report = boot::secure_startup(&mut parts, &mut store, &mut sink);

    assert!(report.rollback_cancelled);
    assert!(!parts.pending, "platform rollback must be cancelled");

    // Second boot of the same (now valid) image: nothing pending.
    let mut sink2 = RecordingSink::new();
    let report2 = boot::secure_startup(&mut parts, &mut store, &mut sink2);
    assert!(!report2.rollback_cancelled);
    assert!(report2.validity_confirmed);
    assert!(
        !sink2
            .0
            .iter()
            .any(|e| matches!(e, AppEvent::RollbackCancelled { .. }))
    );
}

#[test]
fn boot_safety_invariant_holds_when_validity_unconfirmable() {
    // If the rollback state cannot be read, validity is never confirmed
    // and boot intent must still equal Factory at the point where
    // network/OTA operations would begin.
    let mut parts = MockPartitions::standard();
    parts.fail_pending = true;
    let mut store = MemStore::new();

    let report = boot::secure_startup(&mut parts, &mut store, &mut RecordingSink::new());

    assert!(report.fallback_armed);
    assert!(!report.validity_confirmed);
    assert_eq!(parts.boot_label(), "factory");
}

#[test]
fn coordinator_failures_never_block_startup() {
    // Unreadable running partition: the worst case. The coordinator
    // returns (rather than panicking or looping) so the blink and OTA
    // tasks can still be spawned.
    let mut parts = MockPartitions::standard();
    parts.fail_running = true;
    let report = boot::secure_startup(
        &mut parts,
        &mut MemStore::new(),
        &mut RecordingSink::new(),
    );
    assert!(report.running.is_none());
    assert!(parts.intent_writes.is_empty());

    // Failing diagnostics write: still a completed, restored boot.
    let mut parts = MockPartitions::standard();
    let mut store = MemStore::new();
    store.fail_writes = true;
    let report = boot::secure_startup(&mut parts, &mut store, &mut RecordingSink::new());
    assert!(!report.last_boot_recorded);
    assert!(report.intent_restored);
}

#[test]
fn factory_boot_leaves_intent_untouched() {
    let mut parts = MockPartitions::standard();
    parts.running = 0; // running the factory image
    parts.boot = 0;
    let mut store = MemStore::new();

    let report = boot::secure_startup(&mut parts, &mut store, &mut RecordingSink::new());

    assert_eq!(
        report.running.as_ref().map(|p| p.role),
        Some(PartitionRole::Factory)
    );
    assert!(parts.intent_writes.is_empty());
    assert_eq!(store.value(BOOT_NAMESPACE, LAST_BOOT_KEY), Some("factory"));
}

#[test]
fn second_boot_overwrites_last_boot_record() {
    let mut parts = MockPartitions::standard();
    let mut store = MemStore::new();
    let _ = boot::secure_startup(&mut parts, &mut store, &mut RecordingSink::new());

    parts.running = 2; // next boot runs from the other slot
    let _ = boot::secure_startup(&mut parts, &mut store, &mut RecordingSink::new());
    assert_eq!(store.value(BOOT_NAMESPACE, LAST_BOOT_KEY), Some("ota_1"));
}

#[test]
fn boot_target_port_reflects_coordinator_writes() {
    let mut parts = MockPartitions::standard();
    let _ = boot::secure_startup(&mut parts, &mut MemStore::new(), &mut RecordingSink::new());
    assert_eq!(parts.boot_target().unwrap().label.as_str(), "ota_0");
}
