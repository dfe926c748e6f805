//! Boot-partition coordinator.
//!
//! Runs at the very start of every boot, before network bring-up or any
//! other code path that can fail or hang. Two duties for a non-factory
//! image:
//!
//! 1. **Forward safety** — point boot intent at the factory partition
//!    first. If this image crashes before proving itself, the next reset
//!    lands on the recovery image instead of retrying a bad one.
//! 2. **Validity confirmation** — mark the running image valid
//!    (cancelling the platform's pending rollback, if any), restore boot
//!    intent to the running partition, and record its label under
//!    `boot_info/last_boot` for diagnostics.
//!
//! Every failure here is logged and non-fatal: the device keeps running
//! the current image (and keeps blinking) rather than refusing to start.
//! The one deliberate exception to recovery: if validity cannot be
//! confirmed, boot intent is left on the factory partition.

use log::{error, info, warn};

use super::events::AppEvent;
use super::ports::{EventSink, Partition, PartitionPort, PartitionRole, StoragePort};

/// NVS namespace holding boot diagnostics.
pub const BOOT_NAMESPACE: &str = "boot_info";
/// Key recording the label of the partition that last booted.
pub const LAST_BOOT_KEY: &str = "last_boot";

/// What the coordinator actually did this boot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    /// Identity of the running partition, when it could be read.
    pub running: Option<Partition>,
    /// Boot intent was pointed at the factory partition.
    pub fallback_armed: bool,
    /// The running image was pending verification and was marked valid.
    pub rollback_cancelled: bool,
    /// Validity is confirmed (either marked now, or nothing was pending).
    pub validity_confirmed: bool,
    /// Boot intent points back at the running partition.
    pub intent_restored: bool,
    /// `last_boot` was durably recorded.
    pub last_boot_recorded: bool,
}

/// Execute both duties. Must be called before network/OTA start.
pub fn secure_startup(
    partitions: &mut impl PartitionPort,
    store: &mut impl StoragePort,
    sink: &mut impl EventSink,
) -> BootReport {
    let mut report = BootReport::default();

    let running = match partitions.running() {
        Ok(p) => p,
        Err(e) => {
            // Without partition identity neither duty can act; startup
            // continues so the indicator keeps proving liveness.
            error!("boot: cannot identify running partition: {}", e);
            return report;
        }
    };
    info!(
        "boot: running partition '{}' ({:?})",
        running.label, running.role
    );
    report.running = Some(running.clone());

    if running.role == PartitionRole::Application {
        arm_factory_fallback(partitions, sink, &mut report);
        confirm_validity(partitions, sink, &running, &mut report);

        if report.validity_confirmed {
            match partitions.set_boot_target(&running.label) {
                Ok(()) => {
                    report.intent_restored = true;
                    sink.emit(&AppEvent::BootIntentRestored {
                        running: running.label.clone(),
                    });
                }
                // Intent stays on factory — the safe direction to fail.
                Err(e) => warn!("boot: could not restore boot intent: {}", e),
            }
        } else {
            warn!(
                "boot: validity unconfirmed, next reset stays on factory fallback"
            );
        }
    } else {
        info!("boot: factory image running, fallback duties skipped");
    }

    record_last_boot(store, sink, &running, &mut report);
    report
}

fn arm_factory_fallback(
    partitions: &mut impl PartitionPort,
    sink: &mut impl EventSink,
    report: &mut BootReport,
) {
    match partitions.factory() {
        Ok(factory) => match partitions.set_boot_target(&factory.label) {
            Ok(()) => {
                report.fallback_armed = true;
                info!("boot: armed fallback to '{}'", factory.label);
                sink.emit(&AppEvent::FallbackArmed {
                    factory: factory.label,
                });
            }
            Err(e) => error!("boot: failed to arm factory fallback: {}", e),
        },
        // Availability over updateability: keep running without a net.
        Err(e) => error!("boot: factory partition unavailable: {}", e),
    }
}

fn confirm_validity(
    partitions: &mut impl PartitionPort,
    sink: &mut impl EventSink,
    running: &Partition,
    report: &mut BootReport,
) {
    match partitions.rollback_pending() {
        Ok(true) => match partitions.mark_running_valid() {
            Ok(()) => {
                report.rollback_cancelled = true;
                report.validity_confirmed = true;
                info!("boot: '{}' marked valid, rollback cancelled", running.label);
                sink.emit(&AppEvent::RollbackCancelled {
                    running: running.label.clone(),
                });
            }
            Err(e) => warn!("boot: mark-valid failed: {}", e),
        },
        Ok(false) => {
            report.validity_confirmed = true;
        }
        Err(e) => warn!("boot: cannot read rollback state: {}", e),
    }
}

fn record_last_boot(
    store: &mut impl StoragePort,
    sink: &mut impl EventSink,
    running: &Partition,
    report: &mut BootReport,
) {
    match store.set(BOOT_NAMESPACE, LAST_BOOT_KEY, &running.label) {
        Ok(()) => {
            report.last_boot_recorded = true;
            sink.emit(&AppEvent::BootRecorded {
                label: running.label.clone(),
            });
        }
        // Diagnostic record only; losing it never blocks startup.
        Err(e) => warn!(
            "boot: failed to record {}/{}: {}",
            BOOT_NAMESPACE, LAST_BOOT_KEY, e
        ),
    }
}
