//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production). A telemetry
//! uplink would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::FallbackArmed { factory } => {
                info!("BOOT | fallback armed -> '{}'", factory);
            }
            AppEvent::RollbackCancelled { running } => {
                info!("BOOT | '{}' marked valid, rollback cancelled", running);
            }
            AppEvent::BootIntentRestored { running } => {
                info!("BOOT | intent restored -> '{}'", running);
            }
            AppEvent::BootRecorded { label } => {
                info!("BOOT | last_boot = '{}'", label);
            }
            AppEvent::SourceResolved { origin } => {
                info!("SRC  | update source resolved ({:?})", origin);
            }
            AppEvent::CheckStarted => {
                info!("OTA  | check started");
            }
            AppEvent::UpdateApplied { partition, bytes } => {
                info!("OTA  | applied {} bytes -> '{}'", bytes, partition);
            }
            AppEvent::CheckFailed { error } => {
                info!("OTA  | check ended: {}", error);
            }
            AppEvent::RetryScheduled { delay_secs } => {
                info!("OTA  | next check in {}s", delay_secs);
            }
            AppEvent::RetriesExhausted { failures } => {
                warn!("OTA  | stopped after {} consecutive failures", failures);
            }
        }
    }
}
