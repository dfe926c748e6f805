//! Outbound application events.
//!
//! The boot coordinator, source resolver, and update engine emit these
//! through the [`EventSink`](super::ports::EventSink) port. Adapters on
//! the other side decide what to do with them — today that is the
//! serial log; tests record them to assert on the sequence.

use super::ports::{FetchError, Label};
use super::source::SourceOrigin;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Boot intent now points at the factory partition (forward-safety).
    FallbackArmed { factory: Label },

    /// The running image was pending verification and is now marked valid.
    RollbackCancelled { running: Label },

    /// Boot intent points back at the running partition after validity
    /// confirmation.
    BootIntentRestored { running: Label },

    /// The running partition's label was recorded under `last_boot`.
    BootRecorded { label: Label },

    /// The update-source resolver finished.
    SourceResolved { origin: SourceOrigin },

    /// An update check is starting.
    CheckStarted,

    /// A new image was written, validated, and scheduled to boot.
    UpdateApplied { partition: Label, bytes: usize },

    /// An update check failed (including "no new version").
    CheckFailed { error: FetchError },

    /// The engine will try again after the given delay.
    RetryScheduled { delay_secs: u64 },

    /// The configured attempt cap was reached; checking has stopped.
    RetriesExhausted { failures: u32 },
}
