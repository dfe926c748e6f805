//! Port traits — the hexagonal boundary between update policy and the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ app core (resolver / coordinator / engine)
//! ```
//!
//! Driven adapters (NVS, partition table, HTTPS fetcher, log sink)
//! implement these traits. The core consumes them via generics, so the
//! policy logic never touches ESP-IDF directly.
//!
//! Contract notes:
//!
//! - **StoragePort** writes MUST be durable before `set` returns `Ok` —
//!   the underlying store commits as part of the call.
//! - **PartitionPort** mutates boot metadata only; it never creates or
//!   destroys partitions.
//! - **OtaFetchPort** moves boot intent only after the downloaded image
//!   has been validated. A failed fetch leaves boot intent untouched.

use core::fmt;

use crate::config::UpdaterSettings;

/// Partition label, as recorded in the partition table (≤ 16 chars).
pub type Label = heapless::String<16>;

// ───────────────────────────────────────────────────────────────
// Persistent key-value storage (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Namespaced persistent string storage. On-device this is NVS; reads
/// and writes of a single key are last-write-wins, and an absent key is
/// a valid state meaning "use default".
pub trait StoragePort {
    /// Read the UTF-8 value for `key` into `buf`. Returns the number of
    /// value bytes written (terminator excluded).
    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Durably write `value` under `key`. The commit completes before
    /// this returns `Ok`.
    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

/// Errors from [`StoragePort`] operations. All of them are recoverable:
/// callers log and continue with an in-memory default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist in the namespace.
    NotFound,
    /// The write or its commit failed.
    WriteFailed,
    /// Namespace open or read failure.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::IoError => write!(f, "storage I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Boot metadata (driven adapter: domain ↔ bootloader state)
// ───────────────────────────────────────────────────────────────

/// Role of a firmware partition in the boot scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
    /// Known-good recovery image; never overwritten by OTA.
    Factory,
    /// OTA-writable application slot.
    Application,
}

/// Identity of one firmware partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub label: Label,
    pub role: PartitionRole,
}

/// Accessor for the bootloader-owned boot metadata: which partition is
/// running, which one loads on next reset (boot intent), and the
/// pending-verification rollback state of the running image.
pub trait PartitionPort {
    /// Identity of the currently running partition.
    fn running(&self) -> Result<Partition, PartitionError>;

    /// The factory/recovery partition, if the table has one.
    fn factory(&self) -> Result<Partition, PartitionError>;

    /// The partition the next reset will load.
    fn boot_target(&self) -> Result<Partition, PartitionError>;

    /// Point boot intent at the partition named `label`.
    fn set_boot_target(&mut self, label: &str) -> Result<(), PartitionError>;

    /// Whether the running image is still pending verification (the
    /// platform will auto-revert on next reset unless it is marked valid).
    fn rollback_pending(&self) -> Result<bool, PartitionError>;

    /// Mark the running image valid, cancelling any scheduled rollback.
    fn mark_running_valid(&mut self) -> Result<(), PartitionError>;
}

/// Errors from [`PartitionPort`] operations. Logged as errors but never
/// fatal: the device keeps running the current image rather than
/// refusing to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    /// No partition with the requested label exists.
    NotFound,
    /// The partition table carries no factory slot.
    NoFactorySlot,
    /// Reading boot metadata (running partition, ota state) failed.
    MetadataRead,
    /// Writing boot metadata (boot intent, validity) failed.
    MetadataWrite,
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "partition not found"),
            Self::NoFactorySlot => write!(f, "no factory partition in table"),
            Self::MetadataRead => write!(f, "boot metadata read failed"),
            Self::MetadataWrite => write!(f, "boot metadata write failed"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// OTA fetch-and-apply (driven adapter: domain ↔ HTTPS + flash)
// ───────────────────────────────────────────────────────────────

/// Result of a successfully applied update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpdate {
    /// Slot the new image was written to (and boot intent now names).
    pub partition: Label,
    /// Total image bytes streamed to flash.
    pub bytes: usize,
    /// Version string from the new image's app descriptor, when present.
    pub version: Option<heapless::String<32>>,
}

/// Download a firmware image from `url`, stream it into the inactive
/// slot, validate it, and set boot intent to that slot.
///
/// Implementations must be safe to invoke repeatedly: any failure aborts
/// the in-progress write and leaves boot intent exactly as it was.
pub trait OtaFetchPort {
    fn fetch_and_apply(&mut self, url: &str) -> Result<AppliedUpdate, FetchError>;
}

/// Errors from one fetch-and-apply attempt. None of these escalate to a
/// restart; the engine stays idle and retries on its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    /// TCP/TLS connection to the update source failed.
    Connect,
    /// Server answered with a non-success HTTP status.
    Http(u16),
    /// The response stream broke mid-transfer.
    Io,
    /// Declared or streamed image size exceeds the slot budget.
    TooLarge,
    /// The stream does not begin with a valid application image header.
    ImageHeader,
    /// The served image is the version already running.
    NoUpdate,
    /// Writing the image to the inactive slot failed.
    Flash,
    /// Post-write image validation failed.
    Validation,
    /// The image was written but boot intent could not be updated.
    BootSet,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connection failed"),
            Self::Http(status) => write!(f, "HTTP status {}", status),
            Self::Io => write!(f, "transfer interrupted"),
            Self::TooLarge => write!(f, "image exceeds slot size"),
            Self::ImageHeader => write!(f, "not a firmware image"),
            Self::NoUpdate => write!(f, "no new version available"),
            Self::Flash => write!(f, "flash write failed"),
            Self::Validation => write!(f, "image validation failed"),
            Self::BootSet => write!(f, "set boot partition failed"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persisted tunables)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the update engine's runtime tunables.
///
/// Implementations MUST validate before persisting — invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    /// Load stored settings. Returns compiled defaults if none exist.
    fn load(&self) -> Result<UpdaterSettings, ConfigError>;

    /// Validate and persist settings.
    fn save(&self, settings: &UpdaterSettings) -> Result<(), ConfigError>;
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored settings failed integrity / deserialization checks.
    Corrupted,
    /// A field failed range validation; the message names which.
    ValidationFailed(&'static str),
    /// Underlying storage failure.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "stored settings corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "settings I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go (serial log today;
/// a telemetry uplink would implement the same trait).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
