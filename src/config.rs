//! Firmware configuration.
//!
//! Two layers:
//!
//! - [`FirmwareConfig`] — compiled-in values resolved at build time from
//!   `OTABLINK_*` environment variables, with fallback defaults. Network
//!   credentials and the update URL are injected this way rather than
//!   written as literals in source.
//! - [`UpdaterSettings`] — runtime tunables for the update engine,
//!   persisted in NVS via [`ConfigPort`](crate::app::ports::ConfigPort)
//!   and loaded at startup. Absence means compiled defaults.

use serde::{Deserialize, Serialize};

use crate::app::source::SourcePolicy;

/// Build-time environment lookup with a compiled fallback.
macro_rules! build_env {
    ($name:literal, $default:expr) => {
        match option_env!($name) {
            Some(v) => v,
            None => $default,
        }
    };
}

/// Compiled-in configuration, fixed for the lifetime of one firmware build.
#[derive(Debug, Clone, Copy)]
pub struct FirmwareConfig {
    /// Station-mode WiFi SSID. Empty means "not provisioned" — startup
    /// logs a warning and the OTA task never leaves its readiness wait.
    pub wifi_ssid: &'static str,
    /// Station-mode WiFi password. Empty means an open network.
    pub wifi_password: &'static str,
    /// Canonical update-source URL for this build. The resolver syncs the
    /// persisted `ota_url` against this value.
    pub default_update_url: &'static str,
    /// GPIO number driving the indicator LED.
    pub blink_gpio: i32,
    /// Full blink period in milliseconds (on + off).
    pub blink_period_ms: u32,
    /// Default engine tunables, used when NVS holds no stored settings.
    pub updater: UpdaterSettings,
}

impl FirmwareConfig {
    /// Resolve the build-time configuration.
    pub const fn from_build_env() -> Self {
        Self {
            wifi_ssid: build_env!("OTABLINK_WIFI_SSID", ""),
            wifi_password: build_env!("OTABLINK_WIFI_PASS", ""),
            default_update_url: build_env!(
                "OTABLINK_UPDATE_URL",
                "https://firmware.otablink.dev/releases/otablink.bin"
            ),
            blink_gpio: 5,
            blink_period_ms: 1000,
            updater: UpdaterSettings::compiled_default(),
        }
    }
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self::from_build_env()
    }
}

/// Runtime tunables for the update engine.
///
/// Stored as a postcard blob under `storage/upd_cfg`. Every field has a
/// validated range; [`validate`](UpdaterSettings::validate) is enforced
/// before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterSettings {
    /// Base delay between update checks, in seconds.
    pub retry_interval_secs: u32,
    /// Upper bound on consecutive failed checks. `0` means unbounded
    /// (retry forever at constant cost).
    pub max_attempts: u32,
    /// Per-request HTTP timeout, in seconds.
    pub http_timeout_secs: u32,
    /// How the resolver reconciles a persisted URL that differs from the
    /// compiled-in default.
    pub source_policy: SourcePolicy,
}

impl UpdaterSettings {
    pub const fn compiled_default() -> Self {
        Self {
            retry_interval_secs: 60,
            max_attempts: 0,
            http_timeout_secs: 60,
            source_policy: SourcePolicy::ForceDefault,
        }
    }

    /// Range-check every field. Invalid settings are rejected, not clamped.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(10..=86_400).contains(&self.retry_interval_secs) {
            return Err("retry_interval_secs must be 10–86400");
        }
        if self.max_attempts > 10_000 {
            return Err("max_attempts must be 0 (unbounded) or ≤ 10000");
        }
        if !(5..=300).contains(&self.http_timeout_secs) {
            return Err("http_timeout_secs must be 5–300");
        }
        Ok(())
    }
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self::compiled_default()
    }
}
