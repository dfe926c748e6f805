//! Update-source resolver.
//!
//! Decides the authoritative update URL for this boot by reconciling the
//! persisted `storage/ota_url` entry against the compiled-in default:
//!
//! - absent → persist the default and use it;
//! - equal to the default → use it with zero writes (no flash wear);
//! - different → policy decides ([`SourcePolicy`]).
//!
//! The resolver always terminates with a non-empty URL. Storage failures
//! downgrade to the in-memory compiled default without persisting.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::events::AppEvent;
use super::ports::{EventSink, StorageError, StoragePort};

/// NVS namespace holding the update-source entry.
pub const STORAGE_NAMESPACE: &str = "storage";
/// Key of the persisted update URL.
pub const OTA_URL_KEY: &str = "ota_url";

/// URL value buffer: 255 value bytes plus the store's terminator.
pub const URL_BUF_LEN: usize = 256;

/// Owned URL string sized to the storage contract.
pub type UrlString = heapless::String<256>;

/// How to reconcile a persisted URL that differs from this build's
/// compiled-in default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourcePolicy {
    /// Overwrite with the compiled default (fleet convergence — every
    /// boot of this build checks the same source). The historically
    /// observed behavior.
    #[default]
    ForceDefault,
    /// Keep the stored URL untouched, treating it as an operator
    /// override channel.
    PreserveCustom,
}

/// Where the resolved URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    /// Store already held this build's default; nothing written.
    StoredDefault,
    /// Store was absent, corrupt, or divergent and has been synced to
    /// the default.
    SyncedToDefault,
    /// Store held a custom URL and policy kept it.
    StoredCustom,
    /// Storage was unusable; compiled default used without persisting.
    FallbackNoStorage,
}

/// The resolver's answer: a non-empty URL plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub url: UrlString,
    pub origin: SourceOrigin,
}

/// Reconciles persisted state against the compiled-in default URL.
pub struct SourceResolver {
    default_url: UrlString,
    policy: SourcePolicy,
}

impl SourceResolver {
    /// Build a resolver around the compiled-in default. Rejects an empty
    /// default or one that cannot fit the storage contract, since either
    /// would break the non-empty-URL guarantee.
    pub fn new(default_url: &str, policy: SourcePolicy) -> Result<Self, &'static str> {
        if default_url.is_empty() {
            return Err("default update URL must not be empty");
        }
        let default_url =
            UrlString::try_from(default_url).map_err(|()| "default update URL exceeds 255 bytes")?;
        if default_url.len() >= URL_BUF_LEN {
            return Err("default update URL exceeds 255 bytes");
        }
        Ok(Self {
            default_url,
            policy,
        })
    }

    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    /// Run the reconciliation once. Never fails; the worst storage
    /// outcome is an unpersisted fallback to the compiled default.
    pub fn resolve(
        &self,
        store: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> ResolvedSource {
        let mut buf = [0u8; URL_BUF_LEN];
        let origin = match store.get(STORAGE_NAMESPACE, OTA_URL_KEY, &mut buf) {
            Ok(len) => match core::str::from_utf8(&buf[..len]) {
                Ok(stored) if stored == self.default_url.as_str() => {
                    info!("source: stored URL matches default, no write");
                    SourceOrigin::StoredDefault
                }
                Ok(stored) if !stored.is_empty() => match self.policy {
                    SourcePolicy::ForceDefault => {
                        info!(
                            "source: stored URL '{}' differs from default, resyncing",
                            stored
                        );
                        self.sync_default(store)
                    }
                    SourcePolicy::PreserveCustom => {
                        info!("source: keeping custom URL '{}'", stored);
                        return emit_resolved(
                            sink,
                            ResolvedSource {
                                // Fits: the value was read into a URL_BUF_LEN buffer.
                                url: UrlString::try_from(stored).unwrap_or_default(),
                                origin: SourceOrigin::StoredCustom,
                            },
                        );
                    }
                },
                _ => {
                    warn!("source: stored URL is empty or not UTF-8, resyncing");
                    self.sync_default(store)
                }
            },
            Err(StorageError::NotFound) => {
                info!("source: no stored URL, persisting default");
                self.sync_default(store)
            }
            Err(e) => {
                warn!(
                    "source: cannot read '{}/{}' ({}), using compiled default unpersisted",
                    STORAGE_NAMESPACE, OTA_URL_KEY, e
                );
                SourceOrigin::FallbackNoStorage
            }
        };

        emit_resolved(
            sink,
            ResolvedSource {
                url: self.default_url.clone(),
                origin,
            },
        )
    }

    fn sync_default(&self, store: &mut impl StoragePort) -> SourceOrigin {
        match store.set(STORAGE_NAMESPACE, OTA_URL_KEY, &self.default_url) {
            Ok(()) => {
                info!("source: persisted '{}'", self.default_url);
                SourceOrigin::SyncedToDefault
            }
            Err(e) => {
                warn!(
                    "source: failed to persist default URL ({}), continuing unpersisted",
                    e
                );
                SourceOrigin::FallbackNoStorage
            }
        }
    }
}

fn emit_resolved(sink: &mut impl EventSink, resolved: ResolvedSource) -> ResolvedSource {
    sink.emit(&AppEvent::SourceResolved {
        origin: resolved.origin,
    });
    resolved
}
