//! OTA update engine.
//!
//! State machine `Idle -> Fetching -> { Applying -> Rebooting | Idle }`
//! around the [`OtaFetchPort`]. The engine owns the retry policy and the
//! failure counter; the task that drives it sleeps for whatever delay
//! [`run_cycle`](UpdateEngine::run_cycle) hands back.
//!
//! A failed cycle leaves nothing behind: the fetch port guarantees boot
//! intent is untouched on failure, and the engine drops back to `Idle`.

use core::num::NonZeroU32;
use std::time::Duration;

use log::{info, warn};

use super::events::AppEvent;
use super::ports::{EventSink, FetchError, OtaFetchPort};
use super::source::ResolvedSource;
use crate::config::UpdaterSettings;

// ───────────────────────────────────────────────────────────────
// Retry policy
// ───────────────────────────────────────────────────────────────

/// Delay growth across consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Constant interval (the historically observed policy).
    None,
    /// Multiply the interval per failure, capped at `max_secs`.
    Exponential { factor: u32, max_secs: u64 },
}

/// Tunable retry behavior for the update engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Base delay between checks.
    pub interval: Duration,
    /// Cap on consecutive *failed* checks; `None` retries forever.
    pub max_attempts: Option<NonZeroU32>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Fixed-interval, unbounded retries.
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            backoff: Backoff::None,
        }
    }

    pub fn from_settings(settings: &UpdaterSettings) -> Self {
        Self {
            interval: Duration::from_secs(u64::from(settings.retry_interval_secs)),
            max_attempts: NonZeroU32::new(settings.max_attempts),
            backoff: Backoff::None,
        }
    }

    /// Delay before the next check given the consecutive-failure count
    /// (`0` after a healthy "no update" cycle).
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        match self.backoff {
            Backoff::None => self.interval,
            Backoff::Exponential { factor, max_secs } => {
                if consecutive_failures <= 1 {
                    return self.interval.min(Duration::from_secs(max_secs));
                }
                let mut secs = self.interval.as_secs().max(1);
                // Exponent bounded: past 32 doublings we are at the cap anyway.
                for _ in 1..consecutive_failures.min(32) {
                    secs = secs.saturating_mul(u64::from(factor));
                    if secs >= max_secs {
                        secs = max_secs;
                        break;
                    }
                }
                Duration::from_secs(secs.min(max_secs))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(60))
    }
}

// ───────────────────────────────────────────────────────────────
// Engine
// ───────────────────────────────────────────────────────────────

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for the next check.
    Idle,
    /// A download attempt is in flight.
    Fetching,
    /// Image written and validated; bookkeeping before restart.
    Applying,
    /// Boot intent points at the new image; restart is the only step left.
    Rebooting,
}

/// What the driving task should do after one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// An update was applied; restart the device now.
    RestartRequired,
    /// Nothing applied; sleep this long and call again.
    RetryAfter(Duration),
    /// The attempt cap was hit; stop checking (the device keeps running).
    Exhausted,
}

/// Drives fetch attempts against a resolved source URL.
pub struct UpdateEngine {
    source: ResolvedSource,
    policy: RetryPolicy,
    state: EngineState,
    consecutive_failures: u32,
    exhausted: bool,
}

impl UpdateEngine {
    pub fn new(source: ResolvedSource, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            state: EngineState::Idle,
            consecutive_failures: 0,
            exhausted: false,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.source.url
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one check/download cycle. Safe to call repeatedly; a cycle
    /// that fails leaves the engine `Idle` with no partial state.
    pub fn run_cycle(
        &mut self,
        fetch: &mut impl OtaFetchPort,
        sink: &mut impl EventSink,
    ) -> CycleOutcome {
        if self.state == EngineState::Rebooting {
            return CycleOutcome::RestartRequired;
        }
        if self.exhausted {
            return CycleOutcome::Exhausted;
        }

        self.state = EngineState::Fetching;
        sink.emit(&AppEvent::CheckStarted);
        info!("ota: checking {}", self.source.url);

        match fetch.fetch_and_apply(&self.source.url) {
            Ok(applied) => {
                self.state = EngineState::Applying;
                info!(
                    "ota: update applied to '{}' ({} bytes{})",
                    applied.partition,
                    applied.bytes,
                    applied
                        .version
                        .as_ref()
                        .map(|v| format!(", version {}", v))
                        .unwrap_or_default()
                );
                sink.emit(&AppEvent::UpdateApplied {
                    partition: applied.partition,
                    bytes: applied.bytes,
                });
                self.state = EngineState::Rebooting;
                CycleOutcome::RestartRequired
            }
            Err(FetchError::NoUpdate) => {
                // Healthy steady state: the served image is what we run.
                info!("ota: no new version at {}", self.source.url);
                self.state = EngineState::Idle;
                self.consecutive_failures = 0;
                sink.emit(&AppEvent::CheckFailed {
                    error: FetchError::NoUpdate,
                });
                self.schedule_retry(sink)
            }
            Err(e) => {
                warn!("ota: check against {} failed: {}", self.source.url, e);
                self.state = EngineState::Idle;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                sink.emit(&AppEvent::CheckFailed { error: e });

                if let Some(cap) = self.policy.max_attempts {
                    if self.consecutive_failures >= cap.get() {
                        warn!(
                            "ota: giving up after {} consecutive failures",
                            self.consecutive_failures
                        );
                        self.exhausted = true;
                        sink.emit(&AppEvent::RetriesExhausted {
                            failures: self.consecutive_failures,
                        });
                        return CycleOutcome::Exhausted;
                    }
                }
                self.schedule_retry(sink)
            }
        }
    }

    fn schedule_retry(&self, sink: &mut impl EventSink) -> CycleOutcome {
        let delay = self.policy.delay_after(self.consecutive_failures);
        sink.emit(&AppEvent::RetryScheduled {
            delay_secs: delay.as_secs(),
        });
        CycleOutcome::RetryAfter(delay)
    }
}
