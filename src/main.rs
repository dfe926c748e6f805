//! Otablink firmware — main entry point.
//!
//! Startup order is load-bearing:
//!
//! 1. NVS init (the one fatal failure — nothing downstream can be
//!    trusted without it).
//! 2. Boot-partition coordination, before any code path that can fail
//!    or hang: arm the factory fallback, confirm validity, record
//!    `last_boot`.
//! 3. Blink task (highest priority) — liveness is visible from here on,
//!    including during network bring-up.
//! 4. WiFi bring-up; the first successful connection signals the
//!    readiness latch.
//! 5. OTA task (lower priority) — blocks on the latch, resolves the
//!    update source once, then loops: fetch, apply-and-restart on
//!    success, fixed-interval retry on failure. The NVS store handle
//!    moves into this task, making it the sole writer after startup.
//!
//! The main task stays behind as the WiFi reconnect supervisor.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};

use otablink::adapters::fetch::HttpsFetcher;
use otablink::adapters::log_sink::LogSink;
use otablink::adapters::nvs::NvsStore;
use otablink::adapters::partition::PartitionTable;
use otablink::adapters::system;
use otablink::adapters::wifi::WifiLink;
use otablink::app::boot;
use otablink::app::latch::ReadyLatch;
use otablink::app::ports::ConfigPort;
use otablink::app::source::SourceResolver;
use otablink::app::updater::{CycleOutcome, RetryPolicy, UpdateEngine};
use otablink::config::{FirmwareConfig, UpdaterSettings};
use otablink::drivers::blink::BlinkLed;
use otablink::drivers::watchdog::TaskWatchdog;

const BLINK_TASK_PRIORITY: u8 = 5;
const OTA_TASK_PRIORITY: u8 = 4;
const BLINK_TASK_STACK: usize = 4096;
const OTA_TASK_STACK: usize = 8192;

fn main() -> Result<()> {
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }

    info!("otablink v{} starting", env!("CARGO_PKG_VERSION"));

    let cfg = FirmwareConfig::from_build_env();

    // ── 1. Persistent storage ─────────────────────────────────
    let mut store = match NvsStore::new() {
        Ok(s) => s,
        Err(e) => {
            error!("nvs: init failed ({}) — halting", e);
            halt();
        }
    };

    // ── 2. Boot-partition coordination ────────────────────────
    let mut partitions = PartitionTable::new();
    let mut sink = LogSink::new();
    let report = boot::secure_startup(&mut partitions, &mut store, &mut sink);
    info!(
        "boot: fallback_armed={} validity_confirmed={} intent_restored={} last_boot_recorded={}",
        report.fallback_armed,
        report.validity_confirmed,
        report.intent_restored,
        report.last_boot_recorded
    );

    // ── 3. Engine tunables ────────────────────────────────────
    let settings = match store.load() {
        Ok(s) => s,
        Err(e) => {
            warn!("settings: load failed ({}), using compiled defaults", e);
            cfg.updater
        }
    };

    // ── 4. Blink task ─────────────────────────────────────────
    spawn_blink(&cfg)?;

    // ── 5. WiFi bring-up ──────────────────────────────────────
    if cfg.wifi_ssid.is_empty() {
        warn!("wifi: no SSID provisioned (set OTABLINK_WIFI_SSID at build time) — updates disabled");
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }

    let mut wifi = WifiLink::new(cfg.wifi_ssid, cfg.wifi_password)
        .map_err(|e| anyhow::anyhow!("wifi credentials: {}", e))?;

    #[cfg(target_os = "espidf")]
    {
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use esp_idf_svc::hal::peripherals::Peripherals;
        use esp_idf_svc::nvs::EspDefaultNvsPartition;

        let peripherals =
            Peripherals::take().map_err(|e| anyhow::anyhow!("peripherals: {}", e))?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;
        wifi.attach(peripherals.modem, sysloop, Some(nvs))
            .map_err(|e| anyhow::anyhow!("wifi attach: {}", e))?;
    }

    // ── 6. OTA task (owns the store from here) ────────────────
    spawn_ota(&cfg, settings, store, wifi.readiness())?;

    // ── 7. Reconnect supervisor ───────────────────────────────
    loop {
        if let Err(e) = wifi.ensure_connected() {
            warn!("wifi: {} — retrying", e);
        }
        thread::sleep(Duration::from_secs(1));
    }
}

// ── Tasks ─────────────────────────────────────────────────────

fn spawn_blink(cfg: &FirmwareConfig) -> Result<()> {
    let half_period = Duration::from_millis(u64::from(cfg.blink_period_ms) / 2);

    #[cfg(target_os = "espidf")]
    let mut led = {
        use esp_idf_svc::hal::gpio::{AnyOutputPin, PinDriver};
        // SAFETY: the blink GPIO is owned exclusively by this task.
        let pin = unsafe { AnyOutputPin::new(cfg.blink_gpio) };
        BlinkLed::new(PinDriver::output(pin)?)
    };

    #[cfg(not(target_os = "espidf"))]
    let mut led = BlinkLed::new(otablink::drivers::blink::SimPin::default());

    spawn_task("blink", BLINK_TASK_STACK, BLINK_TASK_PRIORITY, move || {
        let watchdog = TaskWatchdog::subscribe();
        loop {
            if led.toggle().is_err() {
                warn!("blink: GPIO write failed");
            }
            watchdog.feed();
            thread::sleep(half_period);
        }
    })
}

fn spawn_ota(
    cfg: &FirmwareConfig,
    settings: UpdaterSettings,
    store: NvsStore,
    ready: ReadyLatch,
) -> Result<()> {
    let default_url = cfg.default_update_url;
    let fetcher = HttpsFetcher::new(Duration::from_secs(u64::from(settings.http_timeout_secs)));
    spawn_task("ota", OTA_TASK_STACK, OTA_TASK_PRIORITY, move || {
        ota_task(default_url, settings, store, fetcher, &ready);
    })
}

fn ota_task(
    default_url: &'static str,
    settings: UpdaterSettings,
    mut store: NvsStore,
    mut fetcher: HttpsFetcher,
    ready: &ReadyLatch,
) {
    let mut sink = LogSink::new();

    info!("ota: waiting for network");
    ready.wait();

    let resolver = match SourceResolver::new(default_url, settings.source_policy) {
        Ok(r) => r,
        Err(e) => {
            error!("ota: compiled default URL rejected: {}", e);
            return;
        }
    };
    let source = resolver.resolve(&mut store, &mut sink);
    let mut engine = UpdateEngine::new(source, RetryPolicy::from_settings(&settings));

    loop {
        match engine.run_cycle(&mut fetcher, &mut sink) {
            CycleOutcome::RestartRequired => system::restart(),
            CycleOutcome::RetryAfter(delay) => thread::sleep(delay),
            CycleOutcome::Exhausted => {
                error!("ota: attempt cap reached, update checking stopped");
                return;
            }
        }
    }
}

/// Spawn a named firmware task. On ESP-IDF the FreeRTOS priority is
/// applied through the thread-spawn configuration; the blink task must
/// outrank the OTA task so the indicator never starves behind TLS or
/// flash writes.
fn spawn_task(
    name: &'static str,
    stack_size: usize,
    priority: u8,
    f: impl FnOnce() + Send + 'static,
) -> Result<()> {
    #[cfg(target_os = "espidf")]
    {
        use esp_idf_svc::hal::task::thread::ThreadSpawnConfiguration;

        ThreadSpawnConfiguration {
            stack_size,
            priority,
            ..Default::default()
        }
        .set()?;
        let spawned = thread::Builder::new()
            .name(name.into())
            .stack_size(stack_size)
            .spawn(f);
        ThreadSpawnConfiguration::default().set()?;
        spawned?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    {
        let _ = priority;
        thread::Builder::new()
            .name(name.into())
            .stack_size(stack_size)
            .spawn(f)?;
        Ok(())
    }
}

fn halt() -> ! {
    #[cfg(target_os = "espidf")]
    loop {
        thread::sleep(Duration::from_secs(1));
    }

    #[cfg(not(target_os = "espidf"))]
    std::process::exit(1);
}
