//! Task Watchdog Timer (TWDT) driver.
//!
//! The blink task subscribes and feeds on every toggle; if the highest
//! priority task stops running for 10 s the device resets. The OTA task
//! deliberately does not subscribe — its fetches legitimately block for
//! up to the HTTP timeout.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub struct TaskWatchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
}

impl TaskWatchdog {
    /// Configure the TWDT and subscribe the calling task.
    pub fn subscribe() -> Self {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: TWDT configuration and subscription for the
            // current task handle (null = caller).
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms: 10_000,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!("watchdog: reconfigure returned {} (may already be set)", ret);
                }
                let subscribed = esp_task_wdt_add(core::ptr::null_mut()) == ESP_OK;
                if subscribed {
                    log::info!("watchdog: subscribed (10s timeout)");
                } else {
                    log::warn!("watchdog: subscription failed");
                }
                Self { subscribed }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::info!("watchdog(sim): no-op");
            Self {}
        }
    }

    /// Feed the watchdog. Must run at least every 10 seconds.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        if self.subscribed {
            // SAFETY: resets the TWDT entry for the calling task only.
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }
}
