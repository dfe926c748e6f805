//! WiFi station-mode adapter.
//!
//! Owns the network bring-up and the one-shot [`ReadyLatch`] that the
//! OTA task blocks on. The latch is the only coupling between the
//! network and the rest of the firmware: tasks wait for "connected with
//! an IP" exactly once, and reconnects after that are invisible to them.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via
//!   `esp_idf_svc::wifi::{EspWifi, BlockingWifi}`.
//! - **all other targets**: simulation stub that "connects" instantly.
//!
//! ## Reconnection policy
//!
//! The supervisor loop in `main` calls [`ensure_connected`]
//! unconditionally on a fixed 1 s poll — connection loss is recovered
//! by reconnecting forever, with no attempt cap.
//!
//! [`ensure_connected`]: WifiLink::ensure_connected

use core::fmt;
use log::info;

use crate::app::latch::ReadyLatch;

// ───────────────────────────────────────────────────────────────
// Errors and validation
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    /// No SSID configured; the device cannot join a network.
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    /// The WiFi driver could not be initialised or configured.
    Driver,
    /// Association / DHCP failed; the supervisor will retry.
    ConnectFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::Driver => write!(f, "WiFi driver error"),
            Self::ConnectFailed => write!(f, "WiFi connection failed"),
        }
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(()); // open network
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WifiLink
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct WifiLink {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    latch: ReadyLatch,
    #[cfg(target_os = "espidf")]
    wifi: Option<esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>>,
    #[cfg(not(target_os = "espidf"))]
    sim_connected: bool,
}

impl WifiLink {
    /// Validate credentials and build an unattached link.
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        Ok(Self {
            ssid: heapless::String::try_from(ssid).map_err(|()| ConnectivityError::InvalidSsid)?,
            password: heapless::String::try_from(password)
                .map_err(|()| ConnectivityError::InvalidPassword)?,
            latch: ReadyLatch::new(),
            #[cfg(target_os = "espidf")]
            wifi: None,
            #[cfg(not(target_os = "espidf"))]
            sim_connected: false,
        })
    }

    /// Handle to the one-shot readiness latch. Clone freely; every
    /// holder is woken by the first successful connection.
    pub fn readiness(&self) -> ReadyLatch {
        self.latch.clone()
    }

    /// Bind the link to the WiFi peripheral and event loop. Must be
    /// called once before [`ensure_connected`](Self::ensure_connected).
    #[cfg(target_os = "espidf")]
    pub fn attach(
        &mut self,
        modem: esp_idf_svc::hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: Option<esp_idf_svc::nvs::EspDefaultNvsPartition>,
    ) -> Result<(), ConnectivityError> {
        use esp_idf_svc::wifi::{
            AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi,
        };

        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs).map_err(|e| {
            log::error!("wifi: driver init failed: {}", e);
            ConnectivityError::Driver
        })?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop).map_err(|e| {
            log::error!("wifi: blocking wrapper failed: {}", e);
            ConnectivityError::Driver
        })?;

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            auth_method,
            ..Default::default()
        }))
        .map_err(|e| {
            log::error!("wifi: set_configuration failed: {}", e);
            ConnectivityError::Driver
        })?;

        self.wifi = Some(wifi);
        Ok(())
    }

    /// Connect if not connected; signal the latch once an IP is up.
    /// Called unconditionally by the supervisor loop — errors mean
    /// "try again on the next poll".
    #[cfg(target_os = "espidf")]
    pub fn ensure_connected(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        let Some(wifi) = self.wifi.as_mut() else {
            return Err(ConnectivityError::Driver);
        };

        if wifi.is_connected().unwrap_or(false) {
            return Ok(());
        }

        info!("wifi: connecting to '{}'", self.ssid);
        if !wifi.is_started().unwrap_or(false) {
            wifi.start().map_err(|_| ConnectivityError::Driver)?;
        }
        wifi.connect().map_err(|_| ConnectivityError::ConnectFailed)?;
        wifi.wait_netif_up()
            .map_err(|_| ConnectivityError::ConnectFailed)?;

        info!("wifi: connected, IP acquired");
        self.latch.signal();
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn ensure_connected(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if !self.sim_connected {
            info!("wifi(sim): connected to '{}'", self.ssid);
            self.sim_connected = true;
            self.latch.signal();
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            self.wifi
                .as_ref()
                .map(|w| w.is_connected().unwrap_or(false))
                .unwrap_or(false)
        }

        #[cfg(not(target_os = "espidf"))]
        self.sim_connected
    }
}
