//! HTTPS fetch-and-apply adapter.
//!
//! Implements [`OtaFetchPort`]: GET the resolved URL, stream the body
//! into the inactive OTA slot, validate, and point boot intent at it.
//!
//! Transport trust model: the server certificate must chain to the
//! firmware's baked-in trust bundle (`esp_crt_bundle_attach`, no pinned
//! certificate), while the hostname/common-name check is relaxed — the
//! URL itself is the trust anchor, and image validation matters more
//! than strict host identity.
//!
//! Ordering guarantees:
//! - the first chunk is inspected (image magic + app descriptor) before
//!   the OTA slot is opened, so a non-image or same-version response
//!   never touches flash;
//! - boot intent moves only after `finalize` validates the image;
//! - any failure drops the in-progress update handle, which aborts the
//!   slot write and leaves boot intent unchanged.

use std::time::Duration;

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::image;
use crate::app::ports::{AppliedUpdate, FetchError, OtaFetchPort};
#[cfg(target_os = "espidf")]
use crate::app::ports::Label;

/// Slot budget sanity bound for downloaded images.
#[cfg(target_os = "espidf")]
const MAX_FIRMWARE_SIZE: usize = 4 * 1024 * 1024; // 4 MB

/// HTTP stream buffer, matching the client's internal buffer size.
#[cfg(target_os = "espidf")]
const STREAM_BUF_SIZE: usize = 2048;

pub struct HttpsFetcher {
    #[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
    timeout: Duration,
    running_version: Option<heapless::String<32>>,
}

impl HttpsFetcher {
    /// Build a fetcher with the given per-request timeout. The running
    /// firmware's version is captured once for same-version detection.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            running_version: running_version(),
        }
    }

    fn is_same_version(&self, desc: &image::AppDescriptor) -> bool {
        match &self.running_version {
            Some(running) => desc.version == *running,
            None => false,
        }
    }
}

/// Version string of the image we are currently executing.
#[cfg(target_os = "espidf")]
fn running_version() -> Option<heapless::String<32>> {
    use core::ffi::CStr;
    // SAFETY: esp_app_get_description returns a pointer to the running
    // image's statically allocated descriptor; it is never null.
    let desc = unsafe { &*esp_idf_svc::sys::esp_app_get_description() };
    let version = unsafe { CStr::from_ptr(desc.version.as_ptr()) }.to_str().ok()?;
    heapless::String::try_from(version).ok()
}

#[cfg(not(target_os = "espidf"))]
fn running_version() -> Option<heapless::String<32>> {
    heapless::String::try_from(env!("CARGO_PKG_VERSION")).ok()
}

impl OtaFetchPort for HttpsFetcher {
    #[cfg(target_os = "espidf")]
    fn fetch_and_apply(&mut self, url: &str) -> Result<AppliedUpdate, FetchError> {
        use esp_idf_svc::sys::*;

        let c_url = std::ffi::CString::new(url).map_err(|_| FetchError::Connect)?;
        let config = esp_http_client_config_t {
            url: c_url.as_ptr(),
            crt_bundle_attach: Some(esp_crt_bundle_attach),
            skip_cert_common_name_check: true,
            timeout_ms: self.timeout.as_millis() as i32,
            buffer_size: STREAM_BUF_SIZE as i32,
            buffer_size_tx: STREAM_BUF_SIZE as i32,
            ..Default::default()
        };

        // SAFETY: config outlives the client handle; cleanup runs on
        // every exit path below.
        let client = unsafe { esp_http_client_init(&config) };
        if client.is_null() {
            return Err(FetchError::Connect);
        }
        let result = self.transfer(client);
        unsafe {
            esp_http_client_cleanup(client);
        }
        result
    }

    #[cfg(not(target_os = "espidf"))]
    fn fetch_and_apply(&mut self, url: &str) -> Result<AppliedUpdate, FetchError> {
        info!("fetch(sim): pretending {} serves the running version", url);
        Err(FetchError::NoUpdate)
    }
}

#[cfg(target_os = "espidf")]
impl HttpsFetcher {
    fn transfer(
        &self,
        client: esp_idf_svc::sys::esp_http_client_handle_t,
    ) -> Result<AppliedUpdate, FetchError> {
        use esp_idf_svc::sys::*;

        if unsafe { esp_http_client_open(client, 0) } != ESP_OK {
            return Err(FetchError::Connect);
        }
        let content_length = unsafe { esp_http_client_fetch_headers(client) };
        let status = unsafe { esp_http_client_get_status_code(client) };
        if status != 200 {
            return Err(FetchError::Http(status as u16));
        }
        if content_length > MAX_FIRMWARE_SIZE as i64 {
            return Err(FetchError::TooLarge);
        }

        // Accumulate enough of the stream to classify the image before
        // the OTA slot is opened.
        let mut head = Vec::with_capacity(image::APP_DESC_MIN_PREFIX.max(STREAM_BUF_SIZE));
        let mut buf = [0u8; STREAM_BUF_SIZE];
        while head.len() < image::APP_DESC_MIN_PREFIX {
            let n = unsafe {
                esp_http_client_read(client, buf.as_mut_ptr().cast(), buf.len() as i32)
            };
            if n < 0 {
                return Err(FetchError::Io);
            }
            if n == 0 {
                return Err(FetchError::ImageHeader);
            }
            head.extend_from_slice(&buf[..n as usize]);
        }

        let desc = image::parse_app_descriptor(&head).ok_or(FetchError::ImageHeader)?;
        if self.is_same_version(&desc) {
            return Err(FetchError::NoUpdate);
        }

        // The slot the platform will pick for this update; recorded so
        // the engine can report where boot intent now points.
        let target = unsafe { esp_ota_get_next_update_partition(core::ptr::null()) };
        let target_label = if target.is_null() {
            Label::new()
        } else {
            // SAFETY: non-null pointers reference the static partition table.
            unsafe { core::ffi::CStr::from_ptr((*target).label.as_ptr()) }
                .to_str()
                .ok()
                .and_then(|s| Label::try_from(s).ok())
                .unwrap_or_default()
        };

        let mut update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("fetch: OTA begin failed: {:?}", e);
            FetchError::Flash
        })?;
        update.write(&head).map_err(|e| {
            warn!("fetch: OTA write failed: {:?}", e);
            FetchError::Flash
        })?;
        let mut total = head.len();

        loop {
            let n = unsafe {
                esp_http_client_read(client, buf.as_mut_ptr().cast(), buf.len() as i32)
            };
            if n < 0 {
                // Dropping `update` aborts the slot write.
                return Err(FetchError::Io);
            }
            if n == 0 {
                break;
            }
            total += n as usize;
            if total > MAX_FIRMWARE_SIZE {
                return Err(FetchError::TooLarge);
            }
            update.write(&buf[..n as usize]).map_err(|e| {
                warn!("fetch: OTA write failed at {} bytes: {:?}", total, e);
                FetchError::Flash
            })?;
        }

        let mut completed = update.finalize().map_err(|e| {
            warn!("fetch: image validation failed: {:?}", e);
            FetchError::Validation
        })?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("fetch: set boot partition failed: {:?}", e);
            FetchError::BootSet
        })?;

        info!(
            "fetch: {} bytes written to '{}', version {}",
            total, target_label, desc.version
        );
        Ok(AppliedUpdate {
            partition: target_label,
            bytes: total,
            version: Some(desc.version),
        })
    }
}
