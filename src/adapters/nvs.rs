//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] (namespaced string entries: `ota_url`,
//! `last_boot`) and [`ConfigPort`] (the postcard-encoded engine
//! tunables) for the otablink firmware.
//!
//! - Writes commit before returning — callers observe durability.
//! - Namespace isolation keeps the update-source entry apart from boot
//!   diagnostics.
//! - On first boot or after an NVS version mismatch the partition is
//!   erased and re-initialised automatically.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::UpdaterSettings;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Namespace + key of the persisted engine settings blob.
const SETTINGS_NAMESPACE: &str = "storage";
const SETTINGS_KEY: &str = "upd_cfg";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 512;

pub struct NvsStore {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsStore {
    /// Initialise the NVS flash subsystem and return a store handle.
    ///
    /// This is the firmware's one fatal init: an `Err` here means
    /// nothing downstream (update source, boot diagnostics, tunables)
    /// can be trusted, and startup should halt.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the main
            // task before any concurrent NVS access exists.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("nvs: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("nvs: flash initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("nvs: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, run a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = cstr_buf(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn read_blob(namespace: &str, key: &str) -> Result<Vec<u8>, i32> {
        Self::with_nvs_handle(namespace, false, |handle| {
            let key = cstr_buf(key);
            let mut size: usize = 0;
            let ret =
                unsafe { nvs_get_blob(handle, key.as_ptr().cast(), core::ptr::null_mut(), &mut size) };
            if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                return Err(ret);
            }
            let mut buf = vec![0u8; size];
            let ret =
                unsafe { nvs_get_blob(handle, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        })
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(namespace: &str, key: &str, data: &[u8]) -> Result<(), i32> {
        Self::with_nvs_handle(namespace, true, |handle| {
            let key = cstr_buf(key);
            let ret = unsafe {
                nvs_set_blob(handle, key.as_ptr().cast(), data.as_ptr().cast(), data.len())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
    }
}

/// NVS namespace/key names are ≤ 15 chars; copy into a NUL-terminated
/// fixed buffer for the C API.
#[cfg(target_os = "espidf")]
fn cstr_buf(s: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = s.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

// ───────────────────────────────────────────────────────────────
// StoragePort — namespaced string entries
// ───────────────────────────────────────────────────────────────

impl StoragePort for NvsStore {
    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key = cstr_buf(key);
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_str(handle, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                // nvs_get_str reports the length including the terminator.
                Ok(size.saturating_sub(1))
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(e) => {
                    warn!("nvs: get {}/{} failed ({})", namespace, key, e);
                    Err(StorageError::IoError)
                }
            }
        }
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store
                .borrow_mut()
                .insert(composite, value.as_bytes().to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let mut val = Vec::with_capacity(value.len() + 1);
            val.extend_from_slice(value.as_bytes());
            val.push(0);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key = cstr_buf(key);
                let ret = unsafe { nvs_set_str(handle, key.as_ptr().cast(), val.as_ptr().cast()) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                warn!("nvs: set {}/{} failed ({})", namespace, key, e);
                StorageError::WriteFailed
            })
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key = cstr_buf(key);
                let ret =
                    unsafe { nvs_find_key(handle, key.as_ptr().cast(), core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ConfigPort — persisted engine tunables
// ───────────────────────────────────────────────────────────────

impl ConfigPort for NvsStore {
    fn load(&self) -> Result<UpdaterSettings, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        let stored: Option<Vec<u8>> = {
            let key = Self::composite_key(SETTINGS_NAMESPACE, SETTINGS_KEY);
            self.store.borrow().get(&key).cloned()
        };

        #[cfg(target_os = "espidf")]
        let stored: Option<Vec<u8>> = match Self::read_blob(SETTINGS_NAMESPACE, SETTINGS_KEY) {
            Ok(bytes) => Some(bytes),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => None,
            Err(e) => {
                warn!("nvs: settings read error {}, using defaults", e);
                None
            }
        };

        match stored {
            Some(bytes) => {
                let settings: UpdaterSettings =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                settings
                    .validate()
                    .map_err(ConfigError::ValidationFailed)?;
                info!("nvs: loaded engine settings ({} bytes)", bytes.len());
                Ok(settings)
            }
            None => {
                info!("nvs: no stored settings, using compiled defaults");
                Ok(UpdaterSettings::default())
            }
        }
    }

    fn save(&self, settings: &UpdaterSettings) -> Result<(), ConfigError> {
        settings.validate().map_err(ConfigError::ValidationFailed)?;
        let bytes = postcard::to_allocvec(settings).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(SETTINGS_NAMESPACE, SETTINGS_KEY);
            self.store.borrow_mut().insert(key, bytes);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            Self::write_blob(SETTINGS_NAMESPACE, SETTINGS_KEY, &bytes).map_err(|e| {
                warn!("nvs: settings write error {}", e);
                ConfigError::IoError
            })
        }
    }
}
