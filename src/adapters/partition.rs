//! Boot-metadata adapter.
//!
//! Implements [`PartitionPort`] over the ESP-IDF OTA partition API. The
//! safe wrappers do not cover factory lookup or arbitrary boot-intent
//! writes, so this adapter drops to raw `esp_idf_svc::sys` calls for
//! those, and uses the `esp-ota` crate for validity marking.
//!
//! On host targets a simulated three-slot table (factory + two OTA
//! slots) backs the same trait for tests and the simulation binary.

use crate::app::ports::{Label, Partition, PartitionError, PartitionPort, PartitionRole};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use core::ffi::CStr;

#[cfg(target_os = "espidf")]
use log::warn;

pub struct PartitionTable {
    #[cfg(not(target_os = "espidf"))]
    sim: SimTable,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
struct SimTable {
    labels: [&'static str; 3],
    running: usize,
    boot: usize,
    pending: bool,
}

impl PartitionTable {
    /// Open the device's partition table.
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            sim: SimTable {
                labels: ["factory", "ota_0", "ota_1"],
                running: 1,
                boot: 1,
                pending: false,
            },
        }
    }

    /// Simulation control: mark the running slot pending verification.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulate_pending_verify(&mut self) {
        self.sim.pending = true;
    }
}

#[cfg(not(target_os = "espidf"))]
impl SimTable {
    fn part(&self, idx: usize) -> Partition {
        Partition {
            label: Label::try_from(self.labels[idx]).unwrap_or_default(),
            role: if idx == 0 {
                PartitionRole::Factory
            } else {
                PartitionRole::Application
            },
        }
    }
}

#[cfg(target_os = "espidf")]
unsafe fn describe(part: *const esp_partition_t) -> Result<Partition, PartitionError> {
    if part.is_null() {
        return Err(PartitionError::MetadataRead);
    }
    // SAFETY: non-null esp_partition_t pointers from the OTA API refer
    // to entries of the static in-flash partition table.
    let raw = unsafe { &*part };
    let label = unsafe { CStr::from_ptr(raw.label.as_ptr()) }
        .to_str()
        .map_err(|_| PartitionError::MetadataRead)?;
    let role = if raw.subtype == esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_APP_FACTORY {
        PartitionRole::Factory
    } else {
        PartitionRole::Application
    };
    Ok(Partition {
        label: Label::try_from(label).map_err(|()| PartitionError::MetadataRead)?,
        role,
    })
}

impl PartitionPort for PartitionTable {
    fn running(&self) -> Result<Partition, PartitionError> {
        #[cfg(target_os = "espidf")]
        {
            let part = unsafe { esp_ota_get_running_partition() };
            unsafe { describe(part) }
        }

        #[cfg(not(target_os = "espidf"))]
        Ok(self.sim.part(self.sim.running))
    }

    fn factory(&self) -> Result<Partition, PartitionError> {
        #[cfg(target_os = "espidf")]
        {
            let part = unsafe {
                esp_partition_find_first(
                    esp_partition_type_t_ESP_PARTITION_TYPE_APP,
                    esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_APP_FACTORY,
                    core::ptr::null(),
                )
            };
            if part.is_null() {
                return Err(PartitionError::NoFactorySlot);
            }
            unsafe { describe(part) }
        }

        #[cfg(not(target_os = "espidf"))]
        Ok(self.sim.part(0))
    }

    fn boot_target(&self) -> Result<Partition, PartitionError> {
        #[cfg(target_os = "espidf")]
        {
            let part = unsafe { esp_ota_get_boot_partition() };
            unsafe { describe(part) }
        }

        #[cfg(not(target_os = "espidf"))]
        Ok(self.sim.part(self.sim.boot))
    }

    fn set_boot_target(&mut self, label: &str) -> Result<(), PartitionError> {
        #[cfg(target_os = "espidf")]
        {
            let mut name = [0u8; 17];
            let bytes = label.as_bytes();
            let len = bytes.len().min(16);
            name[..len].copy_from_slice(&bytes[..len]);

            let part = unsafe {
                esp_partition_find_first(
                    esp_partition_type_t_ESP_PARTITION_TYPE_APP,
                    esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_ANY,
                    name.as_ptr().cast(),
                )
            };
            if part.is_null() {
                return Err(PartitionError::NotFound);
            }
            let ret = unsafe { esp_ota_set_boot_partition(part) };
            if ret != ESP_OK {
                warn!("partition: set_boot_partition('{}') returned {}", label, ret);
                return Err(PartitionError::MetadataWrite);
            }
            Ok(())
        }

        #[cfg(not(target_os = "espidf"))]
        {
            match self.sim.labels.iter().position(|l| *l == label) {
                Some(idx) => {
                    self.sim.boot = idx;
                    Ok(())
                }
                None => Err(PartitionError::NotFound),
            }
        }
    }

    fn rollback_pending(&self) -> Result<bool, PartitionError> {
        #[cfg(target_os = "espidf")]
        {
            let part = unsafe { esp_ota_get_running_partition() };
            if part.is_null() {
                return Err(PartitionError::MetadataRead);
            }
            let mut state: esp_ota_img_states_t = 0;
            let ret = unsafe { esp_ota_get_state_partition(part, &mut state) };
            if ret == ESP_ERR_NOT_SUPPORTED {
                // Factory images carry no OTA state entry.
                return Ok(false);
            }
            if ret != ESP_OK {
                return Err(PartitionError::MetadataRead);
            }
            Ok(state == esp_ota_img_states_t_ESP_OTA_IMG_PENDING_VERIFY)
        }

        #[cfg(not(target_os = "espidf"))]
        Ok(self.sim.pending)
    }

    fn mark_running_valid(&mut self) -> Result<(), PartitionError> {
        #[cfg(target_os = "espidf")]
        {
            esp_ota::mark_app_valid().map_err(|e| {
                warn!("partition: mark_app_valid failed: {:?}", e);
                PartitionError::MetadataWrite
            })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.sim.pending = false;
            Ok(())
        }
    }
}

impl Default for PartitionTable {
    fn default() -> Self {
        Self::new()
    }
}
