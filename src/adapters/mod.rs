//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements     | Connects to                     |
//! |-------------|----------------|---------------------------------|
//! | `nvs`       | StoragePort    | NVS / in-memory store           |
//! |             | ConfigPort     |                                 |
//! | `partition` | PartitionPort  | esp_ota boot metadata           |
//! | `fetch`     | OtaFetchPort   | esp_http_client + OTA slot      |
//! | `wifi`      | —              | ESP-IDF WiFi STA + ReadyLatch   |
//! | `log_sink`  | EventSink      | Serial log output               |
//! | `system`    | —              | Device restart                  |

pub mod fetch;
pub mod log_sink;
pub mod nvs;
pub mod partition;
pub mod system;
pub mod wifi;
