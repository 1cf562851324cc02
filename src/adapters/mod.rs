//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements       | Connects to                      |
//! |----------------|------------------|----------------------------------|
//! | `device_id`    | DeviceIdentity   | eFuse factory MAC                |
//! | `image_writer` | ImageWriterPort  | esp-ota partition / RAM image    |
//! | `inbox`        | —                | MQTT task → main loop channel    |
//! | `log_sink`     | EventSink        | Serial log output                |
//! | `mqtt`         | MqttPort         | ESP-IDF MQTT client / loopback   |
//! | `time`         | —                | ESP32 system timer / `Instant`   |

pub mod device_id;
pub mod image_writer;
pub mod inbox;
pub mod log_sink;
pub mod mqtt;
pub mod time;
