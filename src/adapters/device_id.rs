//! Device identity derived from the ESP32 factory MAC address.
//!
//! Produces a stable device ID: the 6-byte MAC as 12 uppercase hex
//! characters (e.g. `DEADBEEFCAFE`). This ID is:
//! - Deterministic across reboots (factory-burned eFuse MAC)
//! - Used as the MQTT client id
//! - Substituted into every OTA topic (`<ID>/ota/...`)

use core::fmt::Write;

use crate::app::ports::DeviceIdentity;
use crate::protocol::topics::DeviceId;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the 6 bytes the call writes.
    unsafe {
        esp_idf_sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Format: `XXXXXXXXXXXX` (all six MAC bytes, uppercase hex).
pub fn device_id(mac: &MacAddress) -> DeviceId {
    let mut id = DeviceId::new();
    for b in mac {
        let _ = write!(id, "{:02X}", b);
    }
    id
}

/// [`DeviceIdentity`] backed by the factory MAC.
pub struct MacIdentity {
    mac: MacAddress,
}

impl MacIdentity {
    pub fn new() -> Self {
        Self { mac: read_mac() }
    }

    /// Identity for a known MAC, e.g. one provisioned over the air.
    pub fn from_mac(mac: MacAddress) -> Self {
        Self { mac }
    }
}

impl Default for MacIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceIdentity for MacIdentity {
    fn device_id(&self) -> DeviceId {
        device_id(&self.mac)
    }
}
