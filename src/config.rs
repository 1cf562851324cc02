//! FUOTA client configuration
//!
//! All tunable parameters of the update client. Values can be supplied as
//! JSON (e.g. baked into the image or pushed by provisioning) and are
//! validated before use.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::topics;

/// MQTT delivery guarantee requested for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// How payloads on the data topic are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFraming {
    /// Whole payload is image bytes; no per-block ack.
    Raw,
    /// 4-byte BE block index, then image bytes; each block is acked.
    Indexed,
}

/// Core client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuotaConfig {
    // --- Subscriptions ---
    /// Minimum spacing between subscription attempts (milliseconds)
    pub subscribe_retry_interval_ms: u64,
    /// QoS for the setup and data subscriptions
    pub subscribe_qos: QoS,
    /// Forget subscriptions when the broker connection drops
    pub resubscribe_on_reconnect: bool,

    // --- Transfer ---
    /// Largest image an offer may announce (bytes)
    pub max_image_size: u32,
    /// Abort a transfer that makes no progress for this long (milliseconds)
    pub transfer_timeout_ms: Option<u64>,
    /// Data topic payload layout
    pub data_framing: DataFraming,

    // --- Topics ---
    /// Prefix placed before the device id in every topic
    pub topic_root: String,
}

impl Default for FuotaConfig {
    fn default() -> Self {
        Self {
            // Subscriptions
            subscribe_retry_interval_ms: 5000,
            subscribe_qos: QoS::AtLeastOnce,
            resubscribe_on_reconnect: true,

            // Transfer
            max_image_size: 4 * 1024 * 1024, // 4 MB
            transfer_timeout_ms: Some(60_000),
            data_framing: DataFraming::Raw,

            // Topics
            topic_root: String::new(),
        }
    }
}

impl FuotaConfig {
    /// Range-check every field.
    pub fn validate(&self) -> Result<()> {
        if self.subscribe_retry_interval_ms == 0 {
            return Err(Error::Config("subscribe_retry_interval_ms must be > 0"));
        }
        if self.max_image_size == 0 {
            return Err(Error::Config("max_image_size must be > 0"));
        }
        if self.transfer_timeout_ms == Some(0) {
            return Err(Error::Config("transfer_timeout_ms must be > 0 when set"));
        }
        if !topics::root_fits(&self.topic_root) {
            return Err(Error::Config("topic_root too long"));
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let cfg: Self =
            serde_json::from_slice(json).map_err(|_| Error::Config("malformed JSON"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
