//! Port traits — the hexagonal boundary between the update protocol and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ FuotaSession (domain)
//! ```
//!
//! Driven adapters (MQTT client, flash image writer, identity source,
//! event sinks) implement these traits. The
//! [`FuotaSession`](super::session::FuotaSession) consumes them via
//! generics, so the protocol core never touches the network or flash
//! directly.
//!
//! ## Call discipline
//!
//! - All port methods are called from one thread of control; none are
//!   re-entered.
//! - Implementations should return promptly. The session has no timeouts
//!   around individual calls.

use crate::config::QoS;
use crate::error::{StorageError, TransportError};
use crate::protocol::topics::DeviceId;
use crate::protocol::version::IntegrityHash;

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: domain ↔ MQTT broker)
// ───────────────────────────────────────────────────────────────

/// Publish/subscribe capability of the MQTT client.
///
/// Inbound messages are not pulled through this trait; the host forwards
/// each delivered `(topic, payload)` to
/// [`FuotaSession::on_message`](super::session::FuotaSession::on_message).
pub trait MqttPort {
    /// Whether the broker session is currently up.
    fn is_connected(&self) -> bool;

    /// Subscribe to `topic`.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Publish `payload` on `topic`.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Image writer port (driven adapter: domain → program storage)
// ───────────────────────────────────────────────────────────────

/// Writes one firmware image into the inactive program slot.
///
/// Lifecycle: `begin` → `write`* → `finalize` | `abort`. A successful
/// `finalize` verifies the whole-image hash and marks the image bootable;
/// `restart` then boots into it.
pub trait ImageWriterPort {
    /// Open a write session for an image of `total_size` bytes.
    fn begin(&mut self, total_size: u32) -> Result<(), StorageError>;

    /// Append `data`. Returns the number of bytes accepted; a short count
    /// latches the error flag.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Hash the image must match at `finalize`.
    fn set_expected_hash(&mut self, hash: &IntegrityHash);

    /// Whether a previous write failed.
    fn has_error(&self) -> bool;

    /// Bytes still expected before the image is complete.
    fn remaining(&self) -> usize;

    /// Verify and commit the image.
    fn finalize(&mut self) -> Result<(), StorageError>;

    /// Discard the open session, if any.
    fn abort(&mut self);

    /// Reboot into the committed image. Does not return on hardware.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Identity port
// ───────────────────────────────────────────────────────────────

/// Source of the device identifier used to name topics when the host does
/// not supply one explicitly.
pub trait DeviceIdentity {
    fn device_id(&self) -> DeviceId;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The session emits structured [`FuotaEvent`](super::events::FuotaEvent)s
/// through this port. Adapters decide where they go (serial log, status
/// LED, telemetry topic, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::FuotaEvent);
}

/// Sink that drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &super::events::FuotaEvent) {}
}
