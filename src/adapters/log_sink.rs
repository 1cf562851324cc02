//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured session events to the
//! logger (UART / USB-CDC in production). A telemetry or LED adapter would
//! implement the same trait.

use log::{info, warn};

use crate::app::events::FuotaEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`FuotaEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &FuotaEvent) {
        match event {
            FuotaEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            FuotaEvent::OfferReceived(offer) => {
                info!(
                    "OFFER | v{} | {} bytes | md5={}",
                    offer.version, offer.size, offer.integrity_hash
                );
            }
            FuotaEvent::OfferRejected(reason) => {
                info!("OFFER | rejected: {}", reason);
            }
            FuotaEvent::TransferStarted { size } => {
                info!("XFER | started, {} bytes", size);
            }
            FuotaEvent::Progress { written, total } => {
                let pct = u64::from(*written) * 100 / u64::from((*total).max(1));
                info!("XFER | {}/{} bytes ({}%)", written, total, pct);
            }
            FuotaEvent::UpdateCompleted => {
                info!("DONE | image committed, restarting");
            }
            FuotaEvent::UpdateFailed(reason) => {
                warn!("FAIL | {}", reason);
            }
        }
    }
}
