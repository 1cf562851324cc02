//! Outbound session events.
//!
//! The [`FuotaSession`](super::session::FuotaSession) emits these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide where they go; the firmware logs them to serial.

use core::fmt;

use crate::protocol::version::FirmwareInfo;

use super::session::SessionState;

/// Structured events emitted by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuotaEvent {
    /// The session moved between states.
    StateChanged { from: SessionState, to: SessionState },

    /// A "last firmware info" frame replaced the offer.
    OfferReceived(FirmwareInfo),

    /// The offer was not taken.
    OfferRejected(RejectReason),

    /// Storage accepted a new episode of `size` bytes.
    TransferStarted { size: u32 },

    /// Emitted at each 10 % step.
    Progress { written: u32, total: u32 },

    /// Image committed; restart follows.
    UpdateCompleted,

    /// Episode abandoned; `COMPLETED_FAIL` was published.
    UpdateFailed(FailureReason),
}

/// Why an offer did not lead to an update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Offered version is not newer than the running one.
    NotNewer,
    /// Size is zero or above the configured maximum.
    InvalidSize,
}

/// Why an episode ended without a committed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The writer latched a write error.
    StorageWrite,
    /// Finalize was reached with bytes outstanding.
    IncompleteImage { remaining: usize },
    /// Verification or commit failed.
    Finalize,
    /// No data arrived within the transfer timeout.
    Stalled,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNewer => write!(f, "offered version is not newer"),
            Self::InvalidSize => write!(f, "offered size out of range"),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageWrite => write!(f, "storage write error"),
            Self::IncompleteImage { remaining } => {
                write!(f, "image incomplete ({remaining} bytes outstanding)")
            }
            Self::Finalize => write!(f, "image verification/commit failed"),
            Self::Stalled => write!(f, "transfer stalled"),
        }
    }
}
