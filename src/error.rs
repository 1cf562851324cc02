//! Unified error types for the FUOTA client.
//!
//! A single `Error` enum that every subsystem converts into, so the host
//! loop handles failures uniformly. All variants are `Copy` so they can be
//! passed through the session and its events without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An inbound frame could not be decoded.
    Frame(FrameError),
    /// The image writer refused or failed an operation.
    Storage(StorageError),
    /// The pub/sub transport failed an operation.
    Transport(TransportError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Frame errors
// ---------------------------------------------------------------------------

/// Reasons an inbound frame is dropped. None of these produce a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Zero-length payload.
    Empty,
    /// Setup command byte outside the known set.
    UnknownCommand(u8),
    /// Length does not match the layout of the command byte.
    BadLength { command: u8, expected: usize, actual: usize },
    /// Indexed data frame shorter than its 4-byte block index.
    MissingBlockIndex,
    /// Message arrived on a topic the session does not own.
    UnknownTopic,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty payload"),
            Self::UnknownCommand(cmd) => write!(f, "unknown setup command 0x{cmd:02X}"),
            Self::BadLength {
                command,
                expected,
                actual,
            } => write!(
                f,
                "command 0x{command:02X} expects {expected} bytes, got {actual}"
            ),
            Self::MissingBlockIndex => write!(f, "data frame shorter than block index"),
            Self::UnknownTopic => write!(f, "message on unknown topic"),
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Not enough space for the announced image.
    InsufficientSpace,
    /// No valid offer exists to begin a transfer for.
    NoOffer,
    /// Partition could not be opened.
    BeginFailed,
    /// A write reported fewer bytes than requested.
    WriteFailed,
    /// Finalize was called with bytes still outstanding.
    Incomplete,
    /// The image digest does not match the announced hash.
    HashMismatch,
    /// Commit (mark bootable) failed.
    CommitFailed,
    /// Operation requires an open write session.
    NotStarted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientSpace => write!(f, "insufficient space for image"),
            Self::NoOffer => write!(f, "no valid firmware offer"),
            Self::BeginFailed => write!(f, "image begin failed"),
            Self::WriteFailed => write!(f, "image write failed"),
            Self::Incomplete => write!(f, "image incomplete"),
            Self::HashMismatch => write!(f, "integrity hash mismatch"),
            Self::CommitFailed => write!(f, "image commit failed"),
            Self::NotStarted => write!(f, "no image write in progress"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    NotConnected,
    SubscribeFailed,
    PublishFailed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "broker not connected"),
            Self::SubscribeFailed => write!(f, "MQTT subscribe failed"),
            Self::PublishFailed => write!(f, "MQTT publish failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
