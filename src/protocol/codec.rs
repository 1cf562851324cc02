//! Fixed-layout binary frames exchanged over the OTA topics.
//!
//! Inbound setup frames (server → device, `<ID>/ota/setup`):
//! ```text
//! ┌──────┬──────────────────────────────────────────────────────────┐
//! │ 0x00 │ trigger update check                          (1 byte)   │
//! ├──────┼───────┬───────┬───────┬────────────┬────────────────────┤
//! │ 0x01 │ major │ minor │ patch │ size BE u32│ digest (16 B raw)  │
//! │      │  1 B  │  1 B  │  1 B  │    4 B     │                    │
//! ├──────┼───────┴───────┴───────┴────────────┴────────────────────┤
//! │ 0x02 │ FUOTA start                                   (1 byte)   │
//! └──────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! Outbound control and ack frames are 4-byte opaque tags. Data blocks
//! (`<ID>/ota/data`) are either raw image bytes or, in indexed mode,
//! a big-endian `u32` block index followed by image bytes.

use crate::error::FrameError;

use super::version::{FirmwareInfo, FirmwareVersion, HASH_RAW_LEN, IntegrityHash};

/// Setup command bytes.
pub const CMD_TRIGGER_CHECK: u8 = 0x00;
pub const CMD_LAST_FW_INFO: u8 = 0x01;
pub const CMD_FUOTA_START: u8 = 0x02;

/// Total length of a "last firmware info" frame.
pub const LAST_FW_INFO_LEN: usize = 1 + 3 + 4 + HASH_RAW_LEN;

/// Big-endian block index prefix of an indexed data frame.
pub const BLOCK_INDEX_LEN: usize = 4;

/// "FUOTA start accepted", published on the ack topic.
pub const ACK_FUOTA_START: [u8; 4] = [0xAA, 0xAA, 0xAA, 0xAA];

// ── Outbound control frames ───────────────────────────────────

/// Device → server control tags, published on the control topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    Check,
    RequestUpdate,
    CompletedOk,
    CompletedFail,
}

impl ControlFrame {
    pub const fn bytes(self) -> [u8; 4] {
        match self {
            Self::Check => [0xAF, 0x12, 0x34, 0x56],
            Self::RequestUpdate => [0x55, 0x55, 0xFF, 0xFF],
            Self::CompletedOk => [0x55, 0xAA, 0xFF, 0xFF],
            Self::CompletedFail => [0x55, 0xAA, 0x00, 0x00],
        }
    }

    /// Reverse lookup, used by host tooling and tests to read what the
    /// device published.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        [
            Self::Check,
            Self::RequestUpdate,
            Self::CompletedOk,
            Self::CompletedFail,
        ]
        .into_iter()
        .find(|c| c.bytes() == bytes)
    }
}

/// Acknowledge data block `index` (indexed framing only).
pub const fn encode_block_ack(index: u32) -> [u8; 4] {
    index.to_be_bytes()
}

// ── Inbound setup frames ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupFrame {
    TriggerCheck,
    LastFirmwareInfo(FirmwareInfo),
    FuotaStart,
}

/// Decode a setup frame. The length must match the command exactly.
pub fn decode_setup(payload: &[u8]) -> Result<SetupFrame, FrameError> {
    let (&command, _) = payload.split_first().ok_or(FrameError::Empty)?;

    let expected = match command {
        CMD_TRIGGER_CHECK | CMD_FUOTA_START => 1,
        CMD_LAST_FW_INFO => LAST_FW_INFO_LEN,
        other => return Err(FrameError::UnknownCommand(other)),
    };
    if payload.len() != expected {
        return Err(FrameError::BadLength {
            command,
            expected,
            actual: payload.len(),
        });
    }

    Ok(match command {
        CMD_TRIGGER_CHECK => SetupFrame::TriggerCheck,
        CMD_FUOTA_START => SetupFrame::FuotaStart,
        _ => SetupFrame::LastFirmwareInfo(decode_fw_info(payload)),
    })
}

/// Caller guarantees `payload.len() == LAST_FW_INFO_LEN`.
fn decode_fw_info(payload: &[u8]) -> FirmwareInfo {
    let version = FirmwareVersion::new(payload[1], payload[2], payload[3]);
    let size = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let mut digest = [0u8; HASH_RAW_LEN];
    digest.copy_from_slice(&payload[8..LAST_FW_INFO_LEN]);
    FirmwareInfo::new(version, size, IntegrityHash::from_digest(&digest))
}

/// Encode a "last firmware info" frame (server side; used by tests and
/// host tooling).
pub fn encode_last_fw_info(
    version: FirmwareVersion,
    size: u32,
    digest: &[u8; HASH_RAW_LEN],
) -> [u8; LAST_FW_INFO_LEN] {
    let mut out = [0u8; LAST_FW_INFO_LEN];
    out[0] = CMD_LAST_FW_INFO;
    out[1] = version.major;
    out[2] = version.minor;
    out[3] = version.patch;
    out[4..8].copy_from_slice(&size.to_be_bytes());
    out[8..].copy_from_slice(digest);
    out
}

// ── Inbound data blocks ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlock<'a> {
    /// Present only with indexed framing.
    pub index: Option<u32>,
    pub bytes: &'a [u8],
}

/// Split an indexed data frame into its block index and image bytes.
pub fn decode_indexed_block(payload: &[u8]) -> Result<DataBlock<'_>, FrameError> {
    if payload.len() < BLOCK_INDEX_LEN {
        return Err(FrameError::MissingBlockIndex);
    }
    let (head, bytes) = payload.split_at(BLOCK_INDEX_LEN);
    let index = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    Ok(DataBlock {
        index: Some(index),
        bytes,
    })
}

/// A raw data frame is image bytes in its entirety.
pub fn decode_raw_block(payload: &[u8]) -> DataBlock<'_> {
    DataBlock {
        index: None,
        bytes: payload,
    }
}
