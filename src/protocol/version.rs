//! Firmware metadata and version ordering.
//!
//! Versions are totally ordered by a 24-bit ordinal
//! (`major << 16 | minor << 8 | patch`). The all-zero version is a
//! wildcard: an offer carrying `0.0.0` is accepted regardless of what the
//! device runs (forced or test rollouts).

use core::cmp::Ordering;
use core::fmt;

use serde::{Deserialize, Serialize};

/// Length of a rendered integrity hash (16 digest bytes as hex).
pub const HASH_HEX_LEN: usize = 32;

/// Raw digest length carried on the wire.
pub const HASH_RAW_LEN: usize = 16;

// ── Version ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    /// The "accept unconditionally" sentinel.
    pub const WILDCARD: Self = Self::new(0, 0, 0);

    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Pack the triple into its 24-bit ordinal.
    pub const fn ordinal(self) -> u32 {
        ordinal(self.major, self.minor, self.patch)
    }

    pub const fn is_wildcard(self) -> bool {
        self.major == 0 && self.minor == 0 && self.patch == 0
    }

    /// Whether an offer of `self` should replace a device running `running`.
    pub fn supersedes(self, running: Self) -> bool {
        self.is_wildcard() || self > running
    }

    /// Parse `major.minor.patch`; any pre-release or build suffix after
    /// the patch number is ignored (`1.2.3-rc1` → `1.2.3`).
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let rest = parts.next()?;
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let patch = rest[..end].parse().ok()?;
        Some(Self::new(major, minor, patch))
    }
}

/// `major << 16 | minor << 8 | patch`.
pub const fn ordinal(major: u8, minor: u8, patch: u8) -> u32 {
    (major as u32) << 16 | (minor as u32) << 8 | patch as u32
}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ── Integrity hash ────────────────────────────────────────────

/// Whole-image digest rendered as 32 uppercase hex characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityHash(heapless::String<HASH_HEX_LEN>);

impl IntegrityHash {
    /// Render raw digest bytes as uppercase hex.
    pub fn from_digest(digest: &[u8; HASH_RAW_LEN]) -> Self {
        use core::fmt::Write;
        let mut s = heapless::String::new();
        for b in digest {
            // Capacity is exactly 2 * HASH_RAW_LEN.
            let _ = write!(s, "{b:02X}");
        }
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive comparison against a hex rendering of a digest.
    pub fn matches_hex(&self, hex: &str) -> bool {
        self.0.len() == HASH_HEX_LEN && self.0.eq_ignore_ascii_case(hex)
    }
}

impl fmt::Display for IntegrityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Firmware info ─────────────────────────────────────────────

/// Metadata of a firmware image, either running or offered.
///
/// `size == 0` means "no valid offer".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub version: FirmwareVersion,
    pub size: u32,
    pub integrity_hash: IntegrityHash,
}

impl FirmwareInfo {
    pub fn new(version: FirmwareVersion, size: u32, integrity_hash: IntegrityHash) -> Self {
        Self {
            version,
            size,
            integrity_hash,
        }
    }

    /// Description of the running image; size and hash are not tracked.
    pub fn running(version: FirmwareVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn is_offer_present(&self) -> bool {
        self.size != 0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
