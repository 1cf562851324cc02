//! Firmware image writer adapters.
//!
//! Implements [`ImageWriterPort`] for the FUOTA session.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`EspOtaWriter`] writes into the inactive
//!   OTA partition through the `esp-ota` crate.
//! - **all other targets**: [`RamImageWriter`] keeps the image in memory
//!   for host-side tests and simulation.
//!
//! Both stream an MD5 digest of every accepted byte and compare it with
//! the announced hash before the image is committed.

use log::{info, warn};
use md5::{Digest, Md5};

use crate::app::ports::ImageWriterPort;
use crate::error::StorageError;
use crate::protocol::version::{HASH_RAW_LEN, IntegrityHash};

// ───────────────────────────────────────────────────────────────
// Shared bookkeeping
// ───────────────────────────────────────────────────────────────

/// Per-image accounting shared by the writer backends: size, digest,
/// expected hash and the latched error flag.
struct ImageTracker {
    expected_size: usize,
    written: usize,
    digest: Md5,
    expected_hash: IntegrityHash,
    error: bool,
}

impl ImageTracker {
    fn new(expected_size: usize) -> Self {
        Self {
            expected_size,
            written: 0,
            digest: Md5::new(),
            expected_hash: IntegrityHash::default(),
            error: false,
        }
    }

    fn remaining(&self) -> usize {
        self.expected_size - self.written
    }

    /// How much of `len` still fits the declared size.
    fn admit(&self, len: usize) -> usize {
        len.min(self.remaining())
    }

    fn record(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.written += data.len();
    }

    /// Check completeness and digest. Consumes the tracker.
    fn verify(self) -> Result<(), StorageError> {
        if self.remaining() != 0 {
            return Err(StorageError::Incomplete);
        }
        let out = self.digest.finalize();
        let mut raw = [0u8; HASH_RAW_LEN];
        raw.copy_from_slice(&out);
        let actual = IntegrityHash::from_digest(&raw);

        // No hash announced: accept on size alone.
        if self.expected_hash.is_empty() {
            warn!("Image: no integrity hash set, skipping digest check");
            return Ok(());
        }
        if !self.expected_hash.matches_hex(actual.as_str()) {
            warn!(
                "Image: MD5 mismatch (expected {}, got {})",
                self.expected_hash, actual
            );
            return Err(StorageError::HashMismatch);
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Host backend
// ───────────────────────────────────────────────────────────────

/// In-memory image slot with a fixed capacity.
#[cfg(not(target_os = "espidf"))]
pub struct RamImageWriter {
    capacity: usize,
    image: Vec<u8>,
    tracker: Option<ImageTracker>,
    committed: Option<Vec<u8>>,
    restarts: u32,
}

#[cfg(not(target_os = "espidf"))]
impl RamImageWriter {
    pub fn new(capacity: usize) -> Self {
        info!("RamImageWriter: simulation backend ({} bytes)", capacity);
        Self {
            capacity,
            image: Vec::new(),
            tracker: None,
            committed: None,
            restarts: 0,
        }
    }

    /// The last image that passed `finalize`.
    pub fn committed(&self) -> Option<&[u8]> {
        self.committed.as_deref()
    }

    /// Bytes written into the open session.
    pub fn staged(&self) -> &[u8] {
        &self.image
    }

    pub fn is_open(&self) -> bool {
        self.tracker.is_some()
    }

    pub fn restart_count(&self) -> u32 {
        self.restarts
    }
}

#[cfg(not(target_os = "espidf"))]
impl ImageWriterPort for RamImageWriter {
    fn begin(&mut self, total_size: u32) -> Result<(), StorageError> {
        let size = total_size as usize;
        if size == 0 {
            return Err(StorageError::BeginFailed);
        }
        if size > self.capacity {
            warn!("RamImageWriter: {} bytes exceeds capacity {}", size, self.capacity);
            return Err(StorageError::InsufficientSpace);
        }
        self.image.clear();
        self.image.reserve(size);
        self.tracker = Some(ImageTracker::new(size));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let Some(tracker) = self.tracker.as_mut() else {
            return 0;
        };
        let n = tracker.admit(data.len());
        if n < data.len() {
            tracker.error = true;
        }
        tracker.record(&data[..n]);
        self.image.extend_from_slice(&data[..n]);
        n
    }

    fn set_expected_hash(&mut self, hash: &IntegrityHash) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.expected_hash = hash.clone();
        }
    }

    fn has_error(&self) -> bool {
        self.tracker.as_ref().is_some_and(|t| t.error)
    }

    fn remaining(&self) -> usize {
        self.tracker.as_ref().map_or(0, ImageTracker::remaining)
    }

    fn finalize(&mut self) -> Result<(), StorageError> {
        let tracker = self.tracker.take().ok_or(StorageError::NotStarted)?;
        tracker.verify()?;
        self.committed = Some(core::mem::take(&mut self.image));
        info!("RamImageWriter: image committed");
        Ok(())
    }

    fn abort(&mut self) {
        if self.tracker.take().is_some() {
            warn!("RamImageWriter: session aborted");
        }
        self.image.clear();
    }

    fn restart(&mut self) {
        self.restarts += 1;
        info!("RamImageWriter: restart requested (simulation, continuing)");
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

/// OTA partition writer backed by the `esp-ota` crate.
#[cfg(target_os = "espidf")]
pub struct EspOtaWriter {
    update: Option<esp_ota::OtaUpdate>,
    tracker: Option<ImageTracker>,
}

#[cfg(target_os = "espidf")]
impl EspOtaWriter {
    pub fn new() -> Self {
        Self {
            update: None,
            tracker: None,
        }
    }
}

#[cfg(target_os = "espidf")]
impl Default for EspOtaWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl ImageWriterPort for EspOtaWriter {
    fn begin(&mut self, total_size: u32) -> Result<(), StorageError> {
        // esp-ota aborts automatically when OtaUpdate is dropped
        self.update.take();
        self.tracker = None;
        if total_size == 0 {
            return Err(StorageError::BeginFailed);
        }
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("esp-ota begin failed: {:?}", e);
            StorageError::InsufficientSpace
        })?;
        self.update = Some(update);
        self.tracker = Some(ImageTracker::new(total_size as usize));
        info!("EspOtaWriter: begin ({} bytes)", total_size);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let (Some(update), Some(tracker)) = (self.update.as_mut(), self.tracker.as_mut()) else {
            return 0;
        };
        if tracker.error {
            return 0;
        }
        let n = tracker.admit(data.len());
        if let Err(e) = update.write(&data[..n]) {
            warn!("esp-ota write failed: {:?}", e);
            tracker.error = true;
            return 0;
        }
        tracker.record(&data[..n]);
        if n < data.len() {
            tracker.error = true;
        }
        n
    }

    fn set_expected_hash(&mut self, hash: &IntegrityHash) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.expected_hash = hash.clone();
        }
    }

    fn has_error(&self) -> bool {
        self.tracker.as_ref().is_some_and(|t| t.error)
    }

    fn remaining(&self) -> usize {
        self.tracker.as_ref().map_or(0, ImageTracker::remaining)
    }

    fn finalize(&mut self) -> Result<(), StorageError> {
        let tracker = self.tracker.take().ok_or(StorageError::NotStarted)?;
        let update = self.update.take().ok_or(StorageError::NotStarted)?;
        tracker.verify()?;

        let mut completed = update.finalize().map_err(|e| {
            warn!("esp-ota finalize failed: {:?}", e);
            StorageError::CommitFailed
        })?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("esp-ota set_as_boot_partition failed: {:?}", e);
            StorageError::CommitFailed
        })?;
        info!("EspOtaWriter: image committed to boot partition");
        Ok(())
    }

    fn abort(&mut self) {
        if self.update.take().is_some() {
            warn!("EspOtaWriter: aborted");
        }
        self.tracker = None;
    }

    fn restart(&mut self) {
        info!("EspOtaWriter: rebooting into new firmware");
        esp_ota::restart();
    }
}

/// Mark the running image valid so the bootloader cancels rollback.
#[cfg(target_os = "espidf")]
pub fn mark_running_image_valid() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}
