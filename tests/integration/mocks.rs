//! Mock adapters for integration tests.
//!
//! Records every storage call and every emitted event so tests can assert
//! on the full history without touching flash.

use mqtt_fuota::adapters::mqtt::LoopbackMqtt;
use mqtt_fuota::app::events::FuotaEvent;
use mqtt_fuota::app::ports::{EventSink, ImageWriterPort};
use mqtt_fuota::app::session::{FuotaSession, SessionState};
use mqtt_fuota::config::FuotaConfig;
use mqtt_fuota::error::StorageError;
use mqtt_fuota::protocol::codec::{ControlFrame, encode_last_fw_info};
use mqtt_fuota::protocol::topics::TopicSet;
use mqtt_fuota::protocol::version::{FirmwareInfo, FirmwareVersion, IntegrityHash};

pub const DEVICE_ID: &str = "ESP32-01";
pub const SETUP: &str = "ESP32-01/ota/setup";
pub const DATA: &str = "ESP32-01/ota/data";
pub const CONTROL: &str = "ESP32-01/ota/control";
pub const ACK: &str = "ESP32-01/ota/ack";

// ── Storage call record ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterCall {
    Begin(u32),
    Write(usize),
    SetExpectedHash(IntegrityHash),
    Finalize,
    Abort,
    Restart,
}

// ── MockWriter ────────────────────────────────────────────────

/// Image writer that records its calls and can be told to fail.
pub struct MockWriter {
    pub calls: Vec<WriterCall>,
    pub image: Vec<u8>,
    pub fail_begin: Option<StorageError>,
    pub fail_finalize: Option<StorageError>,
    /// Accept at most this many bytes per `write`, latching the error
    /// flag when a call is cut short.
    pub short_write_limit: Option<usize>,
    /// Pretend this many bytes are still outstanding at finalize time.
    pub force_remaining: Option<usize>,
    size: usize,
    error: bool,
}

#[allow(dead_code)]
impl MockWriter {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            image: Vec::new(),
            fail_begin: None,
            fail_finalize: None,
            short_write_limit: None,
            force_remaining: None,
            size: 0,
            error: false,
        }
    }

    pub fn count(&self, pred: impl Fn(&WriterCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn begins(&self) -> usize {
        self.count(|c| matches!(c, WriterCall::Begin(_)))
    }

    pub fn writes(&self) -> usize {
        self.count(|c| matches!(c, WriterCall::Write(_)))
    }

    pub fn aborts(&self) -> usize {
        self.count(|c| matches!(c, WriterCall::Abort))
    }

    pub fn restarts(&self) -> usize {
        self.count(|c| matches!(c, WriterCall::Restart))
    }

    pub fn finalizes(&self) -> usize {
        self.count(|c| matches!(c, WriterCall::Finalize))
    }
}

impl Default for MockWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriterPort for MockWriter {
    fn begin(&mut self, total_size: u32) -> Result<(), StorageError> {
        self.calls.push(WriterCall::Begin(total_size));
        if let Some(e) = self.fail_begin {
            return Err(e);
        }
        self.size = total_size as usize;
        self.image.clear();
        self.error = false;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.calls.push(WriterCall::Write(data.len()));
        let n = match self.short_write_limit {
            Some(limit) if data.len() > limit => {
                self.error = true;
                limit
            }
            _ => data.len(),
        };
        self.image.extend_from_slice(&data[..n]);
        n
    }

    fn set_expected_hash(&mut self, hash: &IntegrityHash) {
        self.calls.push(WriterCall::SetExpectedHash(hash.clone()));
    }

    fn has_error(&self) -> bool {
        self.error
    }

    fn remaining(&self) -> usize {
        self.force_remaining
            .unwrap_or_else(|| self.size.saturating_sub(self.image.len()))
    }

    fn finalize(&mut self) -> Result<(), StorageError> {
        self.calls.push(WriterCall::Finalize);
        match self.fail_finalize {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn abort(&mut self) {
        self.calls.push(WriterCall::Abort);
    }

    fn restart(&mut self) {
        self.calls.push(WriterCall::Restart);
    }
}

// ── Event recorder ────────────────────────────────────────────

pub struct EventLog {
    pub events: Vec<FuotaEvent>,
}

#[allow(dead_code)]
impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn contains(&self, event: &FuotaEvent) -> bool {
        self.events.contains(event)
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.events
            .iter()
            .filter_map(|e| match e {
                FuotaEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &FuotaEvent) {
        self.events.push(event.clone());
    }
}

// ── Session fixtures ──────────────────────────────────────────

pub type TestSession = FuotaSession<LoopbackMqtt, MockWriter>;

pub fn make_session_with(config: FuotaConfig, running: FirmwareVersion) -> TestSession {
    let topics = TopicSet::new(&config.topic_root, DEVICE_ID).unwrap();
    FuotaSession::new(
        config,
        FirmwareInfo::running(running),
        topics,
        LoopbackMqtt::new(),
        MockWriter::new(),
    )
    .unwrap()
}

/// Session for a device running 1.0.0 with default config.
pub fn make_session() -> TestSession {
    make_session_with(FuotaConfig::default(), FirmwareVersion::new(1, 0, 0))
}

pub fn offer(version: FirmwareVersion, size: u32) -> [u8; 24] {
    encode_last_fw_info(version, size, &[0x11; 16])
}

/// Control frames published so far, decoded.
#[allow(dead_code)]
pub fn controls(session: &TestSession) -> Vec<ControlFrame> {
    session
        .mqtt()
        .published_on(CONTROL)
        .into_iter()
        .filter_map(ControlFrame::from_bytes)
        .collect()
}
