//! Firmware session: the FUOTA protocol core.
//!
//! [`FuotaSession`] owns the running/offered firmware metadata, the
//! progress counter and the single protocol state. It consumes decoded
//! frames and storage feedback, and emits control/ack frames and storage
//! commands through its ports.
//!
//! ```text
//!            check            offer newer / 0.0.0          start
//!   Idle ───────────▶ CheckRequested ───────────▶ UpdateRequested ─────▶ Transferring
//!    ▲  ◀─── offer not newer ───┘                                          │  last byte
//!    │                                                                     ▼
//!    └──────────── storage error / stall / finalize failed ◀──────── Completing
//!                                                                          │ finalize ok
//!                                                                          ▼
//!                                                                       restart
//! ```
//!
//! Two entry points drive it, both from the same thread:
//! [`on_message`](FuotaSession::on_message) for every delivered MQTT
//! message and [`process`](FuotaSession::process) once per polling tick.
//! Nothing happens while the broker is disconnected.

use log::{debug, info, warn};

use crate::config::{DataFraming, FuotaConfig};
use crate::error::{Error, FrameError, Result, StorageError, TransportError};
use crate::protocol::codec::{
    self, ACK_FUOTA_START, ControlFrame, DataBlock, SetupFrame, encode_block_ack,
};
use crate::protocol::topics::{InboundTopic, TopicSet};
use crate::protocol::version::FirmwareInfo;

use super::events::{FailureReason, FuotaEvent, RejectReason};
use super::ports::{DeviceIdentity, EventSink, ImageWriterPort, MqttPort};
use super::supervisor::SubscriptionSupervisor;

// ───────────────────────────────────────────────────────────────
// State
// ───────────────────────────────────────────────────────────────

/// Protocol state, as observed from outside the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No pending request, no transfer.
    Idle,
    /// CHECK published; waiting for the server's firmware info.
    CheckRequested,
    /// REQUEST_UPDATE published; waiting for FUOTA start.
    UpdateRequested,
    /// Storage open; data blocks are applied.
    Transferring,
    /// Final byte received; finalize runs on the next tick.
    Completing,
}

/// Bookkeeping of one transfer episode.
#[derive(Debug, Clone, Copy)]
struct Episode {
    /// Image size snapshot taken at start.
    target: u32,
    /// Next expected block index (indexed framing).
    next_block: u32,
    /// Last reported 10 % step.
    progress_step: u8,
    /// `bytes_written` at the last stall check.
    stall_mark: u32,
    /// When `stall_mark` was taken.
    stall_since_ms: Option<u64>,
}

impl Episode {
    fn new(target: u32) -> Self {
        Self {
            target,
            next_block: 0,
            progress_step: 0,
            stall_mark: 0,
            stall_since_ms: None,
        }
    }
}

/// Internal state; episode data only exists while an episode does.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    CheckRequested,
    UpdateRequested,
    Transferring(Episode),
    Completing,
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::CheckRequested => SessionState::CheckRequested,
            Self::UpdateRequested => SessionState::UpdateRequested,
            Self::Transferring(_) => SessionState::Transferring,
            Self::Completing => SessionState::Completing,
        }
    }

    fn in_episode(&self) -> bool {
        matches!(self, Self::Transferring(_) | Self::Completing)
    }
}

// ───────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────

pub struct FuotaSession<M: MqttPort, W: ImageWriterPort> {
    config: FuotaConfig,
    device: FirmwareInfo,
    offered: FirmwareInfo,
    topics: TopicSet,
    phase: Phase,
    bytes_written: u32,
    supervisor: SubscriptionSupervisor,
    was_connected: bool,
    mqtt: M,
    writer: W,
}

impl<M: MqttPort, W: ImageWriterPort> FuotaSession<M, W> {
    /// Construct the session for a device running `device`.
    pub fn new(
        config: FuotaConfig,
        device: FirmwareInfo,
        topics: TopicSet,
        mqtt: M,
        writer: W,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "FUOTA session: running v{}, topics {} / {}",
            device.version,
            topics.setup(),
            topics.data()
        );
        Ok(Self {
            supervisor: SubscriptionSupervisor::new(&config),
            config,
            device,
            offered: FirmwareInfo::default(),
            topics,
            phase: Phase::Idle,
            bytes_written: 0,
            was_connected: false,
            mqtt,
            writer,
        })
    }

    // ── Entry points ──────────────────────────────────────────

    /// Ask the server for its latest firmware (local trigger).
    pub fn request_update_check(&mut self, sink: &mut impl EventSink) -> Result<()> {
        if !self.mqtt.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        self.begin_check(sink);
        Ok(())
    }

    /// Handle one delivered MQTT message.
    ///
    /// Malformed frames return `Err` but have no other effect; nothing is
    /// sent back to the server for them.
    pub fn on_message(
        &mut self,
        topic: &str,
        payload: &[u8],
        sink: &mut impl EventSink,
    ) -> Result<()> {
        if !self.mqtt.is_connected() {
            debug!("FUOTA: dormant, message on {} ignored", topic);
            return Ok(());
        }
        match self.topics.classify(topic) {
            Some(InboundTopic::Setup) => self.handle_setup(payload, sink),
            Some(InboundTopic::Data) => self.handle_data(payload, sink),
            None => Err(FrameError::UnknownTopic.into()),
        }
    }

    /// One polling tick: supervise subscriptions, watch storage, finish
    /// or fail the episode.
    pub fn process(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        if !self.mqtt.is_connected() {
            if self.was_connected {
                warn!("FUOTA: broker connection lost, going dormant");
                if self.config.resubscribe_on_reconnect {
                    self.supervisor.reset();
                }
            }
            self.was_connected = false;
            return;
        }
        if !self.was_connected {
            info!("FUOTA: broker connected");
            self.was_connected = true;
            // Time spent offline does not count towards the stall timeout.
            if let Phase::Transferring(ep) = &mut self.phase {
                ep.stall_since_ms = None;
            }
        }

        self.supervisor.poll(now_ms, &mut self.mqtt, &self.topics);

        match self.phase {
            Phase::Transferring(mut ep) => {
                if self.writer.has_error() {
                    self.fail(FailureReason::StorageWrite, sink);
                } else if self.is_stalled(&mut ep, now_ms) {
                    self.fail(FailureReason::Stalled, sink);
                } else {
                    self.phase = Phase::Transferring(ep);
                }
            }
            Phase::Completing => {
                if self.writer.has_error() {
                    self.fail(FailureReason::StorageWrite, sink);
                } else {
                    self.complete(sink);
                }
            }
            _ => {}
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.phase.state()
    }

    /// Firmware the device is running.
    pub fn device(&self) -> &FirmwareInfo {
        &self.device
    }

    /// Latest server offer; `size == 0` means none.
    pub fn offered(&self) -> &FirmwareInfo {
        &self.offered
    }

    /// Bytes applied to storage in the current (or last) episode.
    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn supervisor(&self) -> &SubscriptionSupervisor {
        &self.supervisor
    }

    pub fn mqtt(&self) -> &M {
        &self.mqtt
    }

    pub fn mqtt_mut(&mut self) -> &mut M {
        &mut self.mqtt
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    // ── Setup frames ──────────────────────────────────────────

    fn handle_setup(&mut self, payload: &[u8], sink: &mut impl EventSink) -> Result<()> {
        let frame = codec::decode_setup(payload).map_err(|e| {
            warn!("FUOTA: setup frame dropped: {}", e);
            Error::from(e)
        })?;
        match frame {
            SetupFrame::TriggerCheck => {
                self.begin_check(sink);
                Ok(())
            }
            SetupFrame::LastFirmwareInfo(info) => {
                self.handle_offer(info, sink);
                Ok(())
            }
            SetupFrame::FuotaStart => self.start_episode(sink),
        }
    }

    fn begin_check(&mut self, sink: &mut impl EventSink) {
        if self.phase.in_episode() {
            warn!("FUOTA: update check ignored, transfer in progress");
            return;
        }
        self.offered.clear();
        self.publish_control(ControlFrame::Check);
        self.transition(Phase::CheckRequested, sink);
    }

    fn handle_offer(&mut self, info: FirmwareInfo, sink: &mut impl EventSink) {
        // Keep the running episode's offer so the clamping bound and the
        // expected digest cannot change mid-episode.
        if self.phase.in_episode() {
            warn!("FUOTA: firmware info ignored, transfer in progress");
            return;
        }
        self.offered = info;
        sink.emit(&FuotaEvent::OfferReceived(self.offered.clone()));

        if !self.offer_size_valid() {
            info!("FUOTA: offer size {} out of range", self.offered.size);
            sink.emit(&FuotaEvent::OfferRejected(RejectReason::InvalidSize));
            self.transition(Phase::Idle, sink);
            return;
        }
        if !self.offered.version.supersedes(self.device.version) {
            info!(
                "FUOTA: already up to date (running v{}, offered v{})",
                self.device.version, self.offered.version
            );
            sink.emit(&FuotaEvent::OfferRejected(RejectReason::NotNewer));
            self.transition(Phase::Idle, sink);
            return;
        }

        info!("FUOTA: requesting update to v{}", self.offered.version);
        self.publish_control(ControlFrame::RequestUpdate);
        self.transition(Phase::UpdateRequested, sink);
    }

    fn start_episode(&mut self, sink: &mut impl EventSink) -> Result<()> {
        if self.phase.in_episode() {
            warn!("FUOTA: restart requested mid-transfer, aborting current image");
            self.writer.abort();
        }
        if !self.offer_size_valid() {
            warn!("FUOTA: start without a valid offer");
            self.transition(Phase::Idle, sink);
            return Err(StorageError::NoOffer.into());
        }

        let size = self.offered.size;
        if let Err(e) = self.writer.begin(size) {
            warn!("FUOTA: storage begin for {} bytes failed: {}", size, e);
            self.transition(Phase::Idle, sink);
            return Err(e.into());
        }

        self.bytes_written = 0;
        self.writer.set_expected_hash(&self.offered.integrity_hash);
        self.transition(Phase::Transferring(Episode::new(size)), sink);
        self.publish(PublishTo::Ack, &ACK_FUOTA_START);
        sink.emit(&FuotaEvent::TransferStarted { size });
        Ok(())
    }

    fn offer_size_valid(&self) -> bool {
        (1..=self.config.max_image_size).contains(&self.offered.size)
    }

    // ── Data frames ───────────────────────────────────────────

    fn handle_data(&mut self, payload: &[u8], sink: &mut impl EventSink) -> Result<()> {
        let Phase::Transferring(mut ep) = self.phase else {
            debug!("FUOTA: data frame outside transfer dropped");
            return Ok(());
        };

        let block = match self.config.data_framing {
            DataFraming::Raw => codec::decode_raw_block(payload),
            DataFraming::Indexed => codec::decode_indexed_block(payload)?,
        };
        if let Some(index) = block.index {
            if index != ep.next_block {
                warn!(
                    "FUOTA: block {} dropped, expecting {}",
                    index, ep.next_block
                );
                return Ok(());
            }
        }

        let accepted = self.apply_block(&block, ep.target);
        if let Some(index) = block.index {
            if accepted {
                ep.next_block += 1;
                self.publish(PublishTo::Ack, &encode_block_ack(index));
            }
        }

        let step = progress_step(self.bytes_written, ep.target);
        if step > ep.progress_step {
            ep.progress_step = step;
            sink.emit(&FuotaEvent::Progress {
                written: self.bytes_written,
                total: ep.target,
            });
        }

        if self.bytes_written >= ep.target {
            info!("FUOTA: all {} bytes received", ep.target);
            self.transition(Phase::Completing, sink);
        } else {
            self.phase = Phase::Transferring(ep);
        }
        Ok(())
    }

    /// Write the block, clamped to the image size. Returns `true` when
    /// storage took every byte offered to it.
    fn apply_block(&mut self, block: &DataBlock<'_>, target: u32) -> bool {
        let room = (target - self.bytes_written) as usize;
        let len = block.bytes.len().min(room);
        if len < block.bytes.len() {
            debug!(
                "FUOTA: clamping block from {} to {} bytes",
                block.bytes.len(),
                len
            );
        }
        if len == 0 {
            return true;
        }
        let written = self.writer.write(&block.bytes[..len]).min(len);
        self.bytes_written += written as u32;
        written == len
    }

    // ── Episode end ───────────────────────────────────────────

    fn is_stalled(&self, ep: &mut Episode, now_ms: u64) -> bool {
        let Some(timeout) = self.config.transfer_timeout_ms else {
            return false;
        };
        match ep.stall_since_ms {
            Some(since) if ep.stall_mark == self.bytes_written => {
                now_ms.saturating_sub(since) >= timeout
            }
            _ => {
                ep.stall_mark = self.bytes_written;
                ep.stall_since_ms = Some(now_ms);
                false
            }
        }
    }

    fn complete(&mut self, sink: &mut impl EventSink) {
        let remaining = self.writer.remaining();
        if remaining != 0 {
            self.fail(FailureReason::IncompleteImage { remaining }, sink);
            return;
        }
        if let Err(e) = self.writer.finalize() {
            warn!("FUOTA: finalize failed: {}", e);
            self.fail(FailureReason::Finalize, sink);
            return;
        }

        info!("FUOTA: update to v{} complete", self.offered.version);
        self.publish_control(ControlFrame::CompletedOk);
        sink.emit(&FuotaEvent::UpdateCompleted);
        self.writer.restart();

        // Only reached when restart is simulated.
        self.transition(Phase::Idle, sink);
    }

    fn fail(&mut self, reason: FailureReason, sink: &mut impl EventSink) {
        warn!("FUOTA: update failed: {}", reason);
        self.writer.abort();
        self.publish_control(ControlFrame::CompletedFail);
        sink.emit(&FuotaEvent::UpdateFailed(reason));
        self.transition(Phase::Idle, sink);
    }

    // ── Internal ──────────────────────────────────────────────

    fn transition(&mut self, next: Phase, sink: &mut impl EventSink) {
        let from = self.phase.state();
        let to = next.state();
        self.phase = next;
        if from != to {
            debug!("FUOTA transition: {:?} -> {:?}", from, to);
            sink.emit(&FuotaEvent::StateChanged { from, to });
        }
    }

    fn publish_control(&mut self, frame: ControlFrame) {
        self.publish(PublishTo::Control, &frame.bytes());
    }

    fn publish(&mut self, to: PublishTo, payload: &[u8]) {
        let topic = match to {
            PublishTo::Control => self.topics.control(),
            PublishTo::Ack => self.topics.ack(),
        };
        if let Err(e) = self.mqtt.publish(topic, payload) {
            warn!("FUOTA: publish to {} failed: {}", topic, e);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PublishTo {
    Control,
    Ack,
}

/// 0..=10 tenths of `total` covered by `written`.
fn progress_step(written: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    (u64::from(written) * 10 / u64::from(total)) as u8
}

/// Topic set for this device: `explicit_id` when given, otherwise the
/// identity port's id.
pub fn resolve_topics(
    config: &FuotaConfig,
    explicit_id: Option<&str>,
    identity: &impl DeviceIdentity,
) -> Result<TopicSet> {
    match explicit_id {
        Some(id) => TopicSet::new(&config.topic_root, id),
        None => TopicSet::new(&config.topic_root, identity.device_id().as_str()),
    }
}
