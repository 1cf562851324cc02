//! End-to-end flows through the FUOTA session.
//!
//! A loopback broker stands in for MQTT and a recording writer for the
//! OTA partition; every test drives the session only through its two
//! entry points, `on_message` and `process`.

use mqtt_fuota::app::events::{FailureReason, FuotaEvent, RejectReason};
use mqtt_fuota::app::ports::NullSink;
use mqtt_fuota::app::session::SessionState;
use mqtt_fuota::config::{DataFraming, FuotaConfig};
use mqtt_fuota::error::{Error, FrameError, StorageError};
use mqtt_fuota::protocol::codec::{ACK_FUOTA_START, ControlFrame};
use mqtt_fuota::protocol::version::{FirmwareVersion, IntegrityHash};

use crate::mocks::{
    ACK, DATA, EventLog, SETUP, TestSession, WriterCall, controls, make_session,
    make_session_with, offer,
};

const V1_0_0: FirmwareVersion = FirmwareVersion::new(1, 0, 0);
const V1_2_0: FirmwareVersion = FirmwareVersion::new(1, 2, 0);

/// check → offer 1.2.0 → start, leaving the session in `Transferring`.
fn into_transfer(session: &mut TestSession, size: u32, sink: &mut EventLog) {
    session.request_update_check(sink).unwrap();
    session.on_message(SETUP, &offer(V1_2_0, size), sink).unwrap();
    session.on_message(SETUP, &[0x02], sink).unwrap();
    assert_eq!(session.state(), SessionState::Transferring);
}

fn feed(session: &mut TestSession, total: usize, chunks: &[usize], sink: &mut EventLog) {
    let image: Vec<u8> = (0..total).map(|i| i as u8).collect();
    let mut offset = 0;
    let mut sizes = chunks.iter().cycle();
    while offset < total {
        let n = (*sizes.next().unwrap()).min(total - offset);
        session.on_message(DATA, &image[offset..offset + n], sink).unwrap();
        offset += n;
    }
}

// ── Scenario 1: happy path ────────────────────────────────────

#[test]
fn newer_offer_is_downloaded_committed_and_restarted() {
    let mut session = make_session();
    let mut sink = EventLog::new();

    session.request_update_check(&mut sink).unwrap();
    assert_eq!(session.state(), SessionState::CheckRequested);
    assert_eq!(controls(&session), vec![ControlFrame::Check]);

    session.on_message(SETUP, &offer(V1_2_0, 1000), &mut sink).unwrap();
    assert_eq!(session.state(), SessionState::UpdateRequested);
    assert_eq!(
        controls(&session),
        vec![ControlFrame::Check, ControlFrame::RequestUpdate]
    );

    session.on_message(SETUP, &[0x02], &mut sink).unwrap();
    assert_eq!(session.state(), SessionState::Transferring);
    assert_eq!(session.mqtt().published_on(ACK), vec![&ACK_FUOTA_START[..]]);
    assert_eq!(session.writer().calls[0], WriterCall::Begin(1000));
    assert_eq!(
        session.writer().calls[1],
        WriterCall::SetExpectedHash(IntegrityHash::from_digest(&[0x11; 16]))
    );

    feed(&mut session, 1000, &[1, 250, 7, 333, 64], &mut sink);
    assert_eq!(session.bytes_written(), 1000);
    assert_eq!(session.state(), SessionState::Completing);
    assert_eq!(session.writer().image.len(), 1000);

    session.process(0, &mut sink);
    assert_eq!(
        controls(&session).last(),
        Some(&ControlFrame::CompletedOk)
    );
    assert_eq!(session.writer().finalizes(), 1);
    assert_eq!(session.writer().restarts(), 1);
    assert_eq!(session.writer().aborts(), 0);
    assert!(sink.contains(&FuotaEvent::UpdateCompleted));
    assert!(sink.contains(&FuotaEvent::TransferStarted { size: 1000 }));
}

#[test]
fn progress_is_reported_in_tenths() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    into_transfer(&mut session, 1000, &mut sink);

    feed(&mut session, 1000, &[50], &mut sink);
    let steps: Vec<u32> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            FuotaEvent::Progress { written, .. } => Some(*written),
            _ => None,
        })
        .collect();
    assert_eq!(
        steps,
        vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000]
    );
}

// ── Scenario 2: finalize fails ────────────────────────────────

#[test]
fn finalize_failure_reports_fail_and_aborts() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    into_transfer(&mut session, 1000, &mut sink);
    session.writer_mut().fail_finalize = Some(StorageError::HashMismatch);

    feed(&mut session, 1000, &[128], &mut sink);
    session.process(0, &mut sink);

    assert_eq!(controls(&session).last(), Some(&ControlFrame::CompletedFail));
    assert_eq!(session.writer().aborts(), 1);
    assert_eq!(session.writer().restarts(), 0);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(sink.contains(&FuotaEvent::UpdateFailed(FailureReason::Finalize)));
}

#[test]
fn outstanding_bytes_at_finalize_fail_the_episode() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    into_transfer(&mut session, 100, &mut sink);
    session.writer_mut().force_remaining = Some(4);

    feed(&mut session, 100, &[100], &mut sink);
    session.process(0, &mut sink);

    assert_eq!(session.writer().finalizes(), 0);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(sink.contains(&FuotaEvent::UpdateFailed(
        FailureReason::IncompleteImage { remaining: 4 }
    )));
}

#[test]
fn storage_write_error_aborts_on_next_tick() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    into_transfer(&mut session, 1000, &mut sink);
    session.writer_mut().short_write_limit = Some(10);

    session.on_message(DATA, &[0u8; 64], &mut sink).unwrap();
    assert_eq!(session.bytes_written(), 10);
    assert_eq!(session.state(), SessionState::Transferring);

    session.process(0, &mut sink);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.writer().aborts(), 1);
    assert_eq!(controls(&session).last(), Some(&ControlFrame::CompletedFail));
    assert!(sink.contains(&FuotaEvent::UpdateFailed(FailureReason::StorageWrite)));
}

// ── Scenario 3: not newer ─────────────────────────────────────

#[test]
fn equal_version_offer_is_silently_rejected() {
    let mut session = make_session();
    let mut sink = EventLog::new();

    session.on_message(SETUP, &offer(V1_0_0, 1000), &mut sink).unwrap();

    assert!(session.mqtt().published().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.offered().version, V1_0_0);
    assert!(sink.contains(&FuotaEvent::OfferRejected(RejectReason::NotNewer)));
}

#[test]
fn older_offer_after_check_returns_to_idle() {
    let mut session = make_session_with(FuotaConfig::default(), FirmwareVersion::new(2, 0, 0));
    let mut sink = EventLog::new();

    session.request_update_check(&mut sink).unwrap();
    session.on_message(SETUP, &offer(V1_2_0, 1000), &mut sink).unwrap();

    assert_eq!(controls(&session), vec![ControlFrame::Check]);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(
        sink.states(),
        vec![SessionState::CheckRequested, SessionState::Idle]
    );
}

#[test]
fn wildcard_offer_is_always_requested() {
    let mut session = make_session_with(FuotaConfig::default(), FirmwareVersion::new(9, 9, 9));
    let mut sink = EventLog::new();

    session
        .on_message(SETUP, &offer(FirmwareVersion::WILDCARD, 10), &mut sink)
        .unwrap();

    assert_eq!(controls(&session), vec![ControlFrame::RequestUpdate]);
    assert_eq!(session.state(), SessionState::UpdateRequested);
}

#[test]
fn oversized_offer_is_rejected() {
    let mut config = FuotaConfig::default();
    config.max_image_size = 512;
    let mut session = make_session_with(config, V1_0_0);
    let mut sink = EventLog::new();

    session.on_message(SETUP, &offer(V1_2_0, 513), &mut sink).unwrap();
    assert!(controls(&session).is_empty());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(sink.contains(&FuotaEvent::OfferRejected(RejectReason::InvalidSize)));

    session.on_message(SETUP, &offer(V1_2_0, 0), &mut sink).unwrap();
    assert!(controls(&session).is_empty());
}

// ── Scenario 4: malformed frames ──────────────────────────────

#[test]
fn short_firmware_info_leaves_offer_untouched() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    session.request_update_check(&mut sink).unwrap();
    sink.events.clear();

    let mut frame = [0u8; 10];
    frame[0] = 0x01;
    let result = session.on_message(SETUP, &frame, &mut sink);

    assert_eq!(
        result,
        Err(Error::Frame(FrameError::BadLength {
            command: 0x01,
            expected: 24,
            actual: 10
        }))
    );
    assert!(!session.offered().is_offer_present());
    assert_eq!(session.state(), SessionState::CheckRequested);
    assert!(sink.events.is_empty());
}

#[test]
fn unknown_command_and_padded_frames_are_dropped() {
    let mut session = make_session();
    assert_eq!(
        session.on_message(SETUP, &[0x07], &mut NullSink),
        Err(Error::Frame(FrameError::UnknownCommand(0x07)))
    );
    assert!(session.on_message(SETUP, &[0x02, 0x00], &mut NullSink).is_err());
    assert!(session.on_message(SETUP, &[], &mut NullSink).is_err());
    assert!(session.mqtt().published().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
}

// ── Start / data edge cases ───────────────────────────────────

#[test]
fn begin_failure_sends_no_ack_and_allows_retry() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    session.on_message(SETUP, &offer(V1_2_0, 1000), &mut sink).unwrap();
    session.writer_mut().fail_begin = Some(StorageError::InsufficientSpace);

    assert_eq!(
        session.on_message(SETUP, &[0x02], &mut sink),
        Err(Error::Storage(StorageError::InsufficientSpace))
    );
    assert!(session.mqtt().published_on(ACK).is_empty());
    assert_eq!(session.state(), SessionState::Idle);

    session.writer_mut().fail_begin = None;
    session.on_message(SETUP, &[0x02], &mut sink).unwrap();
    assert_eq!(session.state(), SessionState::Transferring);
    assert_eq!(session.mqtt().published_on(ACK).len(), 1);
}

#[test]
fn restart_mid_transfer_aborts_and_resets_progress() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    into_transfer(&mut session, 1000, &mut sink);
    session.on_message(DATA, &[0u8; 300], &mut sink).unwrap();
    assert_eq!(session.bytes_written(), 300);

    session.on_message(SETUP, &[0x02], &mut sink).unwrap();
    assert_eq!(session.writer().aborts(), 1);
    assert_eq!(session.writer().begins(), 2);
    assert_eq!(session.bytes_written(), 0);
    assert_eq!(session.state(), SessionState::Transferring);
}

#[test]
fn final_block_overshoot_is_clamped() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    into_transfer(&mut session, 100, &mut sink);

    session.on_message(DATA, &[1u8; 90], &mut sink).unwrap();
    session.on_message(DATA, &[2u8; 50], &mut sink).unwrap();

    assert_eq!(session.bytes_written(), 100);
    assert_eq!(session.writer().calls.last(), Some(&WriterCall::Write(10)));
    assert_eq!(session.state(), SessionState::Completing);

    // Trailing data after completion never reaches storage.
    let writes = session.writer().writes();
    session.on_message(DATA, &[3u8; 5], &mut sink).unwrap();
    assert_eq!(session.writer().writes(), writes);
}

#[test]
fn data_outside_transfer_is_ignored() {
    let mut session = make_session();
    session.on_message(DATA, &[0u8; 32], &mut NullSink).unwrap();
    session.on_message(SETUP, &offer(V1_2_0, 100), &mut NullSink).unwrap();
    session.on_message(DATA, &[0u8; 32], &mut NullSink).unwrap();

    assert_eq!(session.bytes_written(), 0);
    assert!(session.writer().calls.is_empty());
}

#[test]
fn check_is_ignored_during_transfer() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    into_transfer(&mut session, 100, &mut sink);

    session.on_message(SETUP, &[0x00], &mut sink).unwrap();
    assert_eq!(session.state(), SessionState::Transferring);
    assert_eq!(session.offered().size, 100);
}

#[test]
fn check_from_update_requested_clears_offer() {
    let mut session = make_session();
    session.on_message(SETUP, &offer(V1_2_0, 100), &mut NullSink).unwrap();
    assert_eq!(session.state(), SessionState::UpdateRequested);

    session.on_message(SETUP, &[0x00], &mut NullSink).unwrap();
    assert_eq!(session.state(), SessionState::CheckRequested);
    assert!(!session.offered().is_offer_present());
}

// ── Indexed framing ───────────────────────────────────────────

#[test]
fn indexed_transfer_acks_every_block() {
    let mut config = FuotaConfig::default();
    config.data_framing = DataFraming::Indexed;
    let mut session = make_session_with(config, V1_0_0);
    let mut sink = EventLog::new();
    into_transfer(&mut session, 8, &mut sink);

    session.on_message(DATA, &[0, 0, 0, 0, 1, 2, 3, 4], &mut sink).unwrap();
    session.on_message(DATA, &[0, 0, 0, 1, 5, 6, 7, 8], &mut sink).unwrap();

    assert_eq!(
        session.mqtt().published_on(ACK),
        vec![&ACK_FUOTA_START[..], &[0, 0, 0, 0][..], &[0, 0, 0, 1][..]]
    );
    assert_eq!(session.writer().image, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(session.state(), SessionState::Completing);
}

#[test]
fn indexed_frame_without_index_is_malformed() {
    let mut config = FuotaConfig::default();
    config.data_framing = DataFraming::Indexed;
    let mut session = make_session_with(config, V1_0_0);
    let mut sink = EventLog::new();
    into_transfer(&mut session, 8, &mut sink);

    assert_eq!(
        session.on_message(DATA, &[0, 0, 1], &mut sink),
        Err(Error::Frame(FrameError::MissingBlockIndex))
    );
    assert_eq!(session.bytes_written(), 0);
}

// ── Timeout and connectivity ──────────────────────────────────

#[test]
fn stalled_transfer_times_out() {
    let mut config = FuotaConfig::default();
    config.transfer_timeout_ms = Some(5_000);
    let mut session = make_session_with(config, V1_0_0);
    let mut sink = EventLog::new();
    into_transfer(&mut session, 100, &mut sink);

    session.process(1_000, &mut sink);
    session.process(5_999, &mut sink);
    assert_eq!(session.state(), SessionState::Transferring);
    session.process(6_000, &mut sink);

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.writer().aborts(), 1);
    assert!(sink.contains(&FuotaEvent::UpdateFailed(FailureReason::Stalled)));
}

#[test]
fn disconnected_session_is_dormant() {
    let mut session = make_session();
    let mut sink = EventLog::new();
    session.mqtt_mut().set_connected(false);

    session.on_message(SETUP, &offer(V1_2_0, 100), &mut sink).unwrap();
    session.on_message(SETUP, &[0x02], &mut sink).unwrap();
    session.process(0, &mut sink);

    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.offered().is_offer_present());
    assert!(session.writer().calls.is_empty());
    assert!(sink.events.is_empty());
}

#[test]
fn stall_window_restarts_after_reconnect() {
    let mut config = FuotaConfig::default();
    config.transfer_timeout_ms = Some(60_000);
    let mut session = make_session_with(config, V1_0_0);
    let mut sink = EventLog::new();
    into_transfer(&mut session, 100, &mut sink);
    session.process(0, &mut sink);

    // Offline for longer than the timeout.
    session.mqtt_mut().set_connected(false);
    session.process(61_000, &mut sink);
    session.mqtt_mut().set_connected(true);
    session.process(61_001, &mut sink);

    assert_eq!(session.state(), SessionState::Transferring);
    assert_eq!(session.writer().aborts(), 0);
    assert!(!sink.contains(&FuotaEvent::UpdateFailed(FailureReason::Stalled)));

    // The window now runs from the reconnect tick.
    session.process(121_000, &mut sink);
    assert_eq!(session.state(), SessionState::Transferring);
    session.process(121_001, &mut sink);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(sink.contains(&FuotaEvent::UpdateFailed(FailureReason::Stalled)));
}

#[test]
fn resubscribes_after_reconnect() {
    let mut session = make_session();
    session.process(0, &mut NullSink);
    assert!(session.supervisor().is_fully_subscribed());
    assert_eq!(session.mqtt().subscriptions().len(), 2);

    session.mqtt_mut().set_connected(false);
    session.process(1_000, &mut NullSink);
    assert!(!session.supervisor().is_fully_subscribed());

    session.mqtt_mut().set_connected(true);
    session.process(10_000, &mut NullSink);
    assert!(session.supervisor().is_fully_subscribed());
    assert_eq!(session.mqtt().subscriptions().len(), 4);
}

#[test]
fn publish_failure_does_not_block_progress() {
    let mut session = make_session();
    session.mqtt_mut().set_fail_publish(true);

    session.request_update_check(&mut NullSink).unwrap();
    session.on_message(SETUP, &offer(V1_2_0, 100), &mut NullSink).unwrap();

    assert_eq!(session.state(), SessionState::UpdateRequested);
    assert!(session.mqtt().published().is_empty());
}
