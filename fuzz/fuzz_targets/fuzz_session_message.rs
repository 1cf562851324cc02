//! Fuzz target: `FuotaSession::on_message`
//!
//! Splits the input into a sequence of setup/data messages (first byte of
//! each record picks the topic and length) and drives them through a
//! session backed by the host adapters. Checks that the clamping bound
//! holds for every active episode and that the session never panics.
//!
//! cargo fuzz run fuzz_session_message

#![no_main]

use libfuzzer_sys::fuzz_target;
use mqtt_fuota::adapters::image_writer::RamImageWriter;
use mqtt_fuota::adapters::mqtt::LoopbackMqtt;
use mqtt_fuota::app::ports::NullSink;
use mqtt_fuota::app::session::{FuotaSession, SessionState};
use mqtt_fuota::config::FuotaConfig;
use mqtt_fuota::protocol::topics::TopicSet;
use mqtt_fuota::protocol::version::{FirmwareInfo, FirmwareVersion};

fuzz_target!(|data: &[u8]| {
    let Ok(topics) = TopicSet::new("", "fuzz") else {
        return;
    };
    let Ok(mut session) = FuotaSession::new(
        FuotaConfig::default(),
        FirmwareInfo::running(FirmwareVersion::new(1, 0, 0)),
        topics,
        LoopbackMqtt::new(),
        RamImageWriter::new(64 * 1024),
    ) else {
        return;
    };

    let mut rest = data;
    let mut now = 0u64;
    while let Some((&head, tail)) = rest.split_first() {
        let len = usize::from(head & 0x7F).min(tail.len());
        let (payload, next) = tail.split_at(len);
        let topic = if head & 0x80 == 0 {
            "fuzz/ota/setup"
        } else {
            "fuzz/ota/data"
        };
        let _ = session.on_message(topic, payload, &mut NullSink);
        now += 100;
        session.process(now, &mut NullSink);

        if matches!(
            session.state(),
            SessionState::Transferring | SessionState::Completing
        ) {
            assert!(session.bytes_written() <= session.offered().size);
        }
        rest = next;
    }
});
