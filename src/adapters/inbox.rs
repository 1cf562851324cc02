//! Inbound message channel between the MQTT client task and the main loop.
//!
//! Uses an `embassy-sync` bounded channel so the client's event callback
//! and the synchronous polling loop share a static queue without heap
//! allocation.
//!
//! ```text
//! ┌──────────────┐ InboundMessage ┌──────────────┐
//! │ MQTT client  │───────────────▶│  Main loop   │
//! │ task (cb)    │   INBOX (16)   │  (session)   │
//! └──────────────┘                └──────────────┘
//! ```
//!
//! A received message is never discarded once it fits: when the channel
//! is full, [`deliver`] waits until the main loop makes room. The client
//! task stalls meanwhile, which throttles the broker through TCP.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use heapless::Vec;
use log::warn;

use crate::protocol::topics::Topic;

/// Channel depth.
pub const INBOX_DEPTH: usize = 16;

/// Largest payload carried; matches the MQTT client buffer.
pub const MAX_PAYLOAD: usize = 2048;

/// A message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: Topic,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

impl InboundMessage {
    /// `None` when the topic or payload exceeds its capacity.
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        let mut t = Topic::new();
        t.push_str(topic).ok()?;
        Some(Self {
            topic: t,
            payload: Vec::from_slice(payload).ok()?,
        })
    }
}

pub type Inbox = Channel<CriticalSectionRawMutex, InboundMessage, INBOX_DEPTH>;

/// Inbound channel: MQTT client task → main loop.
pub static INBOX: Inbox = Channel::new();

/// Queue `msg`, calling `wait` between attempts while the channel is full.
/// Returns the number of waits.
pub fn deliver(inbox: &Inbox, msg: InboundMessage, mut wait: impl FnMut()) -> u32 {
    let mut pending = msg;
    let mut waits = 0u32;
    loop {
        match inbox.try_send(pending) {
            Ok(()) => return waits,
            Err(TrySendError::Full(m)) => {
                if waits == 0 {
                    warn!("Inbox full, holding {} until drained", m.topic);
                }
                pending = m;
                waits += 1;
                wait();
            }
        }
    }
}

/// Take the oldest queued message.
pub fn next(inbox: &Inbox) -> Option<InboundMessage> {
    inbox.try_receive().ok()
}
