//! MQTT topic set bound to one device identifier.
//!
//! | Direction | Topic                 | Carries                          |
//! |-----------|-----------------------|----------------------------------|
//! | inbound   | `<root><ID>/ota/setup`   | trigger / offer / start frames |
//! | inbound   | `<root><ID>/ota/data`    | image data blocks              |
//! | outbound  | `<root><ID>/ota/control` | check / request / result tags  |
//! | outbound  | `<root><ID>/ota/ack`     | start ack, block acks          |

use core::fmt::Write;

use crate::error::{Error, Result};

/// Maximum device identifier length.
pub const DEVICE_ID_CAPACITY: usize = 32;

/// Maximum length of a full topic string.
pub const TOPIC_CAPACITY: usize = 96;

/// Longest topic suffix (`/ota/control`).
const LONGEST_SUFFIX: usize = 12;

pub type DeviceId = heapless::String<DEVICE_ID_CAPACITY>;
pub type Topic = heapless::String<TOPIC_CAPACITY>;

/// Which inbound channel a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic {
    Setup,
    Data,
}

/// The four topics of one device. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    setup: Topic,
    data: Topic,
    control: Topic,
    ack: Topic,
}

impl TopicSet {
    /// Build the topic set for `device_id` under `root` (usually empty).
    pub fn new(root: &str, device_id: &str) -> Result<Self> {
        if device_id.is_empty() {
            return Err(Error::Config("device id must not be empty"));
        }
        if root.len() + device_id.len() + LONGEST_SUFFIX > TOPIC_CAPACITY {
            return Err(Error::Config("topic root + device id too long"));
        }
        Ok(Self {
            setup: format_topic(root, device_id, "setup")?,
            data: format_topic(root, device_id, "data")?,
            control: format_topic(root, device_id, "control")?,
            ack: format_topic(root, device_id, "ack")?,
        })
    }

    pub fn setup(&self) -> &str {
        &self.setup
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn control(&self) -> &str {
        &self.control
    }

    pub fn ack(&self) -> &str {
        &self.ack
    }

    /// Map an inbound topic string to its channel.
    pub fn classify(&self, topic: &str) -> Option<InboundTopic> {
        if topic == self.setup.as_str() {
            Some(InboundTopic::Setup)
        } else if topic == self.data.as_str() {
            Some(InboundTopic::Data)
        } else {
            None
        }
    }
}

fn format_topic(root: &str, device_id: &str, leaf: &str) -> Result<Topic> {
    let mut t = Topic::new();
    write!(t, "{root}{device_id}/ota/{leaf}")
        .map_err(|_| Error::Config("topic exceeds capacity"))?;
    Ok(t)
}

/// Check that a root prefix leaves room for a full-length device id.
pub fn root_fits(root: &str) -> bool {
    root.len() + DEVICE_ID_CAPACITY + LONGEST_SUFFIX <= TOPIC_CAPACITY
}
