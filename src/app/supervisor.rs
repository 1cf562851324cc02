//! Subscription supervisor.
//!
//! Keeps the two inbound topics (setup, data) subscribed. Each topic has
//! its own flag, so a failure on one never blocks the other. Attempts are
//! spaced by a fixed retry interval and are only made while the broker is
//! connected.

use log::{debug, info, warn};

use crate::config::{FuotaConfig, QoS};
use crate::protocol::topics::TopicSet;

use super::ports::MqttPort;

pub struct SubscriptionSupervisor {
    retry_interval_ms: u64,
    qos: QoS,
    setup_subscribed: bool,
    data_subscribed: bool,
    /// `None` until the first attempt, which is made immediately.
    last_attempt_ms: Option<u64>,
}

impl SubscriptionSupervisor {
    pub fn new(config: &FuotaConfig) -> Self {
        Self {
            retry_interval_ms: config.subscribe_retry_interval_ms,
            qos: config.subscribe_qos,
            setup_subscribed: false,
            data_subscribed: false,
            last_attempt_ms: None,
        }
    }

    /// One supervision step. Returns `true` when an attempt was made.
    pub fn poll(&mut self, now_ms: u64, mqtt: &mut impl MqttPort, topics: &TopicSet) -> bool {
        if self.is_fully_subscribed() {
            return false;
        }
        if let Some(last) = self.last_attempt_ms {
            if now_ms.saturating_sub(last) < self.retry_interval_ms {
                return false;
            }
        }
        if !mqtt.is_connected() {
            return false;
        }

        if !self.setup_subscribed {
            self.setup_subscribed = Self::try_subscribe(mqtt, topics.setup(), self.qos);
        }
        if !self.data_subscribed {
            self.data_subscribed = Self::try_subscribe(mqtt, topics.data(), self.qos);
        }
        self.last_attempt_ms = Some(now_ms);
        true
    }

    /// Forget both subscriptions (broker session lost).
    pub fn reset(&mut self) {
        if self.setup_subscribed || self.data_subscribed {
            debug!("Subscriptions invalidated");
        }
        self.setup_subscribed = false;
        self.data_subscribed = false;
    }

    pub fn is_fully_subscribed(&self) -> bool {
        self.setup_subscribed && self.data_subscribed
    }

    pub fn setup_subscribed(&self) -> bool {
        self.setup_subscribed
    }

    pub fn data_subscribed(&self) -> bool {
        self.data_subscribed
    }

    fn try_subscribe(mqtt: &mut impl MqttPort, topic: &str, qos: QoS) -> bool {
        match mqtt.subscribe(topic, qos) {
            Ok(()) => {
                info!("Subscribed to {}", topic);
                true
            }
            Err(e) => {
                warn!("Subscribe to {} failed: {}", topic, e);
                false
            }
        }
    }
}
