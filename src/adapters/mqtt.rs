//! MQTT transport adapters.
//!
//! Implements [`MqttPort`], the hexagonal boundary for the pub/sub
//! broker connection.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`EspMqttAdapter`] wraps the ESP-IDF MQTT
//!   client. Its event callback runs on the client task and hands each
//!   received message to the static [`INBOX`](super::inbox::INBOX)
//!   channel. The main loop drains it, which keeps the session
//!   single-threaded. A full inbox blocks the callback; nothing is dropped.
//! - **all other targets**: [`LoopbackMqtt`] records every subscription
//!   and publish for host-side tests and simulation.

#[cfg(not(target_os = "espidf"))]
use log::debug;

use crate::app::ports::MqttPort;
use crate::config::QoS;
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// Host backend
// ───────────────────────────────────────────────────────────────

/// Something the device sent to the broker.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// In-process broker stand-in.
#[cfg(not(target_os = "espidf"))]
pub struct LoopbackMqtt {
    connected: bool,
    fail_subscribe: bool,
    fail_publish: bool,
    subscriptions: Vec<(String, QoS)>,
    published: Vec<Published>,
}

#[cfg(not(target_os = "espidf"))]
impl LoopbackMqtt {
    /// A connected loopback with no failures injected.
    pub fn new() -> Self {
        Self {
            connected: true,
            fail_subscribe: false,
            fail_publish: false,
            subscriptions: Vec::new(),
            published: Vec::new(),
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn set_fail_subscribe(&mut self, fail: bool) {
        self.fail_subscribe = fail;
    }

    pub fn set_fail_publish(&mut self, fail: bool) {
        self.fail_publish = fail;
    }

    pub fn subscriptions(&self) -> &[(String, QoS)] {
        &self.subscriptions
    }

    pub fn published(&self) -> &[Published] {
        &self.published
    }

    /// Payloads published on `topic`, oldest first.
    pub fn published_on(&self, topic: &str) -> Vec<&[u8]> {
        self.published
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.as_slice())
            .collect()
    }

    pub fn clear_published(&mut self) {
        self.published.clear();
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for LoopbackMqtt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl MqttPort for LoopbackMqtt {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_subscribe {
            return Err(TransportError::SubscribeFailed);
        }
        self.subscriptions.push((topic.to_string(), qos));
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_publish {
            return Err(TransportError::PublishFailed);
        }
        debug!("loopback publish {} ({} bytes)", topic, payload.len());
        self.published.push(Published {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use esp_idf_svc::mqtt::client::{
        Details, EspMqttClient, EventPayload, MqttClientConfiguration, QoS as EspQoS,
    };
    use log::{info, warn};

    use crate::adapters::inbox::{self, INBOX, InboundMessage, MAX_PAYLOAD};
    use crate::app::ports::MqttPort;
    use crate::config::QoS;
    use crate::error::TransportError;

    /// Large enough for a 1 KiB data block plus headers in one event.
    const CLIENT_BUFFER_SIZE: usize = MAX_PAYLOAD;

    /// Back-off while the main loop drains a full inbox.
    const INBOX_RETRY: Duration = Duration::from_millis(5);

    pub struct EspMqttAdapter {
        client: EspMqttClient<'static>,
        connected: Arc<AtomicBool>,
    }

    impl EspMqttAdapter {
        /// Start the client; connection proceeds in the background.
        pub fn start(broker_url: &str, client_id: &str) -> anyhow::Result<Self> {
            let connected = Arc::new(AtomicBool::new(false));

            let conf = MqttClientConfiguration {
                client_id: Some(client_id),
                buffer_size: CLIENT_BUFFER_SIZE,
                ..Default::default()
            };

            let cb_connected = connected.clone();
            let client = EspMqttClient::new_cb(broker_url, &conf, move |event| {
                match event.payload() {
                    EventPayload::Connected(_) => {
                        info!("MQTT connected");
                        cb_connected.store(true, Ordering::Release);
                    }
                    EventPayload::Disconnected => {
                        warn!("MQTT disconnected");
                        cb_connected.store(false, Ordering::Release);
                    }
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details: Details::Complete,
                        ..
                    } => {
                        let Some(msg) = InboundMessage::new(topic, data) else {
                            warn!("MQTT message on {} exceeds inbox limits", topic);
                            return;
                        };
                        inbox::deliver(&INBOX, msg, || std::thread::sleep(INBOX_RETRY));
                    }
                    EventPayload::Received { .. } => {
                        warn!("MQTT fragmented message dropped (raise buffer_size)");
                    }
                    _ => {}
                }
            })?;

            Ok(Self { client, connected })
        }

        /// Take the oldest queued inbound message.
        pub fn next_message(&self) -> Option<InboundMessage> {
            inbox::next(&INBOX)
        }
    }

    fn esp_qos(qos: QoS) -> EspQoS {
        match qos {
            QoS::AtMostOnce => EspQoS::AtMostOnce,
            QoS::AtLeastOnce => EspQoS::AtLeastOnce,
            QoS::ExactlyOnce => EspQoS::ExactlyOnce,
        }
    }

    impl MqttPort for EspMqttAdapter {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Acquire)
        }

        fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
            self.client
                .subscribe(topic, esp_qos(qos))
                .map(|_| ())
                .map_err(|e| {
                    warn!("esp-mqtt subscribe failed: {:?}", e);
                    TransportError::SubscribeFailed
                })
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
            self.client
                .publish(topic, EspQoS::AtLeastOnce, false, payload)
                .map(|_| ())
                .map_err(|e| {
                    warn!("esp-mqtt publish failed: {:?}", e);
                    TransportError::PublishFailed
                })
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspMqttAdapter;
