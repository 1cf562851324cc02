//! MQTT FUOTA firmware — main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspMqttAdapter   EspOtaWriter      LogEventSink   MacIdentity │
//! │  (MqttPort)       (ImageWriterPort) (EventSink)    (Identity)  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │           FuotaSession (pure protocol logic)           │    │
//! │  │  state machine · codec · version compare · supervisor  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Build-time environment: `WIFI_SSID`, `WIFI_PASS`, `MQTT_BROKER_URL`
//! and optionally `FUOTA_CONFIG_JSON` (a [`FuotaConfig`] document).
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::{Result, anyhow};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use mqtt_fuota::adapters::device_id::MacIdentity;
use mqtt_fuota::adapters::image_writer::{EspOtaWriter, mark_running_image_valid};
use mqtt_fuota::adapters::log_sink::LogEventSink;
use mqtt_fuota::adapters::mqtt::EspMqttAdapter;
use mqtt_fuota::adapters::time::MonotonicClock;
use mqtt_fuota::app::ports::DeviceIdentity;
use mqtt_fuota::app::session::{FuotaSession, resolve_topics};
use mqtt_fuota::config::FuotaConfig;
use mqtt_fuota::protocol::version::{FirmwareInfo, FirmwareVersion};

const WIFI_SSID: &str = match option_env!("WIFI_SSID") {
    Some(s) => s,
    None => "",
};
const WIFI_PASS: &str = match option_env!("WIFI_PASS") {
    Some(s) => s,
    None => "",
};
const MQTT_BROKER_URL: &str = match option_env!("MQTT_BROKER_URL") {
    Some(s) => s,
    None => "mqtt://broker.hivemq.com:1883",
};

/// Main loop period.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn load_config() -> FuotaConfig {
    let Some(json) = option_env!("FUOTA_CONFIG_JSON") else {
        return FuotaConfig::default();
    };
    match FuotaConfig::from_json(json.as_bytes()) {
        Ok(cfg) => {
            info!("FUOTA config loaded from build environment");
            cfg
        }
        Err(e) => {
            warn!("FUOTA config invalid ({}), using defaults", e);
            FuotaConfig::default()
        }
    }
}

fn connect_wifi(wifi: &mut BlockingWifi<EspWifi<'static>>) -> Result<()> {
    let auth_method = if WIFI_PASS.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID
            .try_into()
            .map_err(|_| anyhow!("SSID longer than 32 bytes"))?,
        password: WIFI_PASS
            .try_into()
            .map_err(|_| anyhow!("password longer than 64 bytes"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("WiFi: connecting to '{}'", WIFI_SSID);
    wifi.connect()?;
    wifi.wait_netif_up()?;
    info!("WiFi: connected");
    Ok(())
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    let running = FirmwareVersion::parse(env!("CARGO_PKG_VERSION"))
        .ok_or_else(|| anyhow!("package version is not major.minor.patch"))?;
    info!("MQTT FUOTA v{}", running);

    // Reaching main means the image boots; cancel rollback.
    mark_running_image_valid();

    // ── 2. Network ────────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?,
        sysloop,
    )?;
    connect_wifi(&mut wifi)?;

    // ── 3. Adapters ───────────────────────────────────────────
    let config = load_config();
    let identity = MacIdentity::new();
    let client_id = identity.device_id();
    let topics = resolve_topics(&config, None, &identity)?;
    info!("Device ID: {}", client_id);

    let mqtt = EspMqttAdapter::start(MQTT_BROKER_URL, client_id.as_str())?;
    let writer = EspOtaWriter::new();
    let clock = MonotonicClock::new();
    let mut log_sink = LogEventSink::new();

    // ── 4. Session ────────────────────────────────────────────
    let mut session = FuotaSession::new(
        config,
        FirmwareInfo::running(running),
        topics,
        mqtt,
        writer,
    )?;

    info!("System ready. Entering event loop.");

    // ── 5. Event loop ─────────────────────────────────────────
    loop {
        while let Some(msg) = session.mqtt().next_message() {
            if let Err(e) = session.on_message(&msg.topic, &msg.payload, &mut log_sink) {
                warn!("FUOTA: message on {} dropped: {}", msg.topic, e);
            }
        }

        session.process(clock.uptime_ms(), &mut log_sink);

        if !wifi.is_connected().unwrap_or(false) {
            warn!("WiFi: connection lost, reconnecting");
            if let Err(e) = wifi.connect() {
                warn!("WiFi: reconnect failed: {}", e);
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}
