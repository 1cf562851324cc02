//! MQTT FUOTA client library.
//!
//! Exposes the protocol core and the host-side adapters for integration
//! testing and simulation. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

// Links the std critical-section implementation used by the inbox channel.
#[cfg(not(target_os = "espidf"))]
use critical_section as _;

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod protocol;

pub use app::session::{FuotaSession, SessionState};
pub use config::FuotaConfig;
pub use error::{Error, Result};
