//! Application core: the FUOTA protocol logic, zero I/O.
//!
//! [`session::FuotaSession`] runs the update state machine and
//! [`supervisor::SubscriptionSupervisor`] keeps its inbound topics
//! subscribed. All interaction with the broker and flash happens through
//! the **port traits** defined in [`ports`], keeping this layer fully
//! testable on the host.

pub mod events;
pub mod ports;
pub mod session;
pub mod supervisor;
