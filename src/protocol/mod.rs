//! Wire-level protocol: frames, versions, topics.
//!
//! ```text
//!  Server                                              Device
//!    │ trigger check            ─── setup ──▶            │
//!    │                          ◀── control ─  CHECK     │
//!    │ last firmware info       ─── setup ──▶            │
//!    │                          ◀── control ─  REQUEST   │
//!    │ FUOTA start              ─── setup ──▶            │
//!    │                          ◀── ack ─────  AAAAAAAA  │
//!    │ data block 0..N          ─── data ───▶            │
//!    │                          ◀── control ─  OK / FAIL │
//! ```
//!
//! Everything here is pure: no I/O, no state.

pub mod codec;
pub mod topics;
pub mod version;
