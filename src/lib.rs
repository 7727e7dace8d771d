//! Delivery of arbitrarily long messages over a low-energy wireless link that only transports
//!  small frames, and that drops, reconnects and fails writes as a matter of course.
//!
//! Messages are split into tagged chunks ([chunk]), written one chunk at a time with bounded
//!  retries ([sender]), and reassembled on the receiving side. The connection itself is run by a
//!  state machine on a single coordinating task ([lifecycle]) that reconnects after transient
//!  failures and never leaks a platform link handle.
//!
//! The platform's radio APIs are abstracted by [platform::PlatformDriver]; applications interact
//!  with a [ble_session::BleSession].

pub mod ble_session;
pub mod chunk;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod scan_coordinator;
pub mod sender;
pub mod test_util;
