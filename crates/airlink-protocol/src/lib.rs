//! Protocol state machines for the airlink transport.
//!
//! This crate implements the stateful protocol logic: block segmentation and
//! the reliable transmit/receive machines, the parameter registry, the file
//! access protocol, and the pairing handshake. Everything here is pure — no
//! I/O, no tasks; machines produce packets and actions for the caller to
//! enact, and time enters as explicit [`std::time::Instant`] parameters.

pub mod error;
pub mod files;
pub mod pairing;
pub mod param;
pub mod rdt;
