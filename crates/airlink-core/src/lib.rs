//! Wire format and shared types for the airlink transport.
//!
//! This crate defines the fixed-size RDT packet that travels on the link,
//! its CRC-32 protection, and the peer address type shared by every layer
//! above. It performs no I/O and spawns no tasks.

pub mod constants;
pub mod error;
pub mod packet;
pub mod types;

pub use error::PacketError;
pub use packet::{Packet, ServiceCode};
pub use types::PeerAddr;
