//! Reliable datagram transport: segmentation, transmit and receive machines.
//!
//! A block is carried as BEGIN (announcing the size), one DATA packet per
//! 192-byte slice, and a closing END. The receiver answers a complete block
//! with ASK and an incomplete one with a NACK listing the missing sequence
//! numbers; the sender restarts the whole block when no ASK arrives in time.

pub mod block;
pub mod constants;
pub mod nack;
pub mod rx;
pub mod tx;

pub use constants::{ACK_TIMEOUT, MAX_RETRY, MAX_TOTAL_PACKETS};
pub use rx::{RxAction, RxTransfer};
pub use tx::{TxTick, TxTransfer};
