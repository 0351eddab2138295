//! RDT timing and sizing constants.

use std::time::Duration;

/// How long the sender waits for an ASK before retransmitting the block.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(100);

/// Full-block retransmissions before the sender gives up.
pub const MAX_RETRY: u8 = 5;

/// Upper bound on packets per block. The NACK missing-list terminator
/// (`0xFFFF`) must never collide with a real sequence number.
pub const MAX_TOTAL_PACKETS: u16 = 0xFFFE;
