//! NACK missing-list payload codec.
//!
//! The payload is a concatenation of u16 LE sequence numbers terminated by
//! `0xFFFF`, capped to the packet payload size.

use airlink_core::constants::PAYLOAD_LEN;

/// Terminator value ending the missing-sequence list.
pub const TERMINATOR: u16 = 0xFFFF;

/// Encode a missing-sequence list. Sequences that no longer fit alongside
/// the terminator are left out — the follow-up END round will re-list them.
pub fn encode(missing: impl IntoIterator<Item = u16>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PAYLOAD_LEN);
    for seq in missing {
        if buf.len() + 4 > PAYLOAD_LEN {
            break;
        }
        buf.extend_from_slice(&seq.to_le_bytes());
    }
    buf.extend_from_slice(&TERMINATOR.to_le_bytes());
    buf
}

/// Decode a missing-sequence list, stopping at the terminator or at the end
/// of the payload.
pub fn parse(payload: &[u8]) -> Vec<u16> {
    let mut missing = Vec::new();
    for chunk in payload.chunks_exact(2) {
        let seq = u16::from_le_bytes([chunk[0], chunk[1]]);
        if seq == TERMINATOR {
            break;
        }
        missing.push(seq);
    }
    missing
}
