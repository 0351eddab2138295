//! RDT packet wire codec.
//!
//! Every frame on the link is exactly [`PACKET_SIZE`] bytes:
//! `channel(1) || seq(2, LE) || service_code(1) || payload(192) || crc(4, LE)`.
//! The CRC-32 (reflected IEEE 802.3, init `0xFFFFFFFF`, final inversion)
//! covers every byte preceding the CRC field. A fixed frame keeps receive
//! buffers stack-resident on the hot path.

use crate::constants::{PACKET_SIZE, PAYLOAD_LEN};
use crate::error::PacketError;

/// Offset of the CRC field; also the number of bytes the CRC covers.
const CRC_OFFSET: usize = PACKET_SIZE - 4;

/// Per-packet control codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceCode {
    /// Opens a block transfer; payload starts with the block size (u32 LE).
    Begin = 1,
    /// Carries one payload segment of the block.
    Data = 2,
    /// Closes a block transfer; empty payload.
    End = 3,
    /// Positive acknowledgement: the whole block was received.
    Ask = 4,
    /// Negative acknowledgement: payload lists missing sequence numbers.
    Nack = 5,
}

impl TryFrom<u8> for ServiceCode {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, PacketError> {
        match value {
            1 => Ok(ServiceCode::Begin),
            2 => Ok(ServiceCode::Data),
            3 => Ok(ServiceCode::End),
            4 => Ok(ServiceCode::Ask),
            5 => Ok(ServiceCode::Nack),
            other => Err(PacketError::UnknownServiceCode(other)),
        }
    }
}

/// One fixed-size RDT wire packet.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub channel: u8,
    pub seq: u16,
    pub service_code: ServiceCode,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Packet {
    /// Build a packet with an all-zero payload.
    pub fn new(channel: u8, seq: u16, service_code: ServiceCode) -> Self {
        Packet {
            channel,
            seq,
            service_code,
            payload: [0u8; PAYLOAD_LEN],
        }
    }

    /// Build a packet, copying `data` into the head of the payload. The
    /// remainder stays zero.
    pub fn with_payload(
        channel: u8,
        seq: u16,
        service_code: ServiceCode,
        data: &[u8],
    ) -> Result<Self, PacketError> {
        if data.len() > PAYLOAD_LEN {
            return Err(PacketError::PayloadTooLarge {
                len: data.len(),
                max: PAYLOAD_LEN,
            });
        }
        let mut packet = Packet::new(channel, seq, service_code);
        packet.payload[..data.len()].copy_from_slice(data);
        Ok(packet)
    }

    /// Serialize into the fixed wire frame, computing the CRC.
    pub fn serialize(&self) -> [u8; PACKET_SIZE] {
        let mut raw = [0u8; PACKET_SIZE];
        raw[0] = self.channel;
        raw[1..3].copy_from_slice(&self.seq.to_le_bytes());
        raw[3] = self.service_code as u8;
        raw[4..4 + PAYLOAD_LEN].copy_from_slice(&self.payload);
        let crc = crc32fast::hash(&raw[..CRC_OFFSET]);
        raw[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        raw
    }

    /// Parse a wire frame, verifying length and CRC.
    #[must_use = "parsing may fail; check the Result"]
    pub fn parse(raw: &[u8]) -> Result<Self, PacketError> {
        if raw.len() != PACKET_SIZE {
            return Err(PacketError::WrongLength {
                expected: PACKET_SIZE,
                actual: raw.len(),
            });
        }

        let field = u32::from_le_bytes(raw[CRC_OFFSET..].try_into().expect("4-byte slice"));
        let computed = crc32fast::hash(&raw[..CRC_OFFSET]);
        if computed != field {
            return Err(PacketError::CrcMismatch { computed, field });
        }

        let service_code = ServiceCode::try_from(raw[3])?;
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&raw[4..4 + PAYLOAD_LEN]);

        Ok(Packet {
            channel: raw[0],
            seq: u16::from_le_bytes([raw[1], raw[2]]),
            service_code,
            payload,
        })
    }

    /// The first `len` payload bytes.
    pub fn payload_prefix(&self, len: usize) -> &[u8] {
        &self.payload[..len.min(PAYLOAD_LEN)]
    }
}

// Manual Debug: the 192-byte payload would drown the useful fields.
impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("channel", &self.channel)
            .field("seq", &self.seq)
            .field("service_code", &self.service_code)
            .finish_non_exhaustive()
    }
}
