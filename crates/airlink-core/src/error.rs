//! Wire-format error types.

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("wrong frame length: {actual} bytes (packet is exactly {expected})")]
    WrongLength { expected: usize, actual: usize },

    #[error("crc mismatch: computed {computed:#010x}, field {field:#010x}")]
    CrcMismatch { computed: u32, field: u32 },

    #[error("unknown service code: {0}")]
    UnknownServiceCode(u8),

    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
}
