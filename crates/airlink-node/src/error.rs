//! Node-level error types.
//!
//! Submission rejections carry the block buffer back to the caller so
//! ownership never goes ambiguous on failure.

use airlink_protocol::error::FileError;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LinkSendError {
    #[error("link not ready")]
    NotReady,

    #[error("frame too large: {len} bytes (mtu {mtu})")]
    FrameTooLarge { len: usize, mtu: usize },
}

/// Why a block was not accepted for transmission. Every variant that took
/// ownership of the buffer hands it back.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid channel {channel}")]
    InvalidChannel { channel: u8, block: Vec<u8> },

    #[error("empty block")]
    EmptyBlock,

    #[error("block too large: {len} bytes (max {max})")]
    BlockTooLarge { len: usize, max: usize, block: Vec<u8> },

    #[error("tx queue full on channel {channel}")]
    QueueFull { channel: u8, block: Vec<u8> },
}

impl SubmitError {
    /// Recover the rejected block buffer.
    pub fn into_block(self) -> Vec<u8> {
        match self {
            SubmitError::InvalidChannel { block, .. }
            | SubmitError::BlockTooLarge { block, .. }
            | SubmitError::QueueFull { block, .. } => block,
            SubmitError::EmptyBlock => Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("service not started")]
    NotInitialized,

    #[error("another request in progress")]
    AnotherInProgress,

    #[error("request send failed: {0}")]
    SendFailed(#[from] SubmitError),

    #[error("malformed request: {0}")]
    Malformed(#[from] FileError),

    #[error("request timed out")]
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}
