//! Protocol error types.
//!
//! These cover malformed sub-protocol frames riding inside delivered blocks.
//! Transport-level failures never surface typed — a lost block is observed
//! only as a request timeout.

#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("parameter frame too short: {actual} bytes (minimum {min})")]
    FrameTooShort { actual: usize, min: usize },

    #[error("unknown parameter op: {0}")]
    UnknownOp(u8),
}

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("file frame too short: {actual} bytes (minimum {min})")]
    FrameTooShort { actual: usize, min: usize },

    #[error("file frame truncated: header describes {described} bytes, frame has {actual}")]
    Truncated { described: usize, actual: usize },

    #[error("unknown file command {command} (request {request_id})")]
    UnknownCommand { command: u8, request_id: u16 },

    #[error("path is not valid utf-8")]
    InvalidPath,

    #[error("path too long: {len} bytes (max {max})")]
    PathTooLong { len: usize, max: usize },

    #[error("data too long: {len} bytes (max {max})")]
    DataTooLong { len: usize, max: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("system frame too short: {actual} bytes (minimum {min})")]
    FrameTooShort { actual: usize, min: usize },

    #[error("unknown system message type: {0}")]
    UnknownMessageType(u8),
}
