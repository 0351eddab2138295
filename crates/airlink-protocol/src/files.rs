//! File access protocol: frame codec, request processing, provider trait.
//!
//! A file frame is a 16-byte header followed by the path bytes and then the
//! data bytes. Requests and responses share the layout; a response echoes
//! the request id and answers with `command + 1` (LIST → LIST_RESP and so
//! on). Writes at offset `0xFFFFFFFF` append.

use crate::error::FileError;

/// Fixed header length preceding path and data.
pub const FILE_HEADER_LEN: usize = 16;

/// Maximum path length in bytes.
pub const MAX_PATH_LEN: usize = 128;

/// Maximum data bytes per request or response.
pub const MAX_FILE_DATA: usize = 4 * 1024;

/// Offset value meaning "append" in WRITE requests (and "no seek" in READ).
pub const APPEND_OFFSET: u32 = 0xFFFF_FFFF;

/// Wire return codes.
pub const FILES_OK: u8 = 0;
pub const FILES_ERR_UNKNOWN: u8 = 1;
pub const FILES_ERR_NOT_FOUND: u8 = 2;
pub const FILES_ERR_IO: u8 = 3;
pub const FILES_ERR_TOO_LARGE: u8 = 4;
pub const FILES_ERR_INTERNAL: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileCommand {
    List = 1,
    ListResp = 2,
    Read = 3,
    ReadResp = 4,
    Write = 5,
    WriteResp = 6,
}

impl FileCommand {
    pub fn is_request(self) -> bool {
        matches!(self, FileCommand::List | FileCommand::Read | FileCommand::Write)
    }

    /// The response command answering this request.
    pub fn response(self) -> FileCommand {
        match self {
            FileCommand::List => FileCommand::ListResp,
            FileCommand::Read => FileCommand::ReadResp,
            FileCommand::Write => FileCommand::WriteResp,
            resp => resp,
        }
    }
}

impl TryFrom<u8> for FileCommand {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(FileCommand::List),
            2 => Ok(FileCommand::ListResp),
            3 => Ok(FileCommand::Read),
            4 => Ok(FileCommand::ReadResp),
            5 => Ok(FileCommand::Write),
            6 => Ok(FileCommand::WriteResp),
            other => Err(other),
        }
    }
}

/// A decoded file frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFrame {
    pub command: FileCommand,
    pub return_code: u8,
    pub request_id: u16,
    pub offset: u32,
    pub path: String,
    pub data: Vec<u8>,
}

impl FileFrame {
    /// Build a request frame.
    pub fn request(
        command: FileCommand,
        request_id: u16,
        path: &str,
        offset: u32,
        data: Vec<u8>,
    ) -> Result<Self, FileError> {
        if path.len() > MAX_PATH_LEN {
            return Err(FileError::PathTooLong {
                len: path.len(),
                max: MAX_PATH_LEN,
            });
        }
        if data.len() > MAX_FILE_DATA {
            return Err(FileError::DataTooLong {
                len: data.len(),
                max: MAX_FILE_DATA,
            });
        }
        Ok(FileFrame {
            command,
            return_code: 0,
            request_id,
            offset,
            path: path.to_string(),
            data,
        })
    }

    /// Build the response skeleton for a request: echoes the request id and
    /// offset, maps the command, carries no path.
    pub fn response_to(request: &FileFrame, return_code: u8, data: Vec<u8>) -> Self {
        FileFrame {
            command: request.command.response(),
            return_code,
            request_id: request.request_id,
            offset: request.offset,
            path: String::new(),
            data,
        }
    }

    /// Encode into the block that travels over the files channel.
    ///
    /// Layout: `command(1) || return_code(1) || request_id(2 LE) ||
    /// offset(4 LE) || data_length(4 LE) || path_length(1) || reserved(3) ||
    /// path || data`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FILE_HEADER_LEN + self.path.len() + self.data.len());
        buf.push(self.command as u8);
        buf.push(self.return_code);
        buf.extend_from_slice(&self.request_id.to_le_bytes());
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buf.push(self.path.len() as u8);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(self.path.as_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Decode a delivered block. Trailing slack after the described path and
    /// data regions is tolerated.
    pub fn decode(block: &[u8]) -> Result<Self, FileError> {
        if block.len() < FILE_HEADER_LEN {
            return Err(FileError::FrameTooShort {
                actual: block.len(),
                min: FILE_HEADER_LEN,
            });
        }

        let request_id = u16::from_le_bytes([block[2], block[3]]);
        let command = FileCommand::try_from(block[0])
            .map_err(|command| FileError::UnknownCommand { command, request_id })?;
        let return_code = block[1];
        let offset = u32::from_le_bytes(block[4..8].try_into().expect("4-byte slice"));
        let data_length = u32::from_le_bytes(block[8..12].try_into().expect("4-byte slice")) as usize;
        let path_length = block[12] as usize;

        let described = FILE_HEADER_LEN + path_length + data_length;
        if described > block.len() {
            return Err(FileError::Truncated {
                described,
                actual: block.len(),
            });
        }

        let path_bytes = &block[FILE_HEADER_LEN..FILE_HEADER_LEN + path_length];
        let path = std::str::from_utf8(path_bytes)
            .map_err(|_| FileError::InvalidPath)?
            .to_string();
        let data = block[FILE_HEADER_LEN + path_length..described].to_vec();

        Ok(FileFrame {
            command,
            return_code,
            request_id,
            offset,
            path,
            data,
        })
    }
}

/// Errors a [`FileProvider`] can surface; each maps to a wire return code.
#[derive(Debug, thiserror::Error)]
pub enum FileAccessError {
    #[error("file not found")]
    NotFound,

    #[error("i/o error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FileAccessError {
    pub fn return_code(&self) -> u8 {
        match self {
            FileAccessError::NotFound => FILES_ERR_NOT_FOUND,
            FileAccessError::Io(_) => FILES_ERR_IO,
            FileAccessError::Internal(_) => FILES_ERR_INTERNAL,
        }
    }
}

/// Storage collaborator serving the remote end's requests. Implementations
/// live outside this crate (the node's tests use an in-memory one).
pub trait FileProvider: Send + Sync {
    /// List the entries of a directory. The returned bytes are the listing
    /// payload (one `name\tsize\n` line per entry by convention).
    fn list(&self, directory: &str) -> Result<Vec<u8>, FileAccessError>;

    /// Read up to `max_len` bytes. `offset` of `None` reads from the start.
    fn read(
        &self,
        path: &str,
        offset: Option<u64>,
        max_len: usize,
    ) -> Result<Vec<u8>, FileAccessError>;

    /// Write `data`. `offset` of `None` appends to the end.
    fn write(&self, path: &str, offset: Option<u64>, data: &[u8])
        -> Result<(), FileAccessError>;
}

/// Process one inbound request frame into its response frame.
pub fn process_request(provider: &dyn FileProvider, request: &FileFrame) -> FileFrame {
    if !request.command.is_request() {
        return FileFrame::response_to(request, FILES_ERR_UNKNOWN, Vec::new());
    }
    if request.path.len() > MAX_PATH_LEN || request.data.len() > MAX_FILE_DATA {
        return FileFrame::response_to(request, FILES_ERR_TOO_LARGE, Vec::new());
    }

    let seek = (request.offset != APPEND_OFFSET).then_some(request.offset as u64);

    let outcome = match request.command {
        FileCommand::List => {
            // Directory listings are rooted with a trailing slash.
            let mut dir = request.path.clone();
            if !dir.ends_with('/') {
                dir.push('/');
            }
            provider.list(&dir).map(|mut data| {
                data.truncate(MAX_FILE_DATA);
                data
            })
        }
        FileCommand::Read => provider.read(&request.path, seek, MAX_FILE_DATA),
        FileCommand::Write => provider
            .write(&request.path, seek, &request.data)
            .map(|()| Vec::new()),
        _ => unreachable!("is_request() checked above"),
    };

    match outcome {
        Ok(data) => FileFrame::response_to(request, FILES_OK, data),
        Err(err) => {
            tracing::debug!(
                command = ?request.command,
                request_id = request.request_id,
                %err,
                "file request failed"
            );
            FileFrame::response_to(request, err.return_code(), Vec::new())
        }
    }
}
