//! Parameter get/set protocol: frame codec and the descriptor registry.
//!
//! A parameter frame is a 3-byte header `message_type || op || return_code`
//! followed by the value bytes. Requests carry op GET or SET; the responder
//! answers with op RESP on the same channel, echoing the message type.

use crate::error::ParamError;

/// Fixed header length preceding the value bytes.
pub const PARAM_HEADER_LEN: usize = 3;

/// Maximum parameter value size.
pub const MAX_PARAM_DATA: usize = 8 * 1024;

/// Return codes carried in RESP frames.
pub const PARAM_OK: u8 = 0;
pub const PARAM_ERR_UNKNOWN_TYPE: u8 = 1;
pub const PARAM_ERR_NO_READER: u8 = 2;
pub const PARAM_ERR_NO_WRITER: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParamOp {
    Get = 0,
    Set = 1,
    Resp = 2,
}

impl TryFrom<u8> for ParamOp {
    type Error = ParamError;

    fn try_from(value: u8) -> Result<Self, ParamError> {
        match value {
            0 => Ok(ParamOp::Get),
            1 => Ok(ParamOp::Set),
            2 => Ok(ParamOp::Resp),
            other => Err(ParamError::UnknownOp(other)),
        }
    }
}

/// A decoded parameter frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamFrame {
    pub message_type: u8,
    pub op: ParamOp,
    pub return_code: u8,
    pub data: Vec<u8>,
}

impl ParamFrame {
    /// Build a GET or SET request. GET requests carry no value.
    pub fn request(message_type: u8, op: ParamOp, value: &[u8]) -> Self {
        ParamFrame {
            message_type,
            op,
            return_code: 0,
            data: value.to_vec(),
        }
    }

    /// Build a RESP frame.
    pub fn response(message_type: u8, return_code: u8, data: Vec<u8>) -> Self {
        ParamFrame {
            message_type,
            op: ParamOp::Resp,
            return_code,
            data,
        }
    }

    /// Encode into the block that travels over the params channel.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PARAM_HEADER_LEN + self.data.len());
        buf.push(self.message_type);
        buf.push(self.op as u8);
        buf.push(self.return_code);
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Decode a delivered block.
    pub fn decode(block: &[u8]) -> Result<Self, ParamError> {
        if block.len() < PARAM_HEADER_LEN {
            return Err(ParamError::FrameTooShort {
                actual: block.len(),
                min: PARAM_HEADER_LEN,
            });
        }
        Ok(ParamFrame {
            message_type: block[0],
            op: ParamOp::try_from(block[1])?,
            return_code: block[2],
            data: block[PARAM_HEADER_LEN..].to_vec(),
        })
    }
}

/// Producer callback answering a GET: returns the code and the value bytes.
pub type ReadFn = Box<dyn Fn() -> (u8, Vec<u8>) + Send + Sync>;

/// Producer callback applying a SET: receives the new value, returns the code.
pub type WriteFn = Box<dyn Fn(&[u8]) -> u8 + Send + Sync>;

/// One registry entry. Either direction may be absent.
pub struct ParamDescriptor {
    message_type: u8,
    read: Option<ReadFn>,
    write: Option<WriteFn>,
}

impl ParamDescriptor {
    pub fn new(message_type: u8) -> Self {
        ParamDescriptor {
            message_type,
            read: None,
            write: None,
        }
    }

    pub fn with_read(mut self, f: impl Fn() -> (u8, Vec<u8>) + Send + Sync + 'static) -> Self {
        self.read = Some(Box::new(f));
        self
    }

    pub fn with_write(mut self, f: impl Fn(&[u8]) -> u8 + Send + Sync + 'static) -> Self {
        self.write = Some(Box::new(f));
        self
    }
}

/// Lookup table from message type to producer callbacks.
#[derive(Default)]
pub struct ParamRegistry {
    descriptors: Vec<ParamDescriptor>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. A later registration for the same message type
    /// shadows the earlier one.
    pub fn register(&mut self, descriptor: ParamDescriptor) {
        self.descriptors.insert(0, descriptor);
    }

    fn find(&self, message_type: u8) -> Option<&ParamDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.message_type == message_type)
    }

    /// Handle a GET/SET request frame, producing the RESP frame to send
    /// back. Returns `None` for frames that are not requests.
    pub fn handle_request(&self, frame: &ParamFrame) -> Option<ParamFrame> {
        let t = frame.message_type;
        let response = match frame.op {
            ParamOp::Resp => return None,
            ParamOp::Get => match self.find(t) {
                None => ParamFrame::response(t, PARAM_ERR_UNKNOWN_TYPE, Vec::new()),
                Some(desc) => match &desc.read {
                    None => ParamFrame::response(t, PARAM_ERR_NO_READER, Vec::new()),
                    Some(read) => {
                        let (code, mut data) = read();
                        data.truncate(MAX_PARAM_DATA);
                        ParamFrame::response(t, code, data)
                    }
                },
            },
            ParamOp::Set => match self.find(t) {
                None => ParamFrame::response(t, PARAM_ERR_UNKNOWN_TYPE, Vec::new()),
                Some(desc) => match &desc.write {
                    None => ParamFrame::response(t, PARAM_ERR_NO_WRITER, Vec::new()),
                    // SET responses carry no value by convention.
                    Some(write) => ParamFrame::response(t, write(&frame.data), Vec::new()),
                },
            },
        };
        tracing::debug!(
            message_type = t,
            op = ?frame.op,
            return_code = response.return_code,
            "param request handled"
        );
        Some(response)
    }
}
