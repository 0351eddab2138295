//! File service: serves list/read/write requests from a [`FileProvider`]
//! and runs the blocking client calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use airlink_core::constants::CHANNEL_FILES;
use airlink_protocol::files::{
    process_request, FileCommand, FileFrame, FileProvider, APPEND_OFFSET,
};

use crate::broker::{Broker, CorrelationKey, Response};
use crate::engine::EngineHandle;
use crate::error::RequestError;

/// Default wait for a file response. File operations touch storage on the
/// remote end, so this is more generous than the parameter default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-round receive wait of the serve task.
const RECEIVE_WAIT: Duration = Duration::from_millis(200);

pub struct FileService {
    handle: EngineHandle,
    broker: Arc<Broker>,
    started: AtomicBool,
}

impl FileService {
    pub fn new(handle: EngineHandle) -> Self {
        let broker = Arc::new(Broker::new(handle.clone(), CHANNEL_FILES));
        FileService {
            handle,
            broker,
            started: AtomicBool::new(false),
        }
    }

    /// Start serving the files channel against `provider`.
    pub fn serve(&self, provider: Arc<dyn FileProvider>) -> JoinHandle<()> {
        self.started.store(true, Ordering::Relaxed);
        let handle = self.handle.clone();
        let broker = Arc::clone(&self.broker);
        tokio::spawn(async move {
            loop {
                if handle.is_stopped() {
                    break;
                }
                let Some(block) = handle.receive_block(CHANNEL_FILES, RECEIVE_WAIT).await
                else {
                    continue;
                };
                match FileFrame::decode(&block) {
                    Ok(frame) if frame.command.is_request() => {
                        let response = process_request(provider.as_ref(), &frame);
                        if let Err(err) =
                            handle.submit_block(CHANNEL_FILES, response.encode()).await
                        {
                            tracing::warn!(%err, "file response send failed");
                        }
                    }
                    Ok(frame) => broker.complete(
                        CorrelationKey::RequestId(frame.request_id),
                        Response {
                            return_code: frame.return_code,
                            data: frame.data,
                        },
                    ),
                    Err(err) => tracing::warn!(%err, "bad file frame"),
                }
            }
        })
    }

    /// List a directory on the remote end. The response data is the listing
    /// payload.
    pub async fn list(&self, directory: &str, timeout: Duration) -> Result<Response, RequestError> {
        self.request(FileCommand::List, directory, 0, Vec::new(), timeout)
            .await
    }

    /// Read a segment of a remote file starting at `offset`.
    pub async fn read(
        &self,
        path: &str,
        offset: u64,
        timeout: Duration,
    ) -> Result<Response, RequestError> {
        self.request(FileCommand::Read, path, offset as u32, Vec::new(), timeout)
            .await
    }

    /// Write a segment of a remote file. `offset` of `None` appends.
    pub async fn write(
        &self,
        path: &str,
        offset: Option<u64>,
        data: Vec<u8>,
        timeout: Duration,
    ) -> Result<Response, RequestError> {
        let offset = match offset {
            Some(at) => at as u32,
            None => APPEND_OFFSET,
        };
        self.request(FileCommand::Write, path, offset, data, timeout)
            .await
    }

    async fn request(
        &self,
        command: FileCommand,
        path: &str,
        offset: u32,
        data: Vec<u8>,
        timeout: Duration,
    ) -> Result<Response, RequestError> {
        self.ensure_started()?;
        let request_id = self.broker.next_request_id();
        let frame = FileFrame::request(command, request_id, path, offset, data)?;
        self.broker
            .request(
                CorrelationKey::RequestId(request_id),
                frame.encode(),
                timeout,
            )
            .await
    }

    fn ensure_started(&self) -> Result<(), RequestError> {
        if self.started.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(RequestError::NotInitialized)
        }
    }
}
