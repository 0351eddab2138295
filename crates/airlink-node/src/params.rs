//! Parameter service: answers GET/SET requests from the registry and runs
//! blocking get/set calls against the remote end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use airlink_core::constants::CHANNEL_PARAMS;
use airlink_protocol::param::{ParamFrame, ParamOp, ParamRegistry};

use crate::broker::{Broker, CorrelationKey, Response};
use crate::engine::EngineHandle;
use crate::error::RequestError;

/// Default wait for a parameter response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-round receive wait of the serve task.
const RECEIVE_WAIT: Duration = Duration::from_millis(200);

pub struct ParamService {
    handle: EngineHandle,
    broker: Arc<Broker>,
    started: AtomicBool,
}

impl ParamService {
    pub fn new(handle: EngineHandle) -> Self {
        let broker = Arc::new(Broker::new(handle.clone(), CHANNEL_PARAMS));
        ParamService {
            handle,
            broker,
            started: AtomicBool::new(false),
        }
    }

    /// Start serving the params channel: requests go through `registry`,
    /// responses wake the matching blocked caller.
    pub fn serve(&self, registry: ParamRegistry) -> JoinHandle<()> {
        self.started.store(true, Ordering::Relaxed);
        let handle = self.handle.clone();
        let broker = Arc::clone(&self.broker);
        tokio::spawn(async move {
            loop {
                if handle.is_stopped() {
                    break;
                }
                let Some(block) = handle.receive_block(CHANNEL_PARAMS, RECEIVE_WAIT).await
                else {
                    continue;
                };
                let frame = match ParamFrame::decode(&block) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(%err, "bad param frame");
                        continue;
                    }
                };
                match frame.op {
                    ParamOp::Resp => broker.complete(
                        CorrelationKey::MessageType(frame.message_type),
                        Response {
                            return_code: frame.return_code,
                            data: frame.data,
                        },
                    ),
                    ParamOp::Get | ParamOp::Set => {
                        let Some(response) = registry.handle_request(&frame) else {
                            continue;
                        };
                        if let Err(err) =
                            handle.submit_block(CHANNEL_PARAMS, response.encode()).await
                        {
                            tracing::warn!(%err, "param response send failed");
                        }
                    }
                }
            }
        })
    }

    /// Read a parameter from the remote end.
    pub async fn get(&self, message_type: u8, timeout: Duration) -> Result<Response, RequestError> {
        self.ensure_started()?;
        let request = ParamFrame::request(message_type, ParamOp::Get, &[]);
        self.broker
            .request(
                CorrelationKey::MessageType(message_type),
                request.encode(),
                timeout,
            )
            .await
    }

    /// Write a parameter on the remote end. A `return_code` of 0 in the
    /// response means the write was accepted.
    pub async fn set(
        &self,
        message_type: u8,
        value: &[u8],
        timeout: Duration,
    ) -> Result<Response, RequestError> {
        self.ensure_started()?;
        let request = ParamFrame::request(message_type, ParamOp::Set, value);
        self.broker
            .request(
                CorrelationKey::MessageType(message_type),
                request.encode(),
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
