//! Single-flight request/response broker.
//!
//! Turns the transport's one-way block delivery into blocking
//! request/response calls: one outstanding request per channel, bound to its
//! response by a correlation key, with a hard timeout. A response arriving
//! after its request gave up finds no pending slot and is dropped — it is
//! never delivered into a completed call.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::engine::EngineHandle;
use crate::error::RequestError;

/// How long a caller waits for the request slot before giving up.
const SLOT_TIMEOUT: Duration = Duration::from_secs(2);

/// The field binding a response to its outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationKey {
    /// Parameter protocol: one outstanding request per message type,
    /// globally serialized by the slot.
    MessageType(u8),
    /// File protocol: command codes alone are ambiguous, so requests carry
    /// an explicit id.
    RequestId(u16),
}

/// A completed response. `return_code` 0 means application-level success.
#[derive(Debug)]
pub struct Response {
    pub return_code: u8,
    pub data: Vec<u8>,
}

struct Pending {
    key: CorrelationKey,
    reply: oneshot::Sender<Response>,
}

/// Per-service request broker over one channel.
pub struct Broker {
    channel: u8,
    handle: EngineHandle,
    slot: AsyncMutex<()>,
    pending: Mutex<Option<Pending>>,
    next_request_id: AtomicU16,
}

impl Broker {
    pub fn new(handle: EngineHandle, channel: u8) -> Self {
        Broker {
            channel,
            handle,
            slot: AsyncMutex::new(()),
            pending: Mutex::new(None),
            next_request_id: AtomicU16::new(1),
        }
    }

    /// Allocate a request id: monotonically increasing, wraps to 1, never 0.
    pub fn next_request_id(&self) -> u16 {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Send `block` and wait up to `timeout` for the correlated response.
    pub async fn request(
        &self,
        key: CorrelationKey,
        block: Vec<u8>,
        timeout: Duration,
    ) -> Result<Response, RequestError> {
        let _slot = tokio::time::timeout(SLOT_TIMEOUT, self.slot.lock())
            .await
            .map_err(|_| RequestError::AnotherInProgress)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        *self.pending() = Some(Pending {
            key,
            reply: reply_tx,
        });

        if let Err(err) = self.handle.submit_block(self.channel, block).await {
            self.pending().take();
            return Err(RequestError::SendFailed(err));
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(response)) => {
                tracing::debug!(?key, return_code = response.return_code, "request completed");
                Ok(response)
            }
            Ok(Err(_)) | Err(_) => {
                // Free the slot so a response landing later is dropped
                // instead of touching a finished call.
                self.pending().take();
                tracing::warn!(?key, channel = self.channel, "request timed out");
                Err(RequestError::Timeout)
            }
        }
    }

    /// Hand an inbound response to the waiting request, if its key matches.
    pub fn complete(&self, key: CorrelationKey, response: Response) {
        let mut pending = self.pending();
        match pending.take() {
            Some(p) if p.key == key => {
                let _ = p.reply.send(response);
            }
            Some(p) => {
                tracing::debug!(?key, expected = ?p.key, "response key mismatch, dropped");
                *pending = Some(p);
            }
            None => {
                tracing::debug!(?key, "late response dropped");
            }
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Option<Pending>> {
        self.pending.lock().expect("broker pending lock poisoned")
    }
}
