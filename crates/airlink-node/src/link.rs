//! Link port abstraction and the inbound frame queue.
//!
//! The transport sits on a single-peer, best-effort datagram primitive: one
//! call sends one frame, received frames arrive through an upcall. The
//! upcall side is modelled by [`EventSink`] — a bounded, non-blocking queue
//! into the engine task, safe to feed from an interrupt-like context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use airlink_core::PeerAddr;

use crate::error::LinkSendError;

/// One received frame with its source address.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub src: PeerAddr,
    pub data: Vec<u8>,
}

/// A single-peer best-effort frame port. Implementations must not block in
/// `transmit`; reliability is the transport's job, not the link's.
pub trait LinkPort: Send + Sync {
    /// Send one frame to `peer`.
    fn transmit(&self, peer: PeerAddr, frame: &[u8]) -> Result<(), LinkSendError>;

    /// Register `peer` as a valid destination.
    fn add_peer(&self, peer: PeerAddr);
}

/// Handle the link's receive path uses to hand frames to the engine.
///
/// `push` never blocks: when the engine's event queue is full the frame is
/// dropped with a warning and the transport's retry/NACK logic recovers.
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::Sender<InboundFrame>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub(crate) fn new(sender: mpsc::Sender<InboundFrame>, dropped: Arc<AtomicU64>) -> Self {
        EventSink { sender, dropped }
    }

    pub fn push(&self, frame: InboundFrame) {
        match self.sender.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("event queue full, frame dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("engine gone, frame dropped");
            }
        }
    }
}
