//! In-memory link pair for exercising the transport without a radio.
//!
//! Frames transmitted on one end arrive at the other end's engine sink.
//! A programmable drop hook loses frames "on the air", and every transmit
//! attempt is captured for wire-level assertions.

use std::sync::{Arc, Mutex};

use airlink_core::constants::PACKET_SIZE;
use airlink_core::PeerAddr;

use crate::error::LinkSendError;
use crate::link::{EventSink, InboundFrame, LinkPort};

type DropFn = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// One end of an in-memory link.
pub struct MemoryLink {
    local_addr: PeerAddr,
    peer_sink: Mutex<Option<EventSink>>,
    drop_fn: Mutex<Option<DropFn>>,
    captured: Mutex<Vec<Vec<u8>>>,
}

impl MemoryLink {
    pub fn new(local_addr: PeerAddr) -> Self {
        MemoryLink {
            local_addr,
            peer_sink: Mutex::new(None),
            drop_fn: Mutex::new(None),
            captured: Mutex::new(Vec::new()),
        }
    }

    /// Create both ends of a link.
    pub fn pair(addr_a: PeerAddr, addr_b: PeerAddr) -> (Arc<MemoryLink>, Arc<MemoryLink>) {
        (
            Arc::new(MemoryLink::new(addr_a)),
            Arc::new(MemoryLink::new(addr_b)),
        )
    }

    /// Wire this end's output into the far engine's event sink.
    pub fn connect(&self, sink: EventSink) {
        *self.peer_sink.lock().expect("link lock poisoned") = Some(sink);
    }

    /// Drop every frame for which `f` returns true.
    pub fn set_drop_fn(&self, f: impl FnMut(&[u8]) -> bool + Send + 'static) {
        *self.drop_fn.lock().expect("link lock poisoned") = Some(Box::new(f));
    }

    /// All frames this end attempted to transmit, dropped ones included.
    pub fn captured(&self) -> Vec<Vec<u8>> {
        self.captured.lock().expect("link lock poisoned").clone()
    }

    pub fn clear_captured(&self) {
        self.captured.lock().expect("link lock poisoned").clear();
    }
}

impl LinkPort for MemoryLink {
    fn transmit(&self, _peer: PeerAddr, frame: &[u8]) -> Result<(), LinkSendError> {
        if frame.len() > PACKET_SIZE {
            return Err(LinkSendError::FrameTooLarge {
                len: frame.len(),
                mtu: PACKET_SIZE,
            });
        }

        self.captured
            .lock()
            .expect("link lock poisoned")
            .push(frame.to_vec());

        let mut drop_fn = self.drop_fn.lock().expect("link lock poisoned");
        if let Some(f) = drop_fn.as_mut() {
            if f(frame) {
                tracing::trace!(len = frame.len(), "memory link dropped frame");
                return Ok(());
            }
        }
        drop(drop_fn);

        match self.peer_sink.lock().expect("link lock poisoned").as_ref() {
            Some(sink) => {
                sink.push(InboundFrame {
                    src: self.local_addr,
                    data: frame.to_vec(),
                });
                Ok(())
            }
            None => Err(LinkSendError::NotReady),
        }
    }

    fn add_peer(&self, _peer: PeerAddr) {}
}
