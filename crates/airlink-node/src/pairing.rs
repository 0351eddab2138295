//! Pairing manager: drives the pairing session over the system channel.
//!
//! `begin` clears any previously stored peer, points the engine back at
//! broadcast, and spawns the session task. On mutual confirmation the
//! candidate is committed to the [`PeerStore`], registered with the link,
//! and set as the engine's destination; on timeout everything is cleared
//! again. Either way, the stored peer ends up fully confirmed or all-zero.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use airlink_core::constants::CHANNEL_SYSTEM;
use airlink_core::PeerAddr;
use airlink_protocol::pairing::{
    PairingAction, PairingMessage, PairingSession, PairingStatus, PAIR_TIMEOUT,
};

use crate::engine::EngineHandle;
use crate::error::StorageError;
use crate::link::LinkPort;
use crate::storage::PeerStore;

/// Per-round receive wait; also bounds broadcast timing jitter.
const RECEIVE_WAIT: Duration = Duration::from_millis(200);

pub struct PairingManager {
    handle: EngineHandle,
    link: Arc<dyn LinkPort>,
    store: Arc<dyn PeerStore>,
    own_addr: PeerAddr,
    session_timeout: Duration,
    status: Arc<Mutex<PairingStatus>>,
}

impl PairingManager {
    pub fn new(
        handle: EngineHandle,
        link: Arc<dyn LinkPort>,
        store: Arc<dyn PeerStore>,
        own_addr: PeerAddr,
    ) -> Self {
        let initial = if store.peer().is_zero() {
            PairingStatus::Unpaired
        } else {
            PairingStatus::Paired
        };
        PairingManager {
            handle,
            link,
            store,
            own_addr,
            session_timeout: PAIR_TIMEOUT,
            status: Arc::new(Mutex::new(initial)),
        }
    }

    /// Override the session deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn status(&self) -> PairingStatus {
        *self.status.lock().expect("pairing status lock poisoned")
    }

    /// Start a pairing session. Returns `None` when one is already running.
    /// The task resolves to the final status (Paired or Unpaired).
    pub fn begin(&self) -> Option<JoinHandle<PairingStatus>> {
        {
            let mut status = self.status.lock().expect("pairing status lock poisoned");
            if *status == PairingStatus::Active {
                tracing::warn!("pairing already active");
                return None;
            }
            *status = PairingStatus::Active;
        }

        // Clear any previously stored peer before starting: a session that
        // dies mid-way must not leave the old identity behind.
        if let Err(err) = clear_store(self.store.as_ref()) {
            tracing::error!(%err, "failed to clear stored peer, pairing not started");
            *self.status.lock().expect("pairing status lock poisoned") = PairingStatus::Unpaired;
            return None;
        }
        self.handle.set_peer(PeerAddr::BROADCAST);
        self.handle.clear_queue(CHANNEL_SYSTEM);

        let ctx = SessionCtx {
            handle: self.handle.clone(),
            link: Arc::clone(&self.link),
            store: Arc::clone(&self.store),
            status: Arc::clone(&self.status),
            own_addr: self.own_addr,
        };
        let timeout = self.session_timeout;
        Some(tokio::spawn(async move { run_session(ctx, timeout).await }))
    }
}

struct SessionCtx {
    handle: EngineHandle,
    link: Arc<dyn LinkPort>,
    store: Arc<dyn PeerStore>,
    status: Arc<Mutex<PairingStatus>>,
    own_addr: PeerAddr,
}

async fn run_session(ctx: SessionCtx, timeout: Duration) -> PairingStatus {
    let mut session = PairingSession::with_timeout(ctx.own_addr, Instant::now(), timeout);

    loop {
        if let Some(action) = session.poll(Instant::now()) {
            if let Some(outcome) = enact(&ctx, action).await {
                return outcome;
            }
        }

        let Some(block) = ctx.handle.receive_block(CHANNEL_SYSTEM, RECEIVE_WAIT).await else {
            continue;
        };
        let message = match PairingMessage::decode(&block) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(%err, "bad pairing frame");
                continue;
            }
        };
        for action in session.on_message(message) {
            if let Some(outcome) = enact(&ctx, action).await {
                return outcome;
            }
        }
    }
}

/// Enact one session action. Returns the final status when the session ends.
async fn enact(ctx: &SessionCtx, action: PairingAction) -> Option<PairingStatus> {
    match action {
        PairingAction::SendMac => {
            send(&ctx.handle, PairingMessage::Mac(ctx.own_addr)).await;
            None
        }
        PairingAction::SendDone => {
            send(&ctx.handle, PairingMessage::Done(ctx.own_addr)).await;
            None
        }
        PairingAction::Finalize(peer) => {
            if let Err(err) = ctx.store.stage(peer).and_then(|()| ctx.store.commit()) {
                tracing::error!(%err, "peer commit failed, reverting");
                if let Err(err) = clear_store(ctx.store.as_ref()) {
                    tracing::error!(%err, "peer clear failed");
                }
                set_status(&ctx.status, PairingStatus::Unpaired);
                return Some(PairingStatus::Unpaired);
            }
            ctx.link.add_peer(peer);
            ctx.handle.set_peer(peer);
            set_status(&ctx.status, PairingStatus::Paired);
            tracing::info!(%peer, "paired");
            Some(PairingStatus::Paired)
        }
        PairingAction::Revert => {
            if let Err(err) = clear_store(ctx.store.as_ref()) {
                tracing::error!(%err, "peer clear failed");
            }
            set_status(&ctx.status, PairingStatus::Unpaired);
            tracing::info!("pairing reverted");
            Some(PairingStatus::Unpaired)
        }
    }
}

fn clear_store(store: &dyn PeerStore) -> Result<(), StorageError> {
    store.stage(PeerAddr::ZERO)?;
    store.commit()
}

async fn send(handle: &EngineHandle, message: PairingMessage) {
    if let Err(err) = handle.submit_block(CHANNEL_SYSTEM, message.encode()).await {
        tracing::warn!(%err, "pairing send failed");
    }
}

fn set_status(status: &Arc<Mutex<PairingStatus>>, value: PairingStatus) {
    *status.lock().expect("pairing status lock poisoned") = value;
}
