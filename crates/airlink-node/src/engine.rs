//! The engine task: one cooperative loop driving all channels.
//!
//! Inbound frames land in a bounded event queue; the engine drains it,
//! routes each packet to the right channel's transmit or receive machine,
//! and on every iteration — frame or not — sweeps all channels so pending
//! sends and the ASK timeout make progress. All channel state lives under a
//! single mutex that is never held across an await point.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Notify};

use airlink_core::constants::MAX_CHANNELS;
use airlink_core::{Packet, PeerAddr, ServiceCode};
use airlink_protocol::rdt::{block, RxAction, RxTransfer, TxTick, TxTransfer, MAX_TOTAL_PACKETS};

use crate::config::{ChannelConfig, NodeConfig};
use crate::error::SubmitError;
use crate::link::{EventSink, InboundFrame, LinkPort};

/// How long the engine waits on the event queue before a timer-only sweep.
const TICK: Duration = Duration::from_millis(50);

/// How long `submit_block` waits for space in a full tx queue.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// A peer is considered connected while frames keep arriving within this
/// window.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Transport counters, readable through [`EngineHandle::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStats {
    pub packets_sent: u64,
    pub packets_resent: u64,
    pub blocks_delivered: u64,
    pub blocks_aborted: u64,
    /// Inbound frames rejected by the codec (bad length, CRC, code).
    pub invalid_frames: u64,
    /// Frames lost to a full event queue.
    pub frames_dropped: u64,
    /// Reassembled blocks lost to a full rx queue.
    pub blocks_dropped: u64,
}

impl LinkStats {
    /// Fraction of sent packets that were retransmissions.
    pub fn error_rate(&self) -> f32 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.packets_resent as f32 / self.packets_sent as f32
        }
    }
}

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub event_queue_len: usize,
    pub channels: [ChannelConfig; MAX_CHANNELS],
    /// Initial destination for outbound frames. Broadcast until pairing
    /// locks in a peer.
    pub peer: PeerAddr,
}

impl Default for EngineConfig {
    fn default() -> Self {
        NodeConfig::default().engine_config()
    }
}

impl NodeConfig {
    /// Derive the runtime engine configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            event_queue_len: self.engine.event_queue_len,
            channels: self.channels.as_array(),
            peer: PeerAddr::BROADCAST,
        }
    }
}

struct Channel {
    config: ChannelConfig,
    tx_queue: VecDeque<Vec<u8>>,
    rx_queue: VecDeque<Vec<u8>>,
    tx: Option<TxTransfer>,
    rx: Option<RxTransfer>,
    /// Fires once per block pushed to `rx_queue`.
    delivered: Arc<Notify>,
    /// Fires when `tx_queue` gains room.
    tx_space: Arc<Notify>,
}

impl Channel {
    fn new(config: ChannelConfig) -> Self {
        Channel {
            config,
            tx_queue: VecDeque::with_capacity(config.tx_queue_len),
            rx_queue: VecDeque::with_capacity(config.rx_queue_len),
            tx: None,
            rx: None,
            delivered: Arc::new(Notify::new()),
            tx_space: Arc::new(Notify::new()),
        }
    }
}

struct EngineState {
    channels: Vec<Channel>,
    peer: PeerAddr,
    last_heard: Option<Instant>,
    stats: LinkStats,
}

/// The engine task. Construct with [`Engine::new`], then `run().await` it.
pub struct Engine {
    state: Arc<Mutex<EngineState>>,
    link: Arc<dyn LinkPort>,
    events: mpsc::Receiver<InboundFrame>,
    stop_rx: watch::Receiver<bool>,
}

/// Cloneable handle for consumers of the engine.
#[derive(Clone)]
pub struct EngineHandle {
    state: Arc<Mutex<EngineState>>,
    events: mpsc::Sender<InboundFrame>,
    stop_tx: watch::Sender<bool>,
    sink_dropped: Arc<AtomicU64>,
}

impl Engine {
    pub fn new(link: Arc<dyn LinkPort>, config: EngineConfig) -> (Engine, EngineHandle) {
        let state = Arc::new(Mutex::new(EngineState {
            channels: config.channels.iter().map(|&c| Channel::new(c)).collect(),
            peer: config.peer,
            last_heard: None,
            stats: LinkStats::default(),
        }));
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_len.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let engine = Engine {
            state: Arc::clone(&state),
            link,
            events: events_rx,
            stop_rx,
        };
        let handle = EngineHandle {
            state,
            events: events_tx,
            stop_tx,
            sink_dropped: Arc::new(AtomicU64::new(0)),
        };
        (engine, handle)
    }

    /// Drive the transport until shutdown.
    pub async fn run(mut self) {
        tracing::info!("engine running");
        loop {
            tokio::select! {
                _ = self.stop_rx.changed() => {
                    tracing::info!("engine stopped");
                    break;
                }
                maybe = self.events.recv() => match maybe {
                    Some(frame) => self.handle_frame(frame),
                    None => break,
                },
                _ = tokio::time::sleep(TICK) => {}
            }
            self.sweep(Instant::now());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state lock poisoned")
    }

    fn transmit(&self, peer: PeerAddr, packet: &Packet) {
        if let Err(err) = self.link.transmit(peer, &packet.serialize()) {
            tracing::warn!(%err, "link transmit failed");
        }
    }

    fn handle_frame(&self, frame: InboundFrame) {
        let now = Instant::now();
        let packet = match Packet::parse(&frame.data) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::trace!(src = %frame.src, %err, "dropping invalid frame");
                self.lock().stats.invalid_frames += 1;
                return;
            }
        };

        let mut state = self.lock();
        state.last_heard = Some(now);
        let peer = state.peer;
        let idx = packet.channel as usize;
        if idx >= state.channels.len() {
            tracing::trace!(channel = packet.channel, "frame for unknown channel");
            return;
        }

        match packet.service_code {
            ServiceCode::Begin => {
                let channel = &mut state.channels[idx];
                if channel.rx.is_some() {
                    tracing::debug!(channel = idx, "begin replaces in-progress reassembly");
                }
                let max_block_size = channel.config.max_block_size;
                channel.rx = Some(RxTransfer::begin(
                    packet.channel,
                    &packet.payload,
                    max_block_size,
                    now,
                ));
            }
            ServiceCode::Data => match state.channels[idx].rx.as_mut() {
                Some(rx) => rx.on_data(&packet, now),
                None => tracing::trace!(channel = idx, seq = packet.seq, "data before begin"),
            },
            ServiceCode::End => {
                let Some(rx) = state.channels[idx].rx.take() else {
                    tracing::trace!(channel = idx, "end without reassembly in progress");
                    return;
                };
                let (action, rest) = rx.on_end(&packet, now);
                state.channels[idx].rx = rest;
                match action {
                    RxAction::Continue => {}
                    RxAction::Nack(nack) => {
                        state.stats.packets_sent += 1;
                        self.transmit(peer, &nack);
                    }
                    RxAction::Deliver { ask, block } => {
                        state.stats.packets_sent += 1;
                        self.transmit(peer, &ask);
                        let channel = &mut state.channels[idx];
                        let delivered = if channel.rx_queue.len() >= channel.config.rx_queue_len {
                            tracing::error!(channel = idx, "rx queue full, block dropped");
                            false
                        } else {
                            channel.rx_queue.push_back(block);
                            channel.delivered.notify_one();
                            true
                        };
                        if delivered {
                            state.stats.blocks_delivered += 1;
                        } else {
                            state.stats.blocks_dropped += 1;
                        }
                    }
                }
            }
            ServiceCode::Ask => match state.channels[idx].tx.take() {
                Some(tx) => {
                    tx.complete();
                }
                None => tracing::trace!(channel = idx, "ask without transfer in flight"),
            },
            ServiceCode::Nack => {
                let resends = match state.channels[idx].tx.as_mut() {
                    Some(tx) => tx.on_nack(&packet.payload),
                    None => {
                        tracing::trace!(channel = idx, "nack without transfer in flight");
                        Vec::new()
                    }
                };
                state.stats.packets_sent += resends.len() as u64;
                state.stats.packets_resent += resends.len() as u64;
                for resend in &resends {
                    self.transmit(peer, resend);
                }
            }
        }
    }

    /// Advance every channel's transmit machine: dequeue new blocks, push
    /// unsent packets, and fire the ASK timeout.
    fn sweep(&self, now: Instant) {
        let mut state = self.lock();
        let peer = state.peer;
        for idx in 0..state.channels.len() {
            let mut outgoing: Vec<Packet> = Vec::new();
            let mut resent = 0u64;
            let mut aborted = false;

            {
                let channel = &mut state.channels[idx];
                if channel.tx.is_none() {
                    if let Some(block) = channel.tx_queue.pop_front() {
                        channel.tx_space.notify_one();
                        let (tx, begin) = TxTransfer::start(idx as u8, block, now);
                        outgoing.push(begin);
                        channel.tx = Some(tx);
                    }
                }
                if let Some(tx) = channel.tx.as_mut() {
                    match tx.check_timeout(now) {
                        TxTick::Waiting => {}
                        TxTick::Restarted(begin) => {
                            resent += 1;
                            outgoing.push(begin);
                        }
                        TxTick::Aborted => {
                            channel.tx = None;
                            aborted = true;
                        }
                    }
                }
                if let Some(tx) = channel.tx.as_mut() {
                    outgoing.extend(tx.pump(now));
                }
            }

            state.stats.packets_sent += outgoing.len() as u64;
            state.stats.packets_resent += resent;
            if aborted {
                state.stats.blocks_aborted += 1;
            }
            for packet in &outgoing {
                self.transmit(peer, packet);
            }
        }
    }
}

impl EngineHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state lock poisoned")
    }

    /// The sink the link's receive path feeds frames into.
    pub fn event_sink(&self) -> EventSink {
        EventSink::new(self.events.clone(), Arc::clone(&self.sink_dropped))
    }

    /// Queue a block for reliable transmission, waiting a bounded time for
    /// queue space. Rejections hand the buffer back inside the error.
    pub async fn submit_block(&self, channel: u8, block: Vec<u8>) -> Result<(), SubmitError> {
        if block.is_empty() {
            return Err(SubmitError::EmptyBlock);
        }

        let max = {
            let state = self.lock();
            match state.channels.get(channel as usize) {
                Some(ch) => ch.config.max_block_size,
                None => return Err(SubmitError::InvalidChannel { channel, block }),
            }
        };
        if block.len() > max {
            return Err(SubmitError::BlockTooLarge {
                len: block.len(),
                max,
                block,
            });
        }
        if block::total_packets(block.len()) > MAX_TOTAL_PACKETS as usize {
            return Err(SubmitError::BlockTooLarge {
                len: block.len(),
                max,
                block,
            });
        }

        let deadline = Instant::now() + SUBMIT_TIMEOUT;
        loop {
            let space = {
                let mut state = self.lock();
                let ch = &mut state.channels[channel as usize];
                if ch.tx_queue.len() < ch.config.tx_queue_len {
                    ch.tx_queue.push_back(block);
                    return Ok(());
                }
                Arc::clone(&ch.tx_space)
            };
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(channel, "tx queue full");
                return Err(SubmitError::QueueFull { channel, block });
            }
            let notified = space.notified();
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                tracing::warn!(channel, "tx queue full");
                return Err(SubmitError::QueueFull { channel, block });
            }
        }
    }

    /// Pull the next completed inbound block, waiting up to `timeout`.
    pub async fn receive_block(&self, channel: u8, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            let delivered = {
                let mut state = self.lock();
                let ch = state.channels.get_mut(channel as usize)?;
                if let Some(block) = ch.rx_queue.pop_front() {
                    return Some(block);
                }
                Arc::clone(&ch.delivered)
            };
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let _ = tokio::time::timeout(deadline - now, delivered.notified()).await;
        }
    }

    /// Pull the next completed inbound block without waiting.
    pub fn try_receive_block(&self, channel: u8) -> Option<Vec<u8>> {
        self.lock()
            .channels
            .get_mut(channel as usize)?
            .rx_queue
            .pop_front()
    }

    /// Discard all completed inbound blocks on a channel.
    pub fn clear_queue(&self, channel: u8) {
        let mut state = self.lock();
        if let Some(ch) = state.channels.get_mut(channel as usize) {
            let cleared = ch.rx_queue.len();
            ch.rx_queue.clear();
            if cleared > 0 {
                tracing::info!(channel, cleared, "rx queue cleared");
            }
        }
    }

    /// Point outbound frames at `peer`.
    pub fn set_peer(&self, peer: PeerAddr) {
        tracing::info!(%peer, "peer updated");
        self.lock().peer = peer;
    }

    pub fn peer(&self) -> PeerAddr {
        self.lock().peer
    }

    /// Whether any valid frame arrived recently.
    pub fn is_connected(&self) -> bool {
        self.lock()
            .last_heard
            .is_some_and(|at| at.elapsed() < CONNECT_TIMEOUT)
    }

    /// Transport counters snapshot.
    pub fn stats(&self) -> LinkStats {
        let mut stats = self.lock().stats;
        stats.frames_dropped = self.sink_dropped.load(Ordering::Relaxed);
        stats
    }

    /// Ask the engine task to exit.
    pub fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}
