//! Pairing handshake: system-channel frame codec and the session machine.
//!
//! Two devices mutually learn each other's link address, or neither does.
//! Each side broadcasts `PAIRING_MAC` with its own address; a side that
//! hears one stores the sender as its candidate and answers `PAIRING_DONE`;
//! a side that hears `PAIRING_DONE` is confirmed, echoes one final
//! `PAIRING_DONE` so the slower side confirms too, and finalizes. A session
//! that expires unconfirmed reverts, leaving no stored peer behind.
//!
//! The machine is pure: the caller feeds messages and clock ticks and
//! enacts the returned [`PairingAction`]s in order.

use std::time::{Duration, Instant};

use airlink_core::constants::CHANNEL_SYSTEM;
use airlink_core::PeerAddr;

use crate::error::SystemError;

/// Wire size of a system frame: `message_type(1) || peer_addr(6) || channel(1)`.
pub const SYSTEM_HEADER_LEN: usize = 8;

/// How long a pairing session keeps trying before reverting.
pub const PAIR_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between `PAIRING_MAC` broadcasts.
pub const PAIR_BROADCAST_INTERVAL: Duration = Duration::from_secs(1);

const MSG_PAIRING_MAC: u8 = 1;
const MSG_PAIRING_DONE: u8 = 2;

/// A pairing message on the system channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMessage {
    /// "Here is my address" broadcast.
    Mac(PeerAddr),
    /// "I stored you as my candidate" confirmation.
    Done(PeerAddr),
}

impl PairingMessage {
    pub fn encode(&self) -> Vec<u8> {
        let (message_type, addr) = match self {
            PairingMessage::Mac(addr) => (MSG_PAIRING_MAC, addr),
            PairingMessage::Done(addr) => (MSG_PAIRING_DONE, addr),
        };
        let mut buf = Vec::with_capacity(SYSTEM_HEADER_LEN);
        buf.push(message_type);
        buf.extend_from_slice(addr.as_bytes());
        buf.push(CHANNEL_SYSTEM);
        buf
    }

    pub fn decode(block: &[u8]) -> Result<Self, SystemError> {
        if block.len() < SYSTEM_HEADER_LEN {
            return Err(SystemError::FrameTooShort {
                actual: block.len(),
                min: SYSTEM_HEADER_LEN,
            });
        }
        let addr = PeerAddr::from_slice(&block[1..7]).expect("slice is exactly 6 bytes");
        match block[0] {
            MSG_PAIRING_MAC => Ok(PairingMessage::Mac(addr)),
            MSG_PAIRING_DONE => Ok(PairingMessage::Done(addr)),
            other => Err(SystemError::UnknownMessageType(other)),
        }
    }
}

/// Externally observable pairing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    Unpaired,
    Active,
    Paired,
}

/// What the driver must do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingAction {
    /// Broadcast our `PAIRING_MAC`.
    SendMac,
    /// Answer with `PAIRING_DONE`.
    SendDone,
    /// Mutual confirmation reached: commit this peer and become Paired.
    Finalize(PeerAddr),
    /// Session expired unconfirmed: clear stored state and become Unpaired.
    Revert,
}

/// One pairing attempt. Candidate choice is first-wins: a second, different
/// address seen during the session never replaces the first.
pub struct PairingSession {
    own_addr: PeerAddr,
    started: Instant,
    timeout: Duration,
    last_broadcast: Option<Instant>,
    candidate: Option<PeerAddr>,
    confirmed: bool,
}

impl PairingSession {
    pub fn new(own_addr: PeerAddr, now: Instant) -> Self {
        Self::with_timeout(own_addr, now, PAIR_TIMEOUT)
    }

    /// A session with a non-default deadline.
    pub fn with_timeout(own_addr: PeerAddr, now: Instant, timeout: Duration) -> Self {
        tracing::info!(addr = %own_addr, "pairing session started");
        PairingSession {
            own_addr,
            started: now,
            timeout,
            last_broadcast: None,
            candidate: None,
            confirmed: false,
        }
    }

    pub fn candidate(&self) -> Option<PeerAddr> {
        self.candidate
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Drive the timers: periodic MAC broadcast and the session deadline.
    pub fn poll(&mut self, now: Instant) -> Option<PairingAction> {
        if now.duration_since(self.started) >= self.timeout {
            tracing::warn!("pairing timed out without confirmation");
            return Some(PairingAction::Revert);
        }
        let due = self
            .last_broadcast
            .is_none_or(|at| now.duration_since(at) >= PAIR_BROADCAST_INTERVAL);
        if due {
            self.last_broadcast = Some(now);
            return Some(PairingAction::SendMac);
        }
        None
    }

    /// Feed a received pairing message. Enact the returned actions in order.
    pub fn on_message(&mut self, message: PairingMessage) -> Vec<PairingAction> {
        match message {
            PairingMessage::Mac(peer) => {
                if peer.is_zero() {
                    tracing::warn!("ignoring pairing mac with zero address");
                    return Vec::new();
                }
                match self.candidate {
                    None => {
                        tracing::info!(peer = %peer, "pairing candidate stored");
                        self.candidate = Some(peer);
                        vec![PairingAction::SendDone]
                    }
                    Some(existing) if existing == peer => vec![PairingAction::SendDone],
                    Some(existing) => {
                        tracing::warn!(
                            candidate = %existing,
                            other = %peer,
                            "second pairing candidate ignored"
                        );
                        Vec::new()
                    }
                }
            }
            PairingMessage::Done(peer) => {
                if peer.is_zero() {
                    tracing::warn!("ignoring pairing done with zero address");
                    return Vec::new();
                }
                match self.candidate {
                    None => self.candidate = Some(peer),
                    Some(existing) if existing != peer => {
                        tracing::warn!(
                            candidate = %existing,
                            other = %peer,
                            "pairing done from non-candidate ignored"
                        );
                        return Vec::new();
                    }
                    Some(_) => {}
                }
                if self.confirmed {
                    return Vec::new();
                }
                self.confirmed = true;
                let peer = self.candidate.expect("candidate set above");
                tracing::info!(peer = %peer, own = %self.own_addr, "pairing confirmed");
                // Echo one final DONE so a peer whose session started later
                // also reaches confirmation before we stop listening.
                vec![PairingAction::SendDone, PairingAction::Finalize(peer)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PeerAddr = PeerAddr::new([0x11; 6]);
    const B: PeerAddr = PeerAddr::new([0x22; 6]);
    const C: PeerAddr = PeerAddr::new([0x33; 6]);

    #[test]
    fn message_roundtrip() {
        for message in [PairingMessage::Mac(A), PairingMessage::Done(B)] {
            let encoded = message.encode();
            assert_eq!(encoded.len(), SYSTEM_HEADER_LEN);
            assert_eq!(PairingMessage::decode(&encoded).unwrap(), message);
        }
    }

    #[test]
    fn decode_rejects_short_and_unknown() {
        assert!(matches!(
            PairingMessage::decode(&[1, 2, 3]),
            Err(SystemError::FrameTooShort { .. })
        ));
        let mut raw = PairingMessage::Mac(A).encode();
        raw[0] = 9;
        assert!(matches!(
            PairingMessage::decode(&raw),
            Err(SystemError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn broadcasts_once_per_interval() {
        let now = Instant::now();
        let mut session = PairingSession::new(A, now);
        assert_eq!(session.poll(now), Some(PairingAction::SendMac));
        assert_eq!(session.poll(now + Duration::from_millis(500)), None);
        assert_eq!(
            session.poll(now + Duration::from_millis(1100)),
            Some(PairingAction::SendMac)
        );
    }

    #[test]
    fn mutual_confirmation_finalizes() {
        let now = Instant::now();
        // A hears B's MAC, stores it, answers DONE.
        let mut session = PairingSession::new(A, now);
        assert_eq!(
            session.on_message(PairingMessage::Mac(B)),
            vec![PairingAction::SendDone]
        );
        assert_eq!(session.candidate(), Some(B));
        assert!(!session.is_confirmed());

        // A hears B's DONE: confirmed, echo DONE, finalize with B.
        assert_eq!(
            session.on_message(PairingMessage::Done(B)),
            vec![PairingAction::SendDone, PairingAction::Finalize(B)]
        );
        assert!(session.is_confirmed());
    }

    #[test]
    fn done_without_prior_mac_adopts_sender() {
        let now = Instant::now();
        let mut session = PairingSession::new(A, now);
        assert_eq!(
            session.on_message(PairingMessage::Done(B)),
            vec![PairingAction::SendDone, PairingAction::Finalize(B)]
        );
    }

    #[test]
    fn repeated_mac_answers_done_again() {
        let now = Instant::now();
        let mut session = PairingSession::new(A, now);
        session.on_message(PairingMessage::Mac(B));
        assert_eq!(
            session.on_message(PairingMessage::Mac(B)),
            vec![PairingAction::SendDone]
        );
    }

    #[test]
    fn second_candidate_is_ignored() {
        let now = Instant::now();
        let mut session = PairingSession::new(A, now);
        session.on_message(PairingMessage::Mac(B));
        assert!(session.on_message(PairingMessage::Mac(C)).is_empty());
        assert_eq!(session.candidate(), Some(B));

        // DONE from the third device does not confirm either.
        assert!(session.on_message(PairingMessage::Done(C)).is_empty());
        assert!(!session.is_confirmed());
    }

    #[test]
    fn zero_address_rejected_everywhere() {
        let now = Instant::now();
        let mut session = PairingSession::new(A, now);
        assert!(session.on_message(PairingMessage::Mac(PeerAddr::ZERO)).is_empty());
        assert!(session.on_message(PairingMessage::Done(PeerAddr::ZERO)).is_empty());
        assert_eq!(session.candidate(), None);
    }

    #[test]
    fn duplicate_done_finalizes_once() {
        let now = Instant::now();
        let mut session = PairingSession::new(A, now);
        session.on_message(PairingMessage::Mac(B));
        assert!(session
            .on_message(PairingMessage::Done(B))
            .contains(&PairingAction::Finalize(B)));
        assert!(session.on_message(PairingMessage::Done(B)).is_empty());
    }

    #[test]
    fn timeout_reverts() {
        let now = Instant::now();
        let mut session = PairingSession::new(A, now);
        session.on_message(PairingMessage::Mac(B));
        assert_eq!(
            session.poll(now + PAIR_TIMEOUT),
            Some(PairingAction::Revert)
        );
    }

    #[test]
    fn custom_timeout_is_honored() {
        let now = Instant::now();
        let mut session = PairingSession::with_timeout(A, now, Duration::from_millis(100));
        session.poll(now);
        assert_eq!(
            session.poll(now + Duration::from_millis(100)),
            Some(PairingAction::Revert)
        );
    }
}
