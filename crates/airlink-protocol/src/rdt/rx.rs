//! Receive half of a channel: reassembly of one in-flight inbound block.
//!
//! [`RxTransfer`] owns the reassembly buffer from BEGIN until the block
//! completes, at which point ownership moves to the caller along with the
//! ASK to send. Incomplete END rounds produce a NACK instead.

use std::time::Instant;

use airlink_core::constants::PAYLOAD_LEN;
use airlink_core::{Packet, ServiceCode};

use super::block::{data_range, total_packets};
use super::nack;

/// What the caller must do after feeding an END packet to the machine.
#[derive(Debug)]
pub enum RxAction {
    /// END was invalid or did not close the round; keep reassembling.
    Continue,
    /// Block complete: send the ASK and hand the buffer to the consumer.
    Deliver { ask: Packet, block: Vec<u8> },
    /// END arrived with gaps: send the NACK listing missing sequences.
    Nack(Packet),
}

pub struct RxTransfer {
    channel: u8,
    total_size: usize,
    total_packets: u16,
    buffer: Vec<u8>,
    received_map: Vec<bool>,
    packets_received: u16,
    last_packet_time: Instant,
}

impl RxTransfer {
    /// Open reassembly from a BEGIN payload. A declared size of zero or one
    /// beyond `max_block_size` clamps to `max_block_size`.
    pub fn begin(
        channel: u8,
        payload: &[u8; PAYLOAD_LEN],
        max_block_size: usize,
        now: Instant,
    ) -> Self {
        let declared =
            u32::from_le_bytes(payload[..4].try_into().expect("size prefix is 4 bytes")) as usize;
        let total_size = if declared == 0 || declared > max_block_size {
            max_block_size
        } else {
            declared
        };
        let total = total_packets(total_size) as u16;

        tracing::debug!(channel, declared, size = total_size, total, "rx: block transfer opened");

        let mut rx = RxTransfer {
            channel,
            total_size,
            total_packets: total,
            buffer: vec![0u8; total_size],
            received_map: vec![false; total as usize],
            packets_received: 0,
            last_packet_time: now,
        };
        rx.received_map[0] = true;
        rx.packets_received = 1;
        rx
    }

    /// Absorb a DATA packet. Duplicates and out-of-range sequences are no-ops.
    pub fn on_data(&mut self, packet: &Packet, now: Instant) {
        self.last_packet_time = now;
        let seq = packet.seq;
        if seq == 0 || seq >= self.total_packets - 1 {
            tracing::trace!(channel = self.channel, seq, "rx: data seq out of range");
            return;
        }
        if self.received_map[seq as usize] {
            return;
        }
        self.received_map[seq as usize] = true;
        self.packets_received += 1;

        let range = data_range(seq, self.total_size);
        let len = range.len();
        self.buffer[range].copy_from_slice(&packet.payload[..len]);
    }

    /// Absorb an END packet. Returns the resulting action and, unless the
    /// block completed, the machine itself to keep reassembling with.
    pub fn on_end(mut self, packet: &Packet, now: Instant) -> (RxAction, Option<Self>) {
        self.last_packet_time = now;
        if packet.seq != self.total_packets - 1 {
            tracing::trace!(
                channel = self.channel,
                seq = packet.seq,
                expected = self.total_packets - 1,
                "rx: end seq mismatch"
            );
            return (RxAction::Continue, Some(self));
        }

        if !self.received_map[packet.seq as usize] {
            self.received_map[packet.seq as usize] = true;
            self.packets_received += 1;
        }

        if self.packets_received == self.total_packets {
            let ask = Packet::new(self.channel, 0, ServiceCode::Ask);
            tracing::debug!(
                channel = self.channel,
                size = self.total_size,
                "rx: block complete"
            );
            (
                RxAction::Deliver {
                    ask,
                    block: self.buffer,
                },
                None,
            )
        } else {
            let missing = self.missing_seqs();
            tracing::debug!(
                channel = self.channel,
                missing = missing.len(),
                "rx: block incomplete, nacking"
            );
            let payload = nack::encode(missing);
            let packet =
                Packet::with_payload(self.channel, 0, ServiceCode::Nack, &payload)
                    .expect("nack payload is capped to PAYLOAD_LEN");
            (RxAction::Nack(packet), Some(self))
        }
    }

    fn missing_seqs(&self) -> Vec<u16> {
        self.received_map
            .iter()
            .enumerate()
            .filter(|(_, &received)| !received)
            .map(|(seq, _)| seq as u16)
            .collect()
    }

    pub fn packets_received(&self) -> u16 {
        self.packets_received
    }

    /// How many map slots are marked received. Always equal to
    /// [`Self::packets_received`].
    pub fn marked_count(&self) -> u16 {
        self.received_map.iter().filter(|&&r| r).count() as u16
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn last_activity(&self) -> Instant {
        self.last_packet_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begin_payload(size: u32) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..4].copy_from_slice(&size.to_le_bytes());
        payload
    }

    fn data_packet(channel: u8, seq: u16, data: &[u8]) -> Packet {
        Packet::with_payload(channel, seq, ServiceCode::Data, data).unwrap()
    }

    #[test]
    fn reassembles_small_block() {
        let now = Instant::now();
        let block: Vec<u8> = (0u8..10).collect();
        let mut rx = RxTransfer::begin(2, &begin_payload(10), 512, now);
        assert_eq!(rx.packets_received(), 1);
        assert_eq!(rx.marked_count(), rx.packets_received());

        rx.on_data(&data_packet(2, 1, &block), now);
        assert_eq!(rx.packets_received(), 2);
        assert_eq!(rx.marked_count(), rx.packets_received());

        let end = Packet::new(2, 2, ServiceCode::End);
        let (action, rest) = rx.on_end(&end, now);
        assert!(rest.is_none());
        match action {
            RxAction::Deliver { ask, block: delivered } => {
                assert_eq!(ask.service_code, ServiceCode::Ask);
                assert_eq!(ask.channel, 2);
                assert_eq!(delivered, block);
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_data_is_idempotent() {
        let now = Instant::now();
        let mut rx = RxTransfer::begin(0, &begin_payload(10), 512, now);
        let packet = data_packet(0, 1, &[1, 2, 3]);
        rx.on_data(&packet, now);
        rx.on_data(&packet, now);
        assert_eq!(rx.packets_received(), 2);
        assert_eq!(rx.marked_count(), 2);
    }

    #[test]
    fn out_of_range_data_ignored() {
        let now = Instant::now();
        // 10-byte block: total_packets = 3, valid DATA seq is only 1.
        let mut rx = RxTransfer::begin(0, &begin_payload(10), 512, now);
        rx.on_data(&data_packet(0, 0, &[1]), now);
        rx.on_data(&data_packet(0, 2, &[1]), now);
        rx.on_data(&data_packet(0, 9, &[1]), now);
        assert_eq!(rx.packets_received(), 1);
    }

    #[test]
    fn end_with_wrong_seq_ignored() {
        let now = Instant::now();
        let rx = RxTransfer::begin(0, &begin_payload(10), 512, now);
        let bad_end = Packet::new(0, 1, ServiceCode::End);
        let (action, rest) = rx.on_end(&bad_end, now);
        assert!(matches!(action, RxAction::Continue));
        assert!(rest.is_some());
    }

    #[test]
    fn incomplete_end_produces_nack_with_missing_list() {
        let now = Instant::now();
        // 200-byte block: seqs 0..=3, DATA at 1 and 2.
        let mut rx = RxTransfer::begin(2, &begin_payload(200), 512, now);
        rx.on_data(&data_packet(2, 1, &[0xAA; PAYLOAD_LEN]), now);
        // seq 2 dropped.
        let end = Packet::new(2, 3, ServiceCode::End);
        let (action, rest) = rx.on_end(&end, now);
        let rx = rest.expect("still receiving");
        match action {
            RxAction::Nack(packet) => {
                assert_eq!(packet.service_code, ServiceCode::Nack);
                assert_eq!(packet.payload_prefix(4), &[0x02, 0x00, 0xFF, 0xFF]);
            }
            other => panic!("expected nack, got {other:?}"),
        }

        // Retransmitted seq 2 plus a fresh END completes the block.
        let mut rx = rx;
        rx.on_data(&data_packet(2, 2, &[0xBB; 8]), now);
        let (action, rest) = rx.on_end(&end, now);
        assert!(rest.is_none());
        match action {
            RxAction::Deliver { block, .. } => {
                assert_eq!(&block[..PAYLOAD_LEN], &[0xAA; PAYLOAD_LEN]);
                assert_eq!(&block[PAYLOAD_LEN..], &[0xBB; 8]);
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_end_after_nack_repeats_nack() {
        let now = Instant::now();
        let rx = RxTransfer::begin(0, &begin_payload(200), 512, now);
        let end = Packet::new(0, 3, ServiceCode::End);
        let (first, rest) = rx.on_end(&end, now);
        assert!(matches!(first, RxAction::Nack(_)));
        let (second, rest) = rest.unwrap().on_end(&end, now);
        assert!(matches!(second, RxAction::Nack(_)));
        assert!(rest.is_some());
    }

    #[test]
    fn declared_size_zero_clamps_to_max() {
        let now = Instant::now();
        let rx = RxTransfer::begin(0, &begin_payload(0), 512, now);
        assert_eq!(rx.total_size(), 512);
    }

    #[test]
    fn declared_size_over_max_clamps_to_max() {
        let now = Instant::now();
        let rx = RxTransfer::begin(0, &begin_payload(100_000), 512, now);
        assert_eq!(rx.total_size(), 512);
    }

    #[test]
    fn tail_copy_is_clipped_to_block_size() {
        let now = Instant::now();
        // 200-byte block: second DATA carries 8 real bytes; the packet
        // payload is still 192 bytes of which only 8 may land.
        let mut rx = RxTransfer::begin(0, &begin_payload(200), 512, now);
        rx.on_data(&data_packet(0, 1, &[0x11; PAYLOAD_LEN]), now);
        rx.on_data(&data_packet(0, 2, &[0x22; PAYLOAD_LEN]), now);
        let end = Packet::new(0, 3, ServiceCode::End);
        let (action, _) = rx.on_end(&end, now);
        match action {
            RxAction::Deliver { block, .. } => {
                assert_eq!(block.len(), 200);
                assert!(block[PAYLOAD_LEN..].iter().all(|&b| b == 0x22));
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn last_activity_advances() {
        let now = Instant::now();
        let mut rx = RxTransfer::begin(0, &begin_payload(200), 512, now);
        let later = now + std::time::Duration::from_millis(10);
        rx.on_data(&data_packet(0, 1, &[1]), later);
        assert_eq!(rx.last_activity(), later);
    }
}
