//! Transmit half of a channel: one in-flight outbound block.
//!
//! [`TxTransfer`] owns the block buffer from dequeue until the receiver's
//! ASK (or retry exhaustion) and emits [`Packet`]s for the caller to put on
//! the link — the machine itself performs no I/O.

use std::time::Instant;

use airlink_core::{Packet, ServiceCode};

use super::block::{data_range, total_packets};
use super::constants::{ACK_TIMEOUT, MAX_RETRY};
use super::nack;

/// Outcome of a transmit-timeout check.
#[derive(Debug)]
pub enum TxTick {
    /// ASK still pending within the timeout window.
    Waiting,
    /// The whole block was restarted; the BEGIN to re-send.
    Restarted(Packet),
    /// Retries exhausted; the transfer is dead and must be discarded. The
    /// higher layer observes the loss as a request timeout.
    Aborted,
}

pub struct TxTransfer {
    channel: u8,
    buffer: Vec<u8>,
    total_packets: u16,
    sent_map: Vec<bool>,
    next_seq: u16,
    retry_count: u8,
    last_send_time: Instant,
}

impl TxTransfer {
    /// Begin transmitting `buffer`. Returns the machine and the opening
    /// BEGIN packet (already marked sent).
    pub fn start(channel: u8, buffer: Vec<u8>, now: Instant) -> (Self, Packet) {
        let total = total_packets(buffer.len()) as u16;
        let mut tx = TxTransfer {
            channel,
            total_packets: total,
            sent_map: vec![false; total as usize],
            next_seq: 0,
            retry_count: 0,
            last_send_time: now,
            buffer,
        };
        let begin = tx.begin_packet();
        tx.sent_map[0] = true;
        tx.next_seq = 1;
        tracing::debug!(
            channel,
            size = tx.buffer.len(),
            total = total,
            "tx: block transfer started"
        );
        (tx, begin)
    }

    fn begin_packet(&self) -> Packet {
        let size = (self.buffer.len() as u32).to_le_bytes();
        Packet::with_payload(self.channel, 0, ServiceCode::Begin, &size)
            .expect("size prefix is 4 bytes")
    }

    fn packet_for(&self, seq: u16) -> Packet {
        if seq == 0 {
            self.begin_packet()
        } else if seq == self.total_packets - 1 {
            Packet::new(self.channel, seq, ServiceCode::End)
        } else {
            let range = data_range(seq, self.buffer.len());
            Packet::with_payload(self.channel, seq, ServiceCode::Data, &self.buffer[range])
                .expect("slice is at most PAYLOAD_LEN bytes")
        }
    }

    /// Emit every not-yet-sent packet in sequence order, marking each and
    /// stamping the send clock.
    pub fn pump(&mut self, now: Instant) -> Vec<Packet> {
        let mut out = Vec::new();
        while self.next_seq < self.total_packets {
            let seq = self.next_seq;
            if !self.sent_map[seq as usize] {
                out.push(self.packet_for(seq));
                self.sent_map[seq as usize] = true;
                self.last_send_time = now;
            }
            self.next_seq += 1;
        }
        out
    }

    /// The receiver confirmed the whole block; the transfer is done.
    /// Returns the transmitted block size.
    pub fn complete(self) -> usize {
        tracing::debug!(
            channel = self.channel,
            size = self.buffer.len(),
            retries = self.retry_count,
            "tx: block acknowledged"
        );
        self.buffer.len()
    }

    /// Retransmit the sequences listed in a NACK payload. Leaves `next_seq`
    /// and the ASK timeout clock untouched.
    pub fn on_nack(&mut self, payload: &[u8]) -> Vec<Packet> {
        let missing = nack::parse(payload);
        tracing::debug!(
            channel = self.channel,
            count = missing.len(),
            "tx: retransmitting nacked packets"
        );
        missing
            .into_iter()
            .filter(|&seq| seq < self.total_packets)
            .map(|seq| self.packet_for(seq))
            .collect()
    }

    /// Check the ASK timeout. On expiry the machine restarts the whole block
    /// from BEGIN, or gives up after [`MAX_RETRY`] attempts.
    pub fn check_timeout(&mut self, now: Instant) -> TxTick {
        if now.duration_since(self.last_send_time) <= ACK_TIMEOUT {
            return TxTick::Waiting;
        }
        self.retry_count += 1;
        if self.retry_count >= MAX_RETRY {
            tracing::debug!(channel = self.channel, "tx: block send failed after max retries");
            return TxTick::Aborted;
        }
        tracing::debug!(
            channel = self.channel,
            retry = self.retry_count,
            "tx: re-sending entire block"
        );
        self.sent_map.fill(false);
        let begin = self.begin_packet();
        self.sent_map[0] = true;
        self.next_seq = 1;
        self.last_send_time = now;
        TxTick::Restarted(begin)
    }

    pub fn block_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn total_packets(&self) -> u16 {
        self.total_packets
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlink_core::constants::PAYLOAD_LEN;
    use std::time::Duration;

    fn collect_sequence(block: &[u8]) -> (TxTransfer, Vec<Packet>) {
        let now = Instant::now();
        let (mut tx, begin) = TxTransfer::start(2, block.to_vec(), now);
        let mut packets = vec![begin];
        packets.extend(tx.pump(now));
        (tx, packets)
    }

    #[test]
    fn ten_byte_block_is_three_packets() {
        let block: Vec<u8> = (0u8..10).collect();
        let (_tx, packets) = collect_sequence(&block);
        assert_eq!(packets.len(), 3);

        assert_eq!(packets[0].service_code, ServiceCode::Begin);
        assert_eq!(packets[0].seq, 0);
        assert_eq!(packets[0].payload_prefix(4), &10u32.to_le_bytes());

        assert_eq!(packets[1].service_code, ServiceCode::Data);
        assert_eq!(packets[1].seq, 1);
        assert_eq!(packets[1].payload_prefix(10), block.as_slice());
        // Remainder of the payload stays zero.
        assert!(packets[1].payload[10..].iter().all(|&b| b == 0));

        assert_eq!(packets[2].service_code, ServiceCode::End);
        assert_eq!(packets[2].seq, 2);
    }

    #[test]
    fn two_hundred_byte_block_is_four_packets() {
        let block: Vec<u8> = (0..200u16).map(|i| (i % 251) as u8).collect();
        let (_tx, packets) = collect_sequence(&block);
        assert_eq!(packets.len(), 4);
        assert_eq!(packets[1].payload_prefix(PAYLOAD_LEN), &block[..PAYLOAD_LEN]);
        assert_eq!(packets[2].payload_prefix(8), &block[PAYLOAD_LEN..]);
        assert_eq!(packets[3].service_code, ServiceCode::End);
        assert_eq!(packets[3].seq, 3);
    }

    #[test]
    fn pump_is_idempotent_until_restart() {
        let now = Instant::now();
        let (mut tx, _begin) = TxTransfer::start(0, vec![1, 2, 3], now);
        assert_eq!(tx.pump(now).len(), 2);
        assert!(tx.pump(now).is_empty());
    }

    #[test]
    fn nack_retransmits_listed_sequences_only() {
        let block: Vec<u8> = (0..200u16).map(|i| i as u8).collect();
        let (mut tx, _packets) = collect_sequence(&block);

        let payload = nack::encode([2u16]);
        let resent = tx.on_nack(&payload);
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].service_code, ServiceCode::Data);
        assert_eq!(resent[0].seq, 2);
        assert_eq!(resent[0].payload_prefix(8), &block[PAYLOAD_LEN..]);
    }

    #[test]
    fn nack_for_begin_and_end_uses_right_service_codes() {
        let (mut tx, _packets) = collect_sequence(&[0xAB; 10]);
        let payload = nack::encode([0u16, 2]);
        let resent = tx.on_nack(&payload);
        assert_eq!(resent.len(), 2);
        assert_eq!(resent[0].service_code, ServiceCode::Begin);
        assert_eq!(resent[1].service_code, ServiceCode::End);
    }

    #[test]
    fn nack_ignores_out_of_range_sequences() {
        let (mut tx, _packets) = collect_sequence(&[1, 2, 3]);
        let payload = nack::encode([9u16]);
        assert!(tx.on_nack(&payload).is_empty());
    }

    #[test]
    fn nack_does_not_touch_timeout_clock() {
        let now = Instant::now();
        let (mut tx, _begin) = TxTransfer::start(0, vec![7; 30], now);
        tx.pump(now);
        tx.on_nack(&nack::encode([1u16]));
        // Clock unchanged: 150 ms after the pump the timeout still fires.
        let later = now + Duration::from_millis(150);
        assert!(matches!(tx.check_timeout(later), TxTick::Restarted(_)));
    }

    #[test]
    fn timeout_restarts_from_begin_and_repumps_all() {
        let now = Instant::now();
        let (mut tx, _begin) = TxTransfer::start(1, vec![9; 300], now);
        tx.pump(now);

        let later = now + Duration::from_millis(150);
        let tick = tx.check_timeout(later);
        let begin = match tick {
            TxTick::Restarted(p) => p,
            other => panic!("expected restart, got {other:?}"),
        };
        assert_eq!(begin.service_code, ServiceCode::Begin);
        assert_eq!(tx.retry_count(), 1);

        // All non-BEGIN packets are pending again.
        let repumped = tx.pump(later);
        assert_eq!(repumped.len(), tx.total_packets() as usize - 1);
    }

    #[test]
    fn within_timeout_window_keeps_waiting() {
        let now = Instant::now();
        let (mut tx, _begin) = TxTransfer::start(1, vec![9; 10], now);
        tx.pump(now);
        assert!(matches!(
            tx.check_timeout(now + Duration::from_millis(50)),
            TxTick::Waiting
        ));
        assert_eq!(tx.retry_count(), 0);
    }

    #[test]
    fn aborts_after_max_retries() {
        let now = Instant::now();
        let (mut tx, _begin) = TxTransfer::start(1, vec![9; 10], now);

        let mut at = now;
        for retry in 1..MAX_RETRY {
            at += Duration::from_millis(150);
            assert!(matches!(tx.check_timeout(at), TxTick::Restarted(_)));
            assert_eq!(tx.retry_count(), retry);
        }
        at += Duration::from_millis(150);
        assert!(matches!(tx.check_timeout(at), TxTick::Aborted));
    }

    #[test]
    fn complete_returns_block_len() {
        let now = Instant::now();
        let (tx, _begin) = TxTransfer::start(1, vec![9; 42], now);
        assert_eq!(tx.complete(), 42);
    }
}
