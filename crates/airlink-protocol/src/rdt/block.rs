//! Block segmentation math.

use std::ops::Range;

use airlink_core::constants::PAYLOAD_LEN;

/// Packets needed for a block: one DATA per [`PAYLOAD_LEN`] slice plus
/// BEGIN and END.
pub fn total_packets(block_size: usize) -> usize {
    block_size.div_ceil(PAYLOAD_LEN) + 2
}

/// Byte range of the block carried by DATA sequence `seq` (data sequences
/// start at 1; sequence 0 is BEGIN). An offset past the end of the block
/// yields an empty range.
pub fn data_range(seq: u16, block_size: usize) -> Range<usize> {
    let offset = (seq as usize).saturating_sub(1) * PAYLOAD_LEN;
    let start = offset.min(block_size);
    let end = (offset + PAYLOAD_LEN).min(block_size);
    start..end.max(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_byte_block_needs_three_packets() {
        assert_eq!(total_packets(1), 3);
    }

    #[test]
    fn exact_payload_block_needs_three_packets() {
        assert_eq!(total_packets(PAYLOAD_LEN), 3);
    }

    #[test]
    fn one_over_payload_needs_four_packets() {
        assert_eq!(total_packets(PAYLOAD_LEN + 1), 4);
    }

    #[test]
    fn two_full_payloads_need_four_packets() {
        assert_eq!(total_packets(2 * PAYLOAD_LEN), 4);
    }

    #[test]
    fn data_range_first_segment() {
        assert_eq!(data_range(1, 10), 0..10);
        assert_eq!(data_range(1, 500), 0..PAYLOAD_LEN);
    }

    #[test]
    fn data_range_tail_segment() {
        assert_eq!(data_range(2, 200), 192..200);
    }

    #[test]
    fn data_range_past_end_is_empty() {
        let r = data_range(5, 200);
        assert!(r.is_empty());
        assert_eq!(r.start, 200);
    }

    #[test]
    fn data_ranges_tile_the_block() {
        let size = 3 * PAYLOAD_LEN + 17;
        let total = total_packets(size) as u16;
        let mut covered = 0;
        for seq in 1..total - 1 {
            let r = data_range(seq, size);
            assert_eq!(r.start, covered);
            covered = r.end;
        }
        assert_eq!(covered, size);
    }
}
