//! Section payload preparation and block planning.

use crate::protocol::constants::ERASED_FILL;

/// Strip trailing erased-flash bytes; nothing else is touched.
pub fn trim_trailing(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|&b| b != ERASED_FILL)
        .map_or(0, |i| i + 1);
    &data[..end]
}

/// One planned block of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Flash address of the first payload byte.
    pub address: u32,
    /// Offset of the payload inside the section image.
    pub offset: usize,
    pub len: usize,
}

/// Splits a section payload into blocks of at most `max_block` bytes.
///
/// Addresses increase monotonically from `base` and cover the payload
/// contiguously.
#[derive(Debug, Clone)]
pub struct BlockIterator {
    base: u32,
    total: usize,
    max_block: usize,
    offset: usize,
}

impl BlockIterator {
    /// `max_block` must be non-zero.
    pub fn new(base: u32, total: usize, max_block: usize) -> Self {
        Self {
            base,
            total,
            max_block: max_block.max(1),
            offset: 0,
        }
    }

    /// Number of blocks in the whole plan.
    pub fn block_count(&self) -> usize {
        self.total.div_ceil(self.max_block)
    }

    /// Bytes not yet handed out.
    pub fn remaining(&self) -> usize {
        self.total - self.offset
    }
}

impl Iterator for BlockIterator {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.total {
            return None;
        }
        let len = self.remaining().min(self.max_block);
        let block = BlockInfo {
            address: self.base.wrapping_add(self.offset as u32),
            offset: self.offset,
            len,
        };
        self.offset += len;
        Some(block)
    }
}

/// Wrapping sum of the little-endian 16-bit words of `data`.
///
/// An odd trailing byte counts as the low byte of a final word.
pub fn elan_checksum(data: &[u8]) -> u16 {
    data.chunks(2).fold(0u16, |sum, word| {
        let value = match word {
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            [lo] => *lo as u16,
            _ => 0,
        };
        sum.wrapping_add(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_trailing() {
        let mut data = vec![0x11u8; 250];
        data.extend_from_slice(&[0xFF; 50]);
        assert_eq!(trim_trailing(&data).len(), 250);

        // Interior fill bytes are kept
        let data = [0xFF, 0x00, 0xFF, 0xFF];
        assert_eq!(trim_trailing(&data), &[0xFF, 0x00]);

        assert!(trim_trailing(&[0xFF; 64]).is_empty());
        assert!(trim_trailing(&[]).is_empty());
    }

    #[test]
    fn test_block_plan_example() {
        let mut data = vec![0xA5u8; 250];
        data.extend_from_slice(&[0xFF; 50]);
        let payload = trim_trailing(&data);

        let blocks: Vec<_> = BlockIterator::new(0x1000, payload.len(), 128).collect();
        assert_eq!(
            blocks,
            vec![
                BlockInfo {
                    address: 0x1000,
                    offset: 0,
                    len: 128
                },
                BlockInfo {
                    address: 0x1080,
                    offset: 128,
                    len: 122
                },
            ]
        );
    }

    #[test]
    fn test_block_count_and_reconstruction() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        for max in [1, 7, 64, 128, 999, 1000, 4096] {
            let iter = BlockIterator::new(0, data.len(), max);
            assert_eq!(iter.block_count(), data.len().div_ceil(max));

            let blocks: Vec<_> = iter.collect();
            assert_eq!(blocks.len(), data.len().div_ceil(max));
            assert!(blocks.iter().all(|b| b.len <= max && b.len > 0));

            let rebuilt: Vec<u8> = blocks
                .iter()
                .flat_map(|b| data[b.offset..b.offset + b.len].iter().copied())
                .collect();
            assert_eq!(rebuilt, data);
        }
    }

    #[test]
    fn test_empty_payload_has_no_blocks() {
        let mut iter = BlockIterator::new(0x2000, 0, 128);
        assert_eq!(iter.block_count(), 0);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_elan_checksum() {
        assert_eq!(elan_checksum(&[0x01, 0x02, 0x03, 0x04]), 0x0201 + 0x0403);
        assert_eq!(elan_checksum(&[0xFF, 0xFF, 0x02, 0x00]), 0x0001);
        assert_eq!(elan_checksum(&[]), 0);
    }
}
