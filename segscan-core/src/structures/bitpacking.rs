//! Fixed-width bit packing for dictionary ids
//!
//! Values are packed LSB-first: value `i` occupies bits
//! `[i * bits, (i + 1) * bits)` of the little-endian bit stream. A width of
//! zero encodes a column where every value is `0` (cardinality ≤ 1) and takes
//! no bytes at all.

use crate::directories::OwnedBytes;
use crate::{Error, Result};

/// Widest supported value: dictionary ids are `u32`.
pub const MAX_BITS_PER_VALUE: u8 = 32;

/// Minimum number of bits needed to represent `max_val`.
#[inline]
pub fn bits_needed(max_val: u32) -> u8 {
    if max_val == 0 {
        0
    } else {
        32 - max_val.leading_zeros() as u8
    }
}

/// Bits per element for a column with `cardinality` distinct values
/// (enough to hold the largest id, `cardinality - 1`).
#[inline]
pub fn bits_for_cardinality(cardinality: u32) -> u8 {
    bits_needed(cardinality.saturating_sub(1))
}

/// Number of bytes occupied by `count` packed values.
#[inline]
pub fn packed_len(count: usize, bits_per_value: u8) -> usize {
    (count * bits_per_value as usize).div_ceil(8)
}

/// Append `values` packed at `bits_per_value` bits each to `out`.
///
/// Values wider than `bits_per_value` are truncated to their low bits.
pub fn bitpack_write(values: &[u32], bits_per_value: u8, out: &mut Vec<u8>) {
    if bits_per_value == 0 {
        return;
    }
    let bpv = bits_per_value as usize;
    let start = out.len();
    out.resize(start + packed_len(values.len(), bits_per_value), 0);
    let buf = &mut out[start..];

    for (i, &val) in values.iter().enumerate() {
        let bit_offset = i * bpv;
        let mut bo = bit_offset / 8;
        let mut bs = bit_offset % 8;
        let mut remaining_bits = bpv;
        let mut v = val as u64;

        while remaining_bits > 0 {
            let can_write = (8 - bs).min(remaining_bits);
            let mask = (1u64 << can_write) - 1;
            buf[bo] |= ((v & mask) << bs) as u8;
            v >>= can_write;
            remaining_bits -= can_write;
            bo += 1;
            bs = 0;
        }
    }
}

/// Read the value at `index` from packed `data`.
///
/// Reads a single unaligned LE u64 when 8 bytes are available; a value is at
/// most 32 bits wide and starts within the first byte, so it always fits.
#[inline]
pub fn bitpack_read(data: &[u8], bits_per_value: u8, index: usize) -> u32 {
    if bits_per_value == 0 {
        return 0;
    }
    let bpv = bits_per_value as usize;
    let bit_offset = index * bpv;
    let byte_offset = bit_offset / 8;
    let bit_shift = bit_offset % 8;
    let mask = (1u64 << bpv) - 1;

    if let Some(window) = data.get(byte_offset..byte_offset + 8) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(window);
        return ((u64::from_le_bytes(raw) >> bit_shift) & mask) as u32;
    }

    // Tail of the buffer
    let mut result: u64 = 0;
    let mut remaining_bits = bpv;
    let mut bo = byte_offset;
    let mut bs = bit_shift;
    let mut out_shift = 0;

    while remaining_bits > 0 {
        let can_read = (8 - bs).min(remaining_bits);
        let byte_mask = ((1u16 << can_read) - 1) as u8;
        let byte_val = data.get(bo).copied().unwrap_or(0);
        result |= (((byte_val >> bs) & byte_mask) as u64) << out_shift;
        remaining_bits -= can_read;
        out_shift += can_read;
        bo += 1;
        bs = 0;
    }

    result as u32
}

/// Random access to a run of packed values.
///
/// Agnostic to whether `data` lives on the heap or in a memory map.
#[derive(Debug, Clone)]
pub struct PackedBits {
    data: OwnedBytes,
    bits_per_value: u8,
    len: usize,
}

impl PackedBits {
    /// Wrap `len` values of `bits_per_value` bits stored at the start of `data`.
    pub fn open(data: OwnedBytes, bits_per_value: u8, len: usize) -> Result<Self> {
        if bits_per_value > MAX_BITS_PER_VALUE {
            return Err(Error::corrupt(format!(
                "bits per value {} exceeds {}",
                bits_per_value, MAX_BITS_PER_VALUE
            )));
        }
        let needed = packed_len(len, bits_per_value);
        if data.len() < needed {
            return Err(Error::corrupt(format!(
                "packed region holds {} bytes, {} values at {} bits need {}",
                data.len(),
                len,
                bits_per_value,
                needed
            )));
        }
        Ok(Self {
            data: data.slice(0..needed),
            bits_per_value,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits_per_value(&self) -> u8 {
        self.bits_per_value
    }

    /// Value at `index`. The caller guarantees `index < len`.
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        debug_assert!(index < self.len);
        bitpack_read(self.data.as_slice(), self.bits_per_value, index)
    }

    /// Append values `[start, start + count)` to `out`.
    pub fn read_range_into(&self, start: usize, count: usize, out: &mut Vec<u32>) {
        debug_assert!(start + count <= self.len);
        out.reserve(count);
        let data = self.data.as_slice();
        for index in start..start + count {
            out.push(bitpack_read(data, self.bits_per_value, index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_needed() {
        assert_eq!(bits_needed(0), 0);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(2), 2);
        assert_eq!(bits_needed(255), 8);
        assert_eq!(bits_needed(256), 9);
        assert_eq!(bits_needed(u32::MAX), 32);
    }

    #[test]
    fn test_bits_for_cardinality() {
        assert_eq!(bits_for_cardinality(0), 0);
        assert_eq!(bits_for_cardinality(1), 0);
        assert_eq!(bits_for_cardinality(2), 1);
        assert_eq!(bits_for_cardinality(4), 2);
        assert_eq!(bits_for_cardinality(5), 3);
        assert_eq!(bits_for_cardinality(1 << 20), 20);
    }

    #[test]
    fn test_bitpack_various_widths() {
        for bpv in [1u8, 2, 3, 5, 7, 8, 13, 16, 31, 32] {
            let max_val = if bpv == 32 {
                u32::MAX
            } else {
                (1u32 << bpv) - 1
            };
            let values: Vec<u32> = (0..100u32)
                .map(|i| i.wrapping_mul(2_654_435_761) & max_val)
                .collect();
            let mut packed = Vec::new();
            bitpack_write(&values, bpv, &mut packed);
            assert_eq!(packed.len(), packed_len(values.len(), bpv));

            for (i, &expected) in values.iter().enumerate() {
                assert_eq!(bitpack_read(&packed, bpv, i), expected, "bpv={} index={}", bpv, i);
            }
        }
    }

    #[test]
    fn test_zero_width_takes_no_space() {
        let mut packed = Vec::new();
        bitpack_write(&[0, 0, 0], 0, &mut packed);
        assert!(packed.is_empty());
        let bits = PackedBits::open(OwnedBytes::new(packed), 0, 3).unwrap();
        assert_eq!(bits.get(2), 0);
    }

    #[test]
    fn test_packed_bits_read_range() {
        let values: Vec<u32> = (0..50).map(|i| (i * 3) % 17).collect();
        let mut packed = Vec::new();
        bitpack_write(&values, 5, &mut packed);
        let bits = PackedBits::open(OwnedBytes::new(packed), 5, values.len()).unwrap();

        let mut out = Vec::new();
        bits.read_range_into(10, 7, &mut out);
        assert_eq!(out, &values[10..17]);
    }

    #[test]
    fn test_packed_bits_rejects_short_buffer() {
        let err = PackedBits::open(OwnedBytes::new(vec![0u8; 3]), 7, 4).unwrap_err();
        assert!(matches!(err, Error::CorruptLayout(_)));

        let err = PackedBits::open(OwnedBytes::new(vec![0u8; 64]), 33, 1).unwrap_err();
        assert!(matches!(err, Error::CorruptLayout(_)));
    }
}
