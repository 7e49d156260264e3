//! Packed 64-bit encoding for a hash record.
//!
//! The common case, a hash seen from exactly one source at one offset,
//! fits in a single machine word: the high `k` bits carry the interned
//! `source_id`, the low `64-k` bits carry the block offset in units of
//! `hash_block_size`. A second, disjoint shape reuses the same word to
//! carry a duplicate-count once a hash is seen from two or more sources;
//! it is recognized by an all-ones sentinel in the top 32 bits, a pattern
//! no legal singleton can produce.

use crate::{err_at, Error, Result};

/// Smallest legal width, in bits, of the `source_id` field.
pub const MIN_INDEX_BITS: u32 = 32;
/// Largest legal width, in bits, of the `source_id` field.
pub const MAX_INDEX_BITS: u32 = 40;

/// A single count-shape word always has these bits set in the top 32
/// bits; no singleton can match it because `source_id` is bounded by
/// `k <= 40 < 64`, leaving at least 24 top bits zero.
const COUNT_SENTINEL: u64 = 0xFFFF_FFFF_0000_0000;

/// The smallest and largest legal duplicate count storable in count
/// shape. `2^32 - 1` is reserved as the sentinel value itself and must
/// never be reached; see [encode_count].
pub const MIN_COUNT: u32 = 2;
pub const MAX_COUNT: u32 = u32::MAX - 1;

/// Decoded view of a packed 64-bit hash record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedEncoding {
    Singleton { source_id: u64, block_offset: u64 },
    Count(u32),
}

/// Pack `(source_id, block_offset)` into a singleton-shape word using an
/// index-bit width of `k`.
///
/// Fails with `SourceIdTooLarge` ([Error::InvalidInput]) if `source_id`
/// does not fit in `k` bits, and `OffsetTooLarge` if `block_offset` does
/// not fit in `64-k` bits. Note that `block_offset == 2^(64-k) - 1` (the
/// all-ones pattern) is also rejected, because it would collide with the
/// count-shape sentinel once `k == 32`.
pub fn encode_singleton(k: u32, source_id: u64, block_offset: u64) -> Result<u64> {
    check_index_bits(k)?;

    let offset_bits = 64 - k;
    let max_source_id = if k == 64 { u64::MAX } else { (1u64 << k) - 1 };
    if source_id == 0 || source_id > max_source_id {
        return err_at!(InvalidInput, msg: "source_id {} does not fit in {} bits", source_id, k);
    }

    let max_offset = (1u64 << offset_bits) - 1;
    if block_offset >= max_offset {
        // `== max_offset` (all-ones) is the would-be sentinel for this shape;
        // reject it rather than let it alias.
        return err_at!(InvalidInput, msg: "block_offset {} does not fit in {} bits", block_offset, offset_bits);
    }

    Ok((source_id << offset_bits) | block_offset)
}

/// Pack a duplicate count `n` (`2 <= n < 2^32 - 1`) into a count-shape
/// word.
pub fn encode_count(n: u32) -> Result<u64> {
    if !(MIN_COUNT..=MAX_COUNT).contains(&n) {
        return err_at!(InvalidInput, msg: "duplicate count {} out of range [{}, {}]", n, MIN_COUNT, MAX_COUNT);
    }
    Ok(COUNT_SENTINEL | (n as u64))
}

/// Decode a packed word using index-bit width `k`.
pub fn decode(k: u32, word: u64) -> Result<PackedEncoding> {
    check_index_bits(k)?;

    if (word & COUNT_SENTINEL) == COUNT_SENTINEL {
        let n = (word & 0xFFFF_FFFF) as u32;
        Ok(PackedEncoding::Count(n))
    } else {
        let offset_bits = 64 - k;
        let source_id = word >> offset_bits;
        let block_offset = word & ((1u64 << offset_bits) - 1);
        Ok(PackedEncoding::Singleton {
            source_id,
            block_offset,
        })
    }
}

/// Number of (source_id, block_offset) triples this word stands for: 1
/// for singleton shape, `n` for count shape.
pub fn count_of(k: u32, word: u64) -> Result<u32> {
    match decode(k, word)? {
        PackedEncoding::Singleton { .. } => Ok(1),
        PackedEncoding::Count(n) => Ok(n),
    }
}

fn check_index_bits(k: u32) -> Result<()> {
    if !(MIN_INDEX_BITS..=MAX_INDEX_BITS).contains(&k) {
        return err_at!(InvalidInput, msg: "number_of_index_bits {} out of range [{}, {}]", k, MIN_INDEX_BITS, MAX_INDEX_BITS);
    }
    Ok(())
}

#[cfg(test)]
#[path = "encoding_test.rs"]
mod encoding_test;
