//! Memory-mapped Bloom filter guarding the hash store.
//!
//! The filter is a fixed 128-byte header followed by `M/8` bytes of bit
//! array, mapped read/write so that `test()` never pays a syscall. Bit
//! sets go through an atomic byte-wise OR (`AtomicU8`) so a concurrent
//! reader never observes a torn write; clearing (only done by
//! [BloomFilter::rebuild])
//! requires the caller to hold the database's writer lock, same as every
//! other mutating path in this crate.

use memmap2::MmapMut;

use std::{
    convert::TryInto,
    ffi, fs,
    sync::atomic::{AtomicU64, AtomicU8, Ordering},
};

use crate::{err_at, hash::hash128, Error, Result};

pub const MAGIC: &[u8; 8] = b"bloom\0\0\0";
pub const HEADER_SIZE: usize = 128;
pub const FORMAT_VERSION: u32 = 1;
/// Default number of independent hash functions, per the design's "typically 3".
pub const DEFAULT_K_HASH_FUNCTIONS: u32 = 3;
/// False-positive rate the sizing helper aims to stay under.
pub const TARGET_FALSE_POSITIVE_RATE: f64 = 0.06;

/// On-disk statistics header, 128 bytes, little-endian, zero-padded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Header {
    pub version: u32,
    /// log2 of the bit-array size.
    pub m_hash_size: u32,
    pub k_hash_functions: u32,
    pub added_items: u64,
    pub unique_added_items: u64,
    pub aliased_adds: u64,
    pub hits: u64,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.m_hash_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.k_hash_functions.to_le_bytes());
        buf[20..28].copy_from_slice(&self.added_items.to_le_bytes());
        buf[28..36].copy_from_slice(&self.unique_added_items.to_le_bytes());
        buf[36..44].copy_from_slice(&self.aliased_adds.to_le_bytes());
        buf[44..52].copy_from_slice(&self.hits.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_SIZE {
            return err_at!(DecodeFail, msg: "bloom header truncated: {} bytes", buf.len());
        }
        if &buf[0..8] != MAGIC {
            return err_at!(DecodeFail, msg: "bad bloom magic {:?}", &buf[0..8]);
        }
        Ok(Header {
            version: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            m_hash_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            k_hash_functions: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            added_items: u64::from_le_bytes(buf[20..28].try_into().unwrap()),
            unique_added_items: u64::from_le_bytes(buf[28..36].try_into().unwrap()),
            aliased_adds: u64::from_le_bytes(buf[36..44].try_into().unwrap()),
            hits: u64::from_le_bytes(buf[44..52].try_into().unwrap()),
        })
    }
}

/// Smallest `m` (`M = 2^m` bits) that keeps the false-positive rate near
/// [TARGET_FALSE_POSITIVE_RATE] for `n` expected unique items.
pub fn size_for(n: usize, k_hash_functions: u32) -> u32 {
    let n = n.max(1) as f64;
    let k = k_hash_functions.max(1) as f64;
    // p ~= (1 - e^(-k*n/M))^k  =>  M ~= -k*n / ln(1 - p^(1/k))
    let p = TARGET_FALSE_POSITIVE_RATE.powf(1.0 / k);
    let m_bits = (-k * n / (1.0 - p).ln()).ceil().max(8.0);
    let mut m = 3u32; // machine_word_bits - 1 floor, never go below 8 bits
    while (1u64 << m) < (m_bits as u64) {
        m += 1;
    }
    m
}

pub struct BloomFilter {
    loc: ffi::OsString,
    file: fs::File,
    mmap: MmapMut,
    m_hash_size: u32,
    k_hash_functions: u32,
    added_items: AtomicU64,
    unique_added_items: AtomicU64,
    aliased_adds: AtomicU64,
    hits: AtomicU64,
}

impl BloomFilter {
    /// Create a new, all-zero bloom filter file at `loc` with `2^m` bits
    /// and `k` hash functions.
    pub fn create(loc: &ffi::OsStr, m_hash_size: u32, k_hash_functions: u32) -> Result<BloomFilter> {
        let nbytes = Self::bitarray_len(m_hash_size);
        let file = crate::util::create_file_a(loc)?;
        err_at!(IOError, file.set_len((HEADER_SIZE + nbytes) as u64))?;

        let header = Header {
            version: FORMAT_VERSION,
            m_hash_size,
            k_hash_functions,
            ..Header::default()
        };
        let mut mmap = err_at!(IOError, unsafe { MmapMut::map_mut(&file) })?;
        mmap[0..HEADER_SIZE].copy_from_slice(&header.encode());

        Ok(BloomFilter {
            loc: loc.to_os_string(),
            file,
            mmap,
            m_hash_size,
            k_hash_functions,
            added_items: AtomicU64::new(0),
            unique_added_items: AtomicU64::new(0),
            aliased_adds: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        })
    }

    /// Open an existing bloom filter file.
    pub fn open(loc: &ffi::OsStr) -> Result<BloomFilter> {
        let file = crate::util::open_file_w(loc)?;
        let mmap = err_at!(IOError, unsafe { MmapMut::map_mut(&file) })?;
        let header = Header::decode(&mmap[0..HEADER_SIZE])?;

        let expect = HEADER_SIZE + Self::bitarray_len(header.m_hash_size);
        if mmap.len() != expect {
            return err_at!(
                Corruption, msg: "bloom file {:?} is {} bytes, expected {}", loc, mmap.len(), expect
            );
        }

        Ok(BloomFilter {
            loc: loc.to_os_string(),
            file,
            mmap,
            m_hash_size: header.m_hash_size,
            k_hash_functions: header.k_hash_functions,
            added_items: AtomicU64::new(header.added_items),
            unique_added_items: AtomicU64::new(header.unique_added_items),
            aliased_adds: AtomicU64::new(header.aliased_adds),
            hits: AtomicU64::new(header.hits),
        })
    }

    fn bitarray_len(m_hash_size: u32) -> usize {
        let bits = 1u64 << m_hash_size;
        ((bits + 7) / 8) as usize
    }

    fn num_bits(&self) -> u64 {
        1u64 << self.m_hash_size
    }

    /// The `k` bit positions a key maps to, via double hashing over a
    /// 128-bit digest (cheaper than `k` independent hash functions and
    /// just as effective for Bloom filters in practice).
    fn positions(&self, key: &[u8]) -> Vec<u64> {
        let digest = hash128(key);
        let h1 = (digest >> 64) as u64;
        let h2 = digest as u64;
        let m = self.num_bits();
        (0..self.k_hash_functions as u64)
            .map(|i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
            .collect()
    }

    fn bit_ref(&self, pos: u64) -> &AtomicU8 {
        let byte_idx = HEADER_SIZE + (pos / 8) as usize;
        // SAFETY: `byte_idx` is always within the mapped region (`pos < M`,
        // `M/8` bytes follow the header), and AtomicU8 has the same layout
        // and alignment as u8, so this reinterpretation is sound. The
        // mmap outlives the returned reference because it is borrowed
        // from `&self`.
        unsafe { &*(self.mmap.as_ptr().add(byte_idx) as *const AtomicU8) }
    }

    fn bit_is_set(&self, pos: u64) -> bool {
        let mask = 1u8 << (pos % 8);
        self.bit_ref(pos).load(Ordering::Relaxed) & mask != 0
    }

    fn set_bit(&self, pos: u64) -> bool {
        let mask = 1u8 << (pos % 8);
        let prev = self.bit_ref(pos).fetch_or(mask, Ordering::Relaxed);
        prev & mask != 0
    }

    /// Set the `k` bits for `key`. Never fails.
    pub fn add(&self, key: &[u8]) {
        let positions = self.positions(key);
        let already_all_set = positions.iter().all(|&p| self.bit_is_set(p));
        for p in positions {
            self.set_bit(p);
        }

        self.added_items.fetch_add(1, Ordering::Relaxed);
        if already_all_set {
            self.aliased_adds.fetch_add(1, Ordering::Relaxed);
        } else {
            self.unique_added_items.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// True if every one of the `k` bits for `key` is set. May be a
    /// false positive; never a false negative for any key that was
    /// previously [BloomFilter::add]-ed (and survived a rebuild).
    pub fn test(&self, key: &[u8]) -> bool {
        let hit = self.positions(key).iter().all(|&p| self.bit_is_set(p));
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Zero the bit array and statistics, then re-insert every key
    /// yielded by `keys`. Used by `rebuild_bloom` and by recovery from a
    /// mismatched header.
    pub fn rebuild<I>(&mut self, keys: I) -> Result<()>
    where
        I: Iterator<Item = Vec<u8>>,
    {
        for b in self.mmap[HEADER_SIZE..].iter_mut() {
            *b = 0;
        }
        self.added_items.store(0, Ordering::Relaxed);
        self.unique_added_items.store(0, Ordering::Relaxed);
        self.aliased_adds.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);

        for key in keys {
            self.add(&key);
        }
        self.flush()
    }

    pub fn stats(&self) -> Header {
        Header {
            version: FORMAT_VERSION,
            m_hash_size: self.m_hash_size,
            k_hash_functions: self.k_hash_functions,
            added_items: self.added_items.load(Ordering::Relaxed),
            unique_added_items: self.unique_added_items.load(Ordering::Relaxed),
            aliased_adds: self.aliased_adds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }

    /// Persist the statistics header and flush the mapped region to disk.
    pub fn flush(&mut self) -> Result<()> {
        let header = self.stats();
        self.mmap[0..HEADER_SIZE].copy_from_slice(&header.encode());
        err_at!(IOError, self.mmap.flush())
    }

    pub fn to_location(&self) -> ffi::OsString {
        self.loc.clone()
    }
}

impl Drop for BloomFilter {
    fn drop(&mut self) {
        self.flush().ok();
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
