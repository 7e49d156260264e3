//! The hash duplicates store: an ordered multimap `H -> packed u64`,
//! populated only once a hash's count reaches 2 (spec §4.6).

use std::{collections::BTreeSet, convert::TryInto, ffi, fs, io::Write, path::Path};

use crate::{err_at, util, Error, Result};

pub const HASH_DUPLICATES_STORE: &str = "hash_duplicates_store";

/// `(H, E)` pairs, ordered by `H` then `E`, no duplicate pairs.
/// `BTreeSet<(Vec<u8>, u64)>` gives both properties for free and keeps
/// `values_for` a contiguous range scan.
#[derive(Debug, Default)]
pub struct DupStore {
    entries: BTreeSet<(Vec<u8>, u64)>,
}

impl DupStore {
    pub fn new() -> DupStore {
        DupStore::default()
    }

    pub fn contains(&self, h: &[u8], e: u64) -> bool {
        self.entries.contains(&(h.to_vec(), e))
    }

    /// Must not already be a duplicate of an existing pair.
    pub fn insert(&mut self, h: &[u8], e: u64) -> Result<()> {
        if !self.entries.insert((h.to_vec(), e)) {
            return err_at!(Corruption, msg: "dup_store.insert: ({:?}, {}) already present", h, e);
        }
        Ok(())
    }

    /// Must exist.
    pub fn erase(&mut self, h: &[u8], e: u64) -> Result<()> {
        if !self.entries.remove(&(h.to_vec(), e)) {
            return err_at!(Corruption, msg: "dup_store.erase: ({:?}, {}) not present", h, e);
        }
        Ok(())
    }

    pub fn match_count(&self, h: &[u8]) -> usize {
        self.range_for(h).count()
    }

    /// Every encoding stored under `h`. Fails if fewer than 2 remain —
    /// the invariant that only count-shape hashes have duplicates entries.
    pub fn values_for(&self, h: &[u8]) -> Result<Vec<u64>> {
        let values: Vec<u64> = self.range_for(h).map(|(_, e)| *e).collect();
        if values.len() < 2 {
            return err_at!(
                Corruption, msg: "dup_store.values_for: {:?} has only {} entries", h, values.len()
            );
        }
        Ok(values)
    }

    /// The one encoding left under `h` after the Count2-to-Singleton
    /// demotion has erased its sibling. Fails if `h` has zero or more
    /// than one entry remaining.
    pub fn single_remaining(&self, h: &[u8]) -> Result<u64> {
        let mut it = self.range_for(h).map(|(_, e)| *e);
        let only = match it.next() {
            Some(e) => e,
            None => return err_at!(Corruption, msg: "dup_store.single_remaining: {:?} has no entries", h),
        };
        if it.next().is_some() {
            return err_at!(Corruption, msg: "dup_store.single_remaining: {:?} has more than one entry", h);
        }
        Ok(only)
    }

    fn range_for<'a>(&'a self, h: &'a [u8]) -> impl Iterator<Item = &'a (Vec<u8>, u64)> + 'a {
        self.entries
            .range((h.to_vec(), u64::MIN)..=(h.to_vec(), u64::MAX))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self, dir: &ffi::OsStr) -> Result<()> {
        let path = Path::new(dir).join(HASH_DUPLICATES_STORE);
        let mut buf = Vec::new();
        for (h, e) in self.entries.iter() {
            buf.extend_from_slice(&(h.len() as u32).to_le_bytes());
            buf.extend_from_slice(h);
            buf.extend_from_slice(&e.to_le_bytes());
        }
        let os_path: &ffi::OsStr = path.as_os_str();
        let mut file = util::create_file_a(os_path)?;
        err_at!(IOError, file.write_all(&buf))?;
        err_at!(IOError, file.sync_all())
    }

    pub fn load(dir: &ffi::OsStr) -> Result<DupStore> {
        let path = Path::new(dir).join(HASH_DUPLICATES_STORE);
        if !path.exists() {
            return Ok(DupStore::new());
        }
        let buf = err_at!(IOError, fs::read(&path))?;
        let mut entries = BTreeSet::new();
        let mut pos = 0;
        while pos < buf.len() {
            if pos + 4 > buf.len() {
                return err_at!(Corruption, msg: "truncated hash_duplicates_store length at {}", pos);
            }
            let hlen = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if pos + hlen + 8 > buf.len() {
                return err_at!(Corruption, msg: "truncated hash_duplicates_store record at {}", pos);
            }
            let h = buf[pos..pos + hlen].to_vec();
            pos += hlen;
            let e = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
            pos += 8;
            entries.insert((h, e));
        }
        Ok(DupStore { entries })
    }
}

#[cfg(test)]
#[path = "dup_store_test.rs"]
mod dup_store_test;
