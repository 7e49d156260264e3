//! The primary hash store: an ordered unique-key map `H -> packed u64`.
//!
//! Specified against an abstract ordered map (spec's own "an
//! implementation may pick one backing store"); exposed here as a
//! [HashStore] trait so the manager is not tied to one container, with a
//! single `BTreeMap`-backed implementation shipped — the same trait-
//! first, one-concrete-impl shape the teacher uses for its storage
//! engines.

use std::{collections::BTreeMap, convert::TryInto, ffi, fs, io::Write, path::Path};

use crate::{err_at, util, Error, Result};

pub const HASH_STORE: &str = "hash_store";

/// Ordered unique-key map from a block hash's raw bytes to its packed
/// encoding. `find_encoding`/`insert`/`replace`/`erase` mirror spec §4.5
/// exactly; callers are expected to uphold the "must/must not already be
/// present" preconditions — violating one is a structural bug, not a
/// policy rejection, so these return [Error] rather than a counter.
pub trait HashStore {
    fn find_encoding(&self, h: &[u8]) -> Option<u64>;
    fn insert(&mut self, h: &[u8], e: u64) -> Result<()>;
    fn replace(&mut self, h: &[u8], e: u64) -> Result<()>;
    fn erase(&mut self, h: &[u8]) -> Result<()>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Ordered iteration from begin to end, yielding `(H, E)` pairs.
    fn iter(&self) -> Box<dyn Iterator<Item = (Vec<u8>, u64)> + '_>;
}

/// `BTreeMap`-backed [HashStore]. Sharding by the top byte of `H` (spec
/// §4.5) would partition this map across `shard_count` sibling maps; a
/// single unsharded map is the one shipped here, since nothing in the
/// manager's semantics depends on sharding being present.
#[derive(Debug, Default)]
pub struct BTreeHashStore {
    entries: BTreeMap<Vec<u8>, u64>,
}

impl BTreeHashStore {
    pub fn new() -> BTreeHashStore {
        BTreeHashStore::default()
    }

    pub fn save(&self, dir: &ffi::OsStr) -> Result<()> {
        let path = Path::new(dir).join(HASH_STORE);
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

    pub fn load(dir: &ffi::OsStr) -> Result<BTreeHashStore> {
        let path = Path::new(dir).join(HASH_STORE);
        if !path.exists() {
            return Ok(BTreeHashStore::new());
        }
        let buf = err_at!(IOError, fs::read(&path))?;
        let mut entries = BTreeMap::new();
        let mut pos = 0;
        while pos < buf.len() {
            if pos + 4 > buf.len() {
                return err_at!(Corruption, msg: "truncated hash_store record length at {}", pos);
            }
            let hlen = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if pos + hlen + 8 > buf.len() {
                return err_at!(Corruption, msg: "truncated hash_store record at {}", pos);
            }
            let h = buf[pos..pos + hlen].to_vec();
            pos += hlen;
            let e = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
            pos += 8;
            entries.insert(h, e);
        }
        Ok(BTreeHashStore { entries })
    }
}

impl HashStore for BTreeHashStore {
    fn find_encoding(&self, h: &[u8]) -> Option<u64> {
        self.entries.get(h).copied()
    }

    fn insert(&mut self, h: &[u8], e: u64) -> Result<()> {
        if self.entries.contains_key(h) {
            return err_at!(Corruption, msg: "hash_store.insert: {:?} already present", h);
        }
        self.entries.insert(h.to_vec(), e);
        Ok(())
    }

    fn replace(&mut self, h: &[u8], e: u64) -> Result<()> {
        if !self.entries.contains_key(h) {
            return err_at!(Corruption, msg: "hash_store.replace: {:?} not present", h);
        }
        self.entries.insert(h.to_vec(), e);
        Ok(())
    }

    fn erase(&mut self, h: &[u8]) -> Result<()> {
        match self.entries.remove(h) {
            Some(_) => Ok(()),
            None => err_at!(Corruption, msg: "hash_store.erase: {:?} not present", h),
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (Vec<u8>, u64)> + '_> {
        Box::new(self.entries.iter().map(|(h, e)| (h.clone(), *e)))
    }
}

#[cfg(test)]
#[path = "hash_store_test.rs"]
mod hash_store_test;
