//! `source_id -> (filesize, file_hash)`, independent of name interning.
//!
//! Insert is idempotent on an equal value and rejected as a counter (not
//! an [Error]) on conflict, per spec's "source-metadata DB tolerates a
//! missing entry silently" resolution: a source may exist with no
//! metadata at all.

use std::{collections::BTreeMap, convert::TryInto, ffi, fs, io::Write, path::Path};

use crate::{err_at, util, Error, Result};

pub const SOURCE_METADATA_STORE: &str = "source_metadata_store";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub filesize: u64,
    pub file_hash: [u8; 32],
    pub file_hash_len: usize,
}

#[derive(Debug, Default)]
pub struct SourceMetadataStore {
    entries: BTreeMap<u64, SourceMetadata>,
}

impl SourceMetadataStore {
    pub fn new() -> SourceMetadataStore {
        SourceMetadataStore::default()
    }

    /// Insert `(filesize, file_hash)` for `source_id`. Returns `true` if
    /// newly inserted, `false` if an identical value already existed.
    /// Fails with [Error::InvalidInput] if a *different* value already
    /// exists for `source_id` — the caller turns that into the
    /// `source_metadata_not_inserted_already_present` counter.
    pub fn insert(&mut self, source_id: u64, meta: SourceMetadata) -> Result<bool> {
        match self.entries.get(&source_id) {
            Some(existing) if *existing == meta => Ok(false),
            Some(_) => err_at!(InvalidInput, msg: "source_metadata already present for {}", source_id),
            None => {
                self.entries.insert(source_id, meta);
                Ok(true)
            }
        }
    }

    pub fn lookup(&self, source_id: u64) -> Option<SourceMetadata> {
        self.entries.get(&source_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self, dir: &ffi::OsStr) -> Result<()> {
        let path = Path::new(dir).join(SOURCE_METADATA_STORE);
        let mut buf = Vec::new();
        for (source_id, meta) in self.entries.iter() {
            buf.extend_from_slice(&source_id.to_le_bytes());
            buf.extend_from_slice(&meta.filesize.to_le_bytes());
            buf.extend_from_slice(&(meta.file_hash_len as u32).to_le_bytes());
            buf.extend_from_slice(&meta.file_hash[..meta.file_hash_len]);
        }
        let os_path: &ffi::OsStr = path.as_os_str();
        let mut file = util::create_file_a(os_path)?;
        err_at!(IOError, file.write_all(&buf))?;
        err_at!(IOError, file.sync_all())
    }

    pub fn load(dir: &ffi::OsStr) -> Result<SourceMetadataStore> {
        let path = Path::new(dir).join(SOURCE_METADATA_STORE);
        if !path.exists() {
            return Ok(SourceMetadataStore::new());
        }
        let buf = err_at!(IOError, fs::read(&path))?;
        let mut entries = BTreeMap::new();
        let mut pos = 0;
        while pos < buf.len() {
            if pos + 20 > buf.len() {
                return err_at!(Corruption, msg: "truncated source_metadata_store at {}", pos);
            }
            let source_id = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
            let filesize = u64::from_le_bytes(buf[pos + 8..pos + 16].try_into().unwrap());
            let hash_len = u32::from_le_bytes(buf[pos + 16..pos + 20].try_into().unwrap()) as usize;
            pos += 20;
            if hash_len > 32 || pos + hash_len > buf.len() {
                return err_at!(Corruption, msg: "bad file_hash length {} at {}", hash_len, pos);
            }
            let mut file_hash = [0u8; 32];
            file_hash[..hash_len].copy_from_slice(&buf[pos..pos + hash_len]);
            pos += hash_len;
            entries.insert(
                source_id,
                SourceMetadata {
                    filesize,
                    file_hash,
                    file_hash_len: hash_len,
                },
            );
        }
        Ok(SourceMetadataStore { entries })
    }
}

#[cfg(test)]
#[path = "source_metadata_test.rs"]
mod source_metadata_test;
