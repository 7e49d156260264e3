//! The database manager: owns the five stores and the two Bloom
//! filters, and enforces the joint invariants (spec §4.7).
//!
//! Insert and erase never fail on policy grounds -- they bump a
//! [ChangeLog] counter and return normally. Only structural invariant
//! violations (a count-shape primary whose multimap size disagrees with
//! `n`, an offset that no longer fits `k`) and I/O failures surface as
//! [Error], matching spec §4.7's "Failure semantics".

use std::{ffi, fs};

use fs2::FileExt;

use crate::{
    bloom::BloomFilter,
    dup_store::DupStore,
    encoding::{self, PackedEncoding},
    err_at,
    hash_store::{BTreeHashStore, HashStore},
    interner::{Source, SourceInterner},
    settings::Settings,
    source_metadata::{SourceMetadata, SourceMetadataStore},
    Error, Result,
};

pub const BLOOM_FILTER_1: &str = "bloom_filter_1";
pub const BLOOM_FILTER_2: &str = "bloom_filter_2";
const LOCK_FILE: &str = "hashdb.lock";

/// An open hashdb directory: settings plus the five live stores.
///
/// Holds an exclusive `fs2` lock on `hashdb.lock` for as long as the
/// value is alive, per spec §5's single-writer model -- a second
/// `create`/`open` against the same directory from another process
/// fails fast with [Error::IOError] instead of silently racing the
/// first.
pub struct Database {
    dir: ffi::OsString,
    lock_file: fs::File,
    settings: Settings,
    interner: SourceInterner,
    source_metadata: SourceMetadataStore,
    hash_store: BTreeHashStore,
    dup_store: DupStore,
    bloom1: Option<BloomFilter>,
    bloom2: Option<BloomFilter>,
    pub changes: crate::changelog::ChangeLog,
}

fn lock_location(dir: &ffi::OsStr) -> ffi::OsString {
    std::path::Path::new(dir).join(LOCK_FILE).into_os_string()
}

fn acquire_lock(dir: &ffi::OsStr) -> Result<fs::File> {
    let file = err_at!(
        IOError,
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_location(dir))
    )?;
    err_at!(
        IOError,
        file.try_lock_exclusive(),
        "hashdb directory {:?} is already open for writing",
        dir
    )?;
    Ok(file)
}

impl Database {
    /// Materialize a new, empty database directory: settings plus
    /// zero-length store files plus freshly-sized bloom filters.
    pub fn create(dir: &ffi::OsStr, settings: Settings) -> Result<Database> {
        err_at!(IOError, std::fs::create_dir_all(dir))?;
        let lock_file = acquire_lock(dir)?;
        settings.write(dir)?;

        let bloom1 = if settings.bloom1.used {
            let loc = bloom_location(dir, BLOOM_FILTER_1);
            Some(BloomFilter::create(
                &loc,
                settings.bloom1.m_hash_size,
                settings.bloom1.k_hash_functions,
            )?)
        } else {
            None
        };
        let bloom2 = if settings.bloom2.used {
            let loc = bloom_location(dir, BLOOM_FILTER_2);
            Some(BloomFilter::create(
                &loc,
                settings.bloom2.m_hash_size,
                settings.bloom2.k_hash_functions,
            )?)
        } else {
            None
        };

        let db = Database {
            dir: dir.to_os_string(),
            lock_file,
            settings,
            interner: SourceInterner::new(),
            source_metadata: SourceMetadataStore::new(),
            hash_store: BTreeHashStore::new(),
            dup_store: DupStore::new(),
            bloom1,
            bloom2,
            changes: crate::changelog::ChangeLog::new(),
        };
        db.close_without_consuming()?;
        Ok(db)
    }

    /// Open an existing database directory, loading every store into
    /// memory.
    pub fn open(dir: &ffi::OsStr) -> Result<Database> {
        let lock_file = acquire_lock(dir)?;
        let settings = Settings::read(dir)?;

        let bloom1 = if settings.bloom1.used {
            Some(BloomFilter::open(&bloom_location(dir, BLOOM_FILTER_1))?)
        } else {
            None
        };
        let bloom2 = if settings.bloom2.used {
            Some(BloomFilter::open(&bloom_location(dir, BLOOM_FILTER_2))?)
        } else {
            None
        };

        Ok(Database {
            dir: dir.to_os_string(),
            lock_file,
            settings,
            interner: SourceInterner::load(dir)?,
            source_metadata: SourceMetadataStore::load(dir)?,
            hash_store: BTreeHashStore::load(dir)?,
            dup_store: DupStore::load(dir)?,
            bloom1,
            bloom2,
            changes: crate::changelog::ChangeLog::new(),
        })
    }

    /// Persist every store back to `dir` and release the single-writer
    /// lock. Called once at the end of a command's lifetime -- this
    /// crate's stores are whole-snapshot, not write-through, matching
    /// the one-process-per-command CLI shape.
    pub fn close(mut self) -> Result<()> {
        if let Some(b) = &mut self.bloom1 {
            b.flush()?;
        }
        if let Some(b) = &mut self.bloom2 {
            b.flush()?;
        }
        self.close_without_consuming()?;
        err_at!(IOError, FileExt::unlock(&self.lock_file))
    }

    fn close_without_consuming(&self) -> Result<()> {
        self.settings.write(&self.dir)?;
        self.interner.save(&self.dir)?;
        self.source_metadata.save(&self.dir)?;
        self.hash_store.save(&self.dir)?;
        self.dup_store.save(&self.dir)?;
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.hash_store.len()
    }

    pub fn source_count(&self) -> usize {
        self.interner.len()
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Rewrite both bloom filters from the primary store under new bloom
    /// settings, replacing `self.bloom1`/`self.bloom2` in place so a
    /// stale handle to the old file is never left open across the
    /// rename. `settings`'s non-bloom fields are adopted too.
    pub fn rebuild_bloom(&mut self, settings: Settings) -> Result<()> {
        self.bloom1 = None;
        self.bloom2 = None;

        let hashes: Vec<Vec<u8>> = self.all_hashes().collect();

        self.bloom1 = if settings.bloom1.used {
            let mut filter = BloomFilter::create(
                &bloom_location(&self.dir, BLOOM_FILTER_1),
                settings.bloom1.m_hash_size,
                settings.bloom1.k_hash_functions,
            )?;
            filter.rebuild(hashes.iter().cloned())?;
            Some(filter)
        } else {
            let _ = std::fs::remove_file(bloom_location(&self.dir, BLOOM_FILTER_1));
            None
        };
        self.bloom2 = if settings.bloom2.used {
            let mut filter = BloomFilter::create(
                &bloom_location(&self.dir, BLOOM_FILTER_2),
                settings.bloom2.m_hash_size,
                settings.bloom2.k_hash_functions,
            )?;
            filter.rebuild(hashes.into_iter())?;
            Some(filter)
        } else {
            let _ = std::fs::remove_file(bloom_location(&self.dir, BLOOM_FILTER_2));
            None
        };

        self.settings = settings;
        Ok(())
    }

    /// Borrow the primary store through its trait object, for callers
    /// composing [crate::iter::iter_triples] (e.g. `export`/`copy`).
    pub fn hash_store_ref(&self) -> &dyn HashStore {
        &self.hash_store
    }

    pub fn dup_store_ref(&self) -> &DupStore {
        &self.dup_store
    }

    /// Every hash in the primary store, for `rebuild_bloom`.
    pub fn all_hashes(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.hash_store.iter().map(|(h, _)| h)
    }

    /// Resolve `(repository_name, filename)` to a `source_id`, interning
    /// it if unseen.
    pub fn get_or_insert_source(&mut self, repository_name: &str, filename: &str) -> u64 {
        self.interner.get_or_insert(repository_name, filename).0
    }

    pub fn lookup_source(&self, source_id: u64) -> Result<Source> {
        self.interner.lookup_id(source_id)
    }

    pub fn insert_source_metadata(&mut self, source_id: u64, meta: SourceMetadata) {
        match self.source_metadata.insert(source_id, meta) {
            Ok(true) => self.changes.source_metadata_inserted += 1,
            Ok(false) => {}
            Err(_) => self.changes.source_metadata_not_inserted_already_present += 1,
        }
    }

    pub fn lookup_source_metadata(&self, source_id: u64) -> Option<SourceMetadata> {
        self.source_metadata.lookup(source_id)
    }

    /// Resolve `H` to every `(source_id, block_offset)` it stands for.
    /// Empty if `H` is absent.
    pub fn find(&self, h: &[u8]) -> Result<Vec<(u64, u64)>> {
        let e = match self.hash_store.find_encoding(h) {
            Some(e) => e,
            None => return Ok(vec![]),
        };
        match encoding::decode(self.settings.number_of_index_bits, e)? {
            PackedEncoding::Singleton { source_id, block_offset } => Ok(vec![(source_id, block_offset)]),
            PackedEncoding::Count(_) => {
                let k = self.settings.number_of_index_bits;
                self.dup_store
                    .values_for(h)?
                    .into_iter()
                    .map(|word| match encoding::decode(k, word)? {
                        PackedEncoding::Singleton { source_id, block_offset } => Ok((source_id, block_offset)),
                        PackedEncoding::Count(_) => {
                            err_at!(Corruption, msg: "duplicates store entry for {:?} is count-shape", h)
                        }
                    })
                    .collect()
            }
        }
    }

    /// `true` if every enabled bloom filter admits `H`.
    pub fn bloom_test(&self, h: &[u8]) -> bool {
        self.bloom1.as_ref().map(|b| b.test(h)).unwrap_or(true)
            && self.bloom2.as_ref().map(|b| b.test(h)).unwrap_or(true)
    }

    /// Insert `(H, source_id, block_offset)` per spec §4.7's insert
    /// protocol. Step 1 (byte-alignment at this layer) is a no-op since
    /// `block_offset` arrives already in block units; callers working
    /// from a byte offset are responsible for the division and for
    /// bumping `hashes_not_inserted_invalid_byte_alignment` themselves
    /// if it does not divide evenly.
    pub fn insert(&mut self, h: &[u8], source_id: u64, block_offset: u64) -> Result<()> {
        let k = self.settings.number_of_index_bits;
        let e_new = encoding::encode_singleton(k, source_id, block_offset)?;

        match self.hash_store.find_encoding(h) {
            None => {
                self.hash_store.insert(h, e_new)?;
                if let Some(b) = &self.bloom1 {
                    b.add(h);
                }
                if let Some(b) = &self.bloom2 {
                    b.add(h);
                }
                self.changes.hashes_inserted += 1;
                Ok(())
            }
            Some(e_old) if e_old == e_new => {
                self.changes.hashes_not_inserted_duplicate_element += 1;
                Ok(())
            }
            Some(e_old) => match encoding::decode(k, e_old)? {
                PackedEncoding::Singleton { .. } => {
                    if self.settings.maximum_hash_duplicates == 2 {
                        self.changes.hashes_not_inserted_exceeds_max_duplicates += 1;
                        return Ok(());
                    }
                    self.dup_store.insert(h, e_old)?;
                    self.dup_store.insert(h, e_new)?;
                    self.hash_store.replace(h, encoding::encode_count(2)?)?;
                    self.changes.hashes_inserted += 1;
                    Ok(())
                }
                PackedEncoding::Count(n) => {
                    let limit = self.settings.maximum_hash_duplicates;
                    if limit != 0 && n >= limit {
                        self.changes.hashes_not_inserted_exceeds_max_duplicates += 1;
                        return Ok(());
                    }
                    if self.dup_store.contains(h, e_new) {
                        self.changes.hashes_not_inserted_duplicate_element += 1;
                        return Ok(());
                    }
                    self.dup_store.insert(h, e_new)?;
                    self.hash_store.replace(h, encoding::encode_count(n + 1)?)?;
                    self.changes.hashes_inserted += 1;
                    Ok(())
                }
            },
        }
    }

    /// Erase `(H, source_id, block_offset)` per spec §4.7's erase
    /// protocol. Bloom is never updated here -- it tolerates stale
    /// positives, not false negatives, and is rebuilt out-of-band.
    pub fn erase(&mut self, h: &[u8], source_id: u64, block_offset: u64) -> Result<()> {
        let k = self.settings.number_of_index_bits;
        let e_target = encoding::encode_singleton(k, source_id, block_offset)?;

        let e_old = match self.hash_store.find_encoding(h) {
            Some(e) => e,
            None => {
                self.changes.hashes_not_removed_no_hash += 1;
                return Ok(());
            }
        };

        match encoding::decode(k, e_old)? {
            PackedEncoding::Singleton { .. } => {
                if e_old == e_target {
                    self.hash_store.erase(h)?;
                    self.changes.hashes_removed += 1;
                } else {
                    self.changes.hashes_not_removed_no_element += 1;
                }
                Ok(())
            }
            PackedEncoding::Count(n) => {
                if !self.dup_store.contains(h, e_target) {
                    self.changes.hashes_not_removed_no_element += 1;
                    return Ok(());
                }
                self.dup_store.erase(h, e_target)?;

                if n == 2 {
                    let remaining = self.dup_store.single_remaining(h)?;
                    self.dup_store.erase(h, remaining)?;
                    self.hash_store.replace(h, remaining)?;
                } else {
                    self.hash_store.replace(h, encoding::encode_count(n - 1)?)?;
                }
                self.changes.hashes_removed += 1;
                Ok(())
            }
        }
    }
}

fn bloom_location(dir: &ffi::OsStr, name: &str) -> ffi::OsString {
    std::path::Path::new(dir).join(name).into_os_string()
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
