//! Bidirectional interning of `(repository_name, filename)` pairs to a
//! dense `source_id`.
//!
//! Three ordered maps live under one directory: `repository_name -> rn_id`
//! (and back), `filename -> fn_id` (and back), and `(rn_id, fn_id) ->
//! source_id` (and back). Ids are allocated monotonically starting at 1.
//! Nothing is ever removed: a source whose last hash reference is erased
//! stays interned, because the interner records historical evidence of
//! what was once ingested, not just what is currently referenced.

use std::{collections::BTreeMap, convert::TryInto, ffi, fs, io::Write, path::Path};

use crate::{err_at, util, Error, Result};

/// File names of the three on-disk stores, relative to the database
/// directory.
pub const REPOSITORY_NAME_STORE: &str = "source_repository_name_store";
pub const FILENAME_STORE: &str = "source_filename_store";
pub const SOURCE_STORE: &str = "source_store";

#[derive(Debug, Clone, Default)]
struct BiMap<K: Ord + Clone, V: Ord + Clone> {
    forward: BTreeMap<K, V>,
    reverse: BTreeMap<V, K>,
}

impl<K: Ord + Clone, V: Ord + Clone> BiMap<K, V> {
    fn new() -> Self {
        BiMap {
            forward: BTreeMap::new(),
            reverse: BTreeMap::new(),
        }
    }

    fn insert(&mut self, k: K, v: V) {
        self.forward.insert(k.clone(), v.clone());
        self.reverse.insert(v, k);
    }

    fn by_key(&self, k: &K) -> Option<&V> {
        self.forward.get(k)
    }

    fn by_value(&self, v: &V) -> Option<&K> {
        self.reverse.get(v)
    }

    fn len(&self) -> usize {
        self.forward.len()
    }
}

/// A source identified by its repository name and filename pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Source {
    pub repository_name: String,
    pub filename: String,
}

/// The three-map bidirectional source interner.
///
/// `get_or_insert` is the sole mutator; everything else is a read-only
/// lookup. The interner is an injection in both directions: equal source
/// pairs always map to equal ids, and equal ids always map to equal
/// pairs.
#[derive(Debug, Default)]
pub struct SourceInterner {
    repository_names: BiMap<String, u64>,
    filenames: BiMap<String, u64>,
    sources: BiMap<(u64, u64), u64>,
    next_rn_id: u64,
    next_fn_id: u64,
    next_source_id: u64,
}

impl SourceInterner {
    pub fn new() -> SourceInterner {
        SourceInterner {
            repository_names: BiMap::new(),
            filenames: BiMap::new(),
            sources: BiMap::new(),
            next_rn_id: 1,
            next_fn_id: 1,
            next_source_id: 1,
        }
    }

    /// Intern `(repository_name, filename)`, allocating new ids for any
    /// of the three maps that have not seen this value before. Returns
    /// the `source_id` and whether it was newly allocated.
    pub fn get_or_insert(&mut self, repository_name: &str, filename: &str) -> (u64, bool) {
        let rn_id = match self.repository_names.by_key(&repository_name.to_string()) {
            Some(id) => *id,
            None => {
                let id = self.next_rn_id;
                self.next_rn_id += 1;
                self.repository_names.insert(repository_name.to_string(), id);
                id
            }
        };

        let fn_id = match self.filenames.by_key(&filename.to_string()) {
            Some(id) => *id,
            None => {
                let id = self.next_fn_id;
                self.next_fn_id += 1;
                self.filenames.insert(filename.to_string(), id);
                id
            }
        };

        match self.sources.by_key(&(rn_id, fn_id)) {
            Some(id) => (*id, false),
            None => {
                let id = self.next_source_id;
                self.next_source_id += 1;
                self.sources.insert((rn_id, fn_id), id);
                (id, true)
            }
        }
    }

    /// Resolve a `source_id` back to its `(repository_name, filename)`
    /// pair. Fails only if `source_id` was never allocated.
    pub fn lookup_id(&self, source_id: u64) -> Result<Source> {
        let (rn_id, fn_id) = match self.sources.by_value(&source_id) {
            Some(key) => key,
            None => return err_at!(InvalidInput, msg: "no such source_id {}", source_id),
        };

        let repository_name = self
            .repository_names
            .by_value(rn_id)
            .expect("rn_id referenced by source_store must be interned")
            .clone();
        let filename = self
            .filenames
            .by_value(fn_id)
            .expect("fn_id referenced by source_store must be interned")
            .clone();

        Ok(Source {
            repository_name,
            filename,
        })
    }

    /// True if `source_id` has been allocated.
    pub fn contains(&self, source_id: u64) -> bool {
        self.sources.by_value(&source_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate every interned source in ascending `source_id` order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, Source)> + '_ {
        self.sources.reverse.iter().map(move |(source_id, _)| {
            let source = self.lookup_id(*source_id).expect("consistent by construction");
            (*source_id, source)
        })
    }

    /// Write the three stores into `dir`, replacing whatever is there.
    /// Called once by a command's `close`, mirroring the "open, mutate in
    /// memory, write the whole map back" pattern every ordered-map store
    /// in this crate uses.
    pub fn save(&self, dir: &ffi::OsStr) -> Result<()> {
        let dir = Path::new(dir);

        let mut rn_buf = Vec::new();
        for (name, id) in self.repository_names.forward.iter() {
            encode_string_record(&mut rn_buf, *id, name);
        }
        write_whole(&dir.join(REPOSITORY_NAME_STORE), &rn_buf)?;

        let mut fn_buf = Vec::new();
        for (name, id) in self.filenames.forward.iter() {
            encode_string_record(&mut fn_buf, *id, name);
        }
        write_whole(&dir.join(FILENAME_STORE), &fn_buf)?;

        let mut src_buf = Vec::new();
        for (&(rn_id, fn_id), &source_id) in self.sources.forward.iter() {
            src_buf.extend_from_slice(&source_id.to_le_bytes());
            src_buf.extend_from_slice(&rn_id.to_le_bytes());
            src_buf.extend_from_slice(&fn_id.to_le_bytes());
        }
        write_whole(&dir.join(SOURCE_STORE), &src_buf)?;

        Ok(())
    }

    /// Load the three stores from `dir`. A missing directory (fresh
    /// database) yields an empty interner rather than an error.
    pub fn load(dir: &ffi::OsStr) -> Result<SourceInterner> {
        let dir = Path::new(dir);
        let mut interner = SourceInterner::new();

        if !dir.join(SOURCE_STORE).exists() {
            return Ok(interner);
        }

        for (id, name) in decode_string_records(&dir.join(REPOSITORY_NAME_STORE))? {
            interner.repository_names.insert(name, id);
            interner.next_rn_id = interner.next_rn_id.max(id + 1);
        }
        for (id, name) in decode_string_records(&dir.join(FILENAME_STORE))? {
            interner.filenames.insert(name, id);
            interner.next_fn_id = interner.next_fn_id.max(id + 1);
        }

        let buf = read_whole(&dir.join(SOURCE_STORE))?;
        for chunk in buf.chunks_exact(24) {
            let source_id = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
            let rn_id = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
            let fn_id = u64::from_le_bytes(chunk[16..24].try_into().unwrap());
            interner.sources.insert((rn_id, fn_id), source_id);
            interner.next_source_id = interner.next_source_id.max(source_id + 1);
        }

        Ok(interner)
    }
}

/// `u64 id | u32 len | utf8 bytes`, appended to `buf`.
fn encode_string_record(buf: &mut Vec<u8>, id: u64, s: &str) {
    buf.extend_from_slice(&id.to_le_bytes());
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn decode_string_records(path: &Path) -> Result<Vec<(u64, String)>> {
    let buf = read_whole(path)?;
    let mut out = vec![];
    let mut pos = 0;
    while pos < buf.len() {
        if pos + 12 > buf.len() {
            return err_at!(Corruption, msg: "truncated record header in {:?}", path);
        }
        let id = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        let len = u32::from_le_bytes(buf[pos + 8..pos + 12].try_into().unwrap()) as usize;
        pos += 12;
        if pos + len > buf.len() {
            return err_at!(Corruption, msg: "truncated record body in {:?}", path);
        }
        let s = err_at!(DecodeFail, String::from_utf8(buf[pos..pos + len].to_vec()))?;
        out.push((id, s));
        pos += len;
    }
    Ok(out)
}

fn read_whole(path: &Path) -> Result<Vec<u8>> {
    err_at!(IOError, fs::read(path))
}

fn write_whole(path: &Path, buf: &[u8]) -> Result<()> {
    let os_path: &ffi::OsStr = path.as_os_str();
    let mut file = util::create_file_a(os_path)?;
    err_at!(IOError, file.write_all(buf))?;
    err_at!(IOError, file.sync_all())
}

#[cfg(test)]
#[path = "interner_test.rs"]
mod interner_test;
