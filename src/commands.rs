//! The CLI-surfaced commands (spec §6's table), composing the
//! primitives in `manager`, `iter`, `scan`, and `server`. Each function
//! is a plain library entry point -- callable from the `hashdb` binary
//! or embedded directly in a scanner, matching "run inside a stream
//! scanner" (spec §1).
//!
//! `export`/`copy` round-trip against a deliberately minimal line format
//! rather than full DFXML: one `<hashdb_element>`-shaped record per
//! expanded triple (hash hex, repository name, filename, block offset),
//! since DFXML grammar is explicitly out of scope.

use std::{ffi, fs, io::Write as _, path::Path};

use crate::{
    changelog::ChangeLog,
    err_at,
    history::CommandLog,
    iter::iter_triples,
    manager::Database,
    settings::Settings,
    Error, Result,
};

/// `create dir, tuning params`.
pub fn create(dir: &ffi::OsStr, settings: Settings) -> Result<()> {
    let db = Database::create(dir, settings)?;
    let mut log = CommandLog::new("create", &[os_str_display(dir)]);
    log.changes = db.changes;
    db.close()?;
    log.flush(dir)
}

/// `copy src (dfxml or hashdb), dst`. `src` is a directory ingested by
/// iteration when it looks like a hashdb directory (has `settings.xml`),
/// otherwise treated as a minimal DFXML-line file.
pub fn copy(src: &ffi::OsStr, dst: &ffi::OsStr) -> Result<ChangeLog> {
    let mut dst_db = Database::open(dst)?;

    if Path::new(src).join(crate::settings::SETTINGS_FILE).exists() {
        ingest_from_hashdb(src, &mut dst_db)?;
    } else {
        ingest_from_dfxml_lines(src, &mut dst_db)?;
    }

    let changes = dst_db.changes;
    let mut log = CommandLog::new("copy", &[os_str_display(src), os_str_display(dst)]);
    log.changes = changes;
    dst_db.close()?;
    log.flush(dst)?;
    Ok(changes)
}

fn ingest_from_hashdb(src: &ffi::OsStr, dst_db: &mut Database) -> Result<()> {
    let src_db = Database::open(src)?;
    let k = src_db.settings().number_of_index_bits;
    for triple in iter_triples(src_db.hash_store_ref(), src_db.dup_store_ref(), k) {
        let (h, source_id, block_offset) = triple?;
        let source = src_db.lookup_source(source_id)?;
        let new_source_id = dst_db.get_or_insert_source(&source.repository_name, &source.filename);
        dst_db.insert(&h, new_source_id, block_offset)?;
    }
    Ok(())
}

fn ingest_from_dfxml_lines(src: &ffi::OsStr, dst_db: &mut Database) -> Result<()> {
    let text = err_at!(IOError, fs::read_to_string(src))?;
    for line in text.lines() {
        if let Some(record) = DfxmlElement::parse(line) {
            let source_id = dst_db.get_or_insert_source(&record.repository_name, &record.filename);
            let h = err_at!(DecodeFail, hex::decode(&record.hash_hex))?;
            dst_db.insert(&h, source_id, record.block_offset)?;
        }
    }
    Ok(())
}

/// `remove src, dst`: erase every triple named in `src` (same two input
/// shapes as `copy`) from `dst`.
pub fn remove(src: &ffi::OsStr, dst: &ffi::OsStr) -> Result<ChangeLog> {
    let mut dst_db = Database::open(dst)?;

    if Path::new(src).join(crate::settings::SETTINGS_FILE).exists() {
        let src_db = Database::open(src)?;
        let k = src_db.settings().number_of_index_bits;
        for triple in iter_triples(src_db.hash_store_ref(), src_db.dup_store_ref(), k) {
            let (h, source_id, block_offset) = triple?;
            let source = src_db.lookup_source(source_id)?;
            let dst_source_id = dst_db.get_or_insert_source(&source.repository_name, &source.filename);
            dst_db.erase(&h, dst_source_id, block_offset)?;
        }
    } else {
        let text = err_at!(IOError, fs::read_to_string(src))?;
        for line in text.lines() {
            if let Some(record) = DfxmlElement::parse(line) {
                let source_id = dst_db.get_or_insert_source(&record.repository_name, &record.filename);
                let h = err_at!(DecodeFail, hex::decode(&record.hash_hex))?;
                dst_db.erase(&h, source_id, record.block_offset)?;
            }
        }
    }

    let changes = dst_db.changes;
    let mut log = CommandLog::new("remove", &[os_str_display(src), os_str_display(dst)]);
    log.changes = changes;
    dst_db.close()?;
    log.flush(dst)?;
    Ok(changes)
}

/// `merge in1, in2, out`: union two hashdb directories into a freshly
/// created third.
pub fn merge(in1: &ffi::OsStr, in2: &ffi::OsStr, out: &ffi::OsStr) -> Result<ChangeLog> {
    let settings = Database::open(in1)?.settings().clone();
    let out_db = Database::create(out, settings)?;
    out_db.close()?;

    let mut changes = copy(in1, out)?;
    changes.merge(&copy(in2, out)?);
    Ok(changes)
}

/// `rebuild_bloom dir, new bloom params`: rewrite the bloom files from
/// the primary hash store.
pub fn rebuild_bloom(dir: &ffi::OsStr, settings: Settings) -> Result<()> {
    let mut db = Database::open(dir)?;
    db.rebuild_bloom(settings)?;

    let log = CommandLog::new("rebuild_bloom", &[os_str_display(dir)]);
    db.close()?;
    log.flush(dir)
}

/// `export dir, dfxml`: write one minimal `<hashdb_element>` line per
/// expanded triple.
pub fn export(dir: &ffi::OsStr, dfxml: &ffi::OsStr) -> Result<usize> {
    let db = Database::open(dir)?;
    let k = db.settings().number_of_index_bits;

    let os_dfxml: &ffi::OsStr = dfxml;
    let mut out = crate::util::create_file_a(os_dfxml)?;
    let mut n = 0;
    for triple in iter_triples(db.hash_store_ref(), db.dup_store_ref(), k) {
        let (h, source_id, block_offset) = triple?;
        let source = db.lookup_source(source_id)?;
        let record = DfxmlElement {
            hash_hex: hex::encode(&h),
            repository_name: source.repository_name,
            filename: source.filename,
            block_offset,
        };
        err_at!(IOError, writeln!(out, "{}", record.render()))?;
        n += 1;
    }
    Ok(n)
}

/// `info dir`: the per-operation counters plus store sizes, formatted
/// for stdout.
pub fn info(dir: &ffi::OsStr) -> Result<String> {
    let db = Database::open(dir)?;
    Ok(format!(
        "settings_version: {}\nhashdigest_type: {}\nhash_records: {}\nsources: {}\n",
        db.settings().settings_version,
        db.settings().hashdigest_type.as_str(),
        db.len(),
        db.source_count(),
    ))
}

/// `server dir, port`: run the scan-only TCP server forever.
pub fn server(dir: &ffi::OsStr, port: u16, pool_size: Option<usize>) -> Result<()> {
    crate::server::serve(dir, port, pool_size)
}

fn os_str_display(s: &ffi::OsStr) -> String {
    s.to_string_lossy().into_owned()
}

/// One expanded triple rendered as a single-line, whitespace-separated
/// record: `<hashdb_element hash="..." repository_name="..."
/// filename="..." block_offset="N"/>`. Deliberately not a conforming
/// DFXML document -- see module docs.
struct DfxmlElement {
    hash_hex: String,
    repository_name: String,
    filename: String,
    block_offset: u64,
}

impl DfxmlElement {
    fn render(&self) -> String {
        format!(
            r#"<hashdb_element hash="{}" repository_name="{}" filename="{}" block_offset="{}"/>"#,
            self.hash_hex, self.repository_name, self.filename, self.block_offset
        )
    }

    fn parse(line: &str) -> Option<DfxmlElement> {
        let line = line.trim();
        if !line.starts_with("<hashdb_element ") {
            return None;
        }
        Some(DfxmlElement {
            hash_hex: extract_attr(line, "hash")?,
            repository_name: extract_attr(line, "repository_name")?,
            filename: extract_attr(line, "filename")?,
            block_offset: extract_attr(line, "block_offset")?.parse().ok()?,
        })
    }
}

fn extract_attr(line: &str, name: &str) -> Option<String> {
    let needle = format!(r#"{}=""#, name);
    let start = line.find(&needle)? + needle.len();
    let rest = &line[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
#[path = "commands_test.rs"]
mod commands_test;
