//! `history.xml` (append-only, root `<history>`) and `log.xml` (most
//! recent command's log), grounded on `original_source/src/logger.hpp`
//! and `hashdb_change_logger.hpp`'s "one entry per invocation" shape.
//!
//! Corrupt or missing history degrades to a warning, per spec §4.8's
//! "never a failure" rule -- this module has no fatal path of its own.

use std::{ffi, fs, path::Path};

use crate::{changelog::ChangeLog, err_at, settings, Error, Result};

pub const HISTORY_FILE: &str = "history.xml";
pub const LOG_FILE: &str = "log.xml";

/// One `commands::*` invocation's record: the command name, its
/// arguments rendered for display, the wall-clock time it ran, and the
/// resulting [ChangeLog].
#[derive(Debug, Clone)]
pub struct CommandLog {
    pub command: String,
    pub args: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub changes: ChangeLog,
}

impl CommandLog {
    pub fn new(command: &str, args: &[String]) -> CommandLog {
        CommandLog {
            command: command.to_string(),
            args: args.to_vec(),
            timestamp: chrono::Utc::now(),
            changes: ChangeLog::new(),
        }
    }

    fn to_xml_fragment(&self) -> String {
        let mut out = String::new();
        out.push_str("<command_log>\n");
        out.push_str(&format!("  <command>{}</command>\n", escape(&self.command)));
        out.push_str(&format!(
            "  <timestamp>{}</timestamp>\n",
            self.timestamp.to_rfc3339()
        ));
        for arg in &self.args {
            out.push_str(&format!("  <arg>{}</arg>\n", escape(arg)));
        }
        for (name, value) in self.changes.nonzero_fields() {
            out.push_str(&format!("  <{}>{}</{}>\n", name, value, name));
        }
        out.push_str("</command_log>\n");
        out
    }

    /// Write this invocation as `log.xml` (overwriting any prior one) and
    /// append it, wrapped in `<history>`, to `history.xml`.
    pub fn flush(&self, dir: &ffi::OsStr) -> Result<()> {
        let fragment = self.to_xml_fragment();

        let log_path = Path::new(dir).join(LOG_FILE);
        let os_log: &ffi::OsStr = log_path.as_os_str();
        {
            use std::io::Write;
            let mut file = crate::util::create_file_a(os_log)?;
            err_at!(IOError, file.write_all(fragment.as_bytes()))?;
            err_at!(IOError, file.sync_all())?;
        }

        append_history(dir, &fragment)
    }
}

/// Read the existing `history.xml` (if any), strip its `<history>` /
/// `</history>` wrapper, and re-emit the concatenation with `fragment`
/// appended. A missing or unparsable prior document is treated as an
/// empty history, logged at `warn`, never an error.
fn append_history(dir: &ffi::OsStr, fragment: &str) -> Result<()> {
    let path = Path::new(dir).join(HISTORY_FILE);

    let prior_body = match fs::read_to_string(&path) {
        Ok(text) => strip_history_wrapper(&text).unwrap_or_else(|| {
            log::warn!("history.xml at {:?} is not well-formed, discarding its body", path);
            String::new()
        }),
        Err(_) => String::new(),
    };

    let mut combined = String::new();
    combined.push_str("<history>\n");
    combined.push_str(&prior_body);
    combined.push_str(fragment);
    combined.push_str("</history>\n");

    let os_path: &ffi::OsStr = path.as_os_str();
    use std::io::Write;
    let mut file = crate::util::create_file_a(os_path)?;
    err_at!(IOError, file.write_all(combined.as_bytes()))?;
    err_at!(IOError, file.sync_all())
}

fn strip_history_wrapper(text: &str) -> Option<String> {
    let start = text.find("<history>")? + "<history>".len();
    let end = text.rfind("</history>")?;
    if start > end {
        return None;
    }
    Some(text[start..end].to_string())
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl ChangeLog {
    /// `(field_name, value)` pairs for every non-zero counter, in the
    /// same order [ChangeLog::report] uses.
    pub(crate) fn nonzero_fields(&self) -> Vec<(&'static str, u64)> {
        let all = [
            ("hashes_inserted", self.hashes_inserted),
            (
                "hashes_not_inserted_mismatched_hash_block_size",
                self.hashes_not_inserted_mismatched_hash_block_size,
            ),
            (
                "hashes_not_inserted_invalid_byte_alignment",
                self.hashes_not_inserted_invalid_byte_alignment,
            ),
            (
                "hashes_not_inserted_exceeds_max_duplicates",
                self.hashes_not_inserted_exceeds_max_duplicates,
            ),
            (
                "hashes_not_inserted_duplicate_element",
                self.hashes_not_inserted_duplicate_element,
            ),
            ("hashes_removed", self.hashes_removed),
            (
                "hashes_not_removed_mismatched_hash_block_size",
                self.hashes_not_removed_mismatched_hash_block_size,
            ),
            (
                "hashes_not_removed_invalid_byte_alignment",
                self.hashes_not_removed_invalid_byte_alignment,
            ),
            ("hashes_not_removed_no_hash", self.hashes_not_removed_no_hash),
            ("hashes_not_removed_no_element", self.hashes_not_removed_no_element),
            ("source_metadata_inserted", self.source_metadata_inserted),
            (
                "source_metadata_not_inserted_already_present",
                self.source_metadata_not_inserted_already_present,
            ),
        ];
        all.into_iter().filter(|(_, v)| *v != 0).collect()
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;
