//! `hashdb`: a content-addressed block-hash database for digital
//! forensics. Hashes of fixed-size blocks of evidence media are
//! interned against a compact two-tier store -- a primary map for
//! hashes seen from exactly one source, a secondary multimap for
//! everything seen more than once -- fronted by an optional Bloom
//! filter so a scanning client can reject the overwhelming majority of
//! non-matching blocks without ever touching disk.
//!
//! The library is organized bottom-up: [encoding] packs one hash
//! record into a 64-bit word, [hash_store]/[dup_store] hold those
//! words, [interner] resolves source media to small integer ids,
//! [settings] and [history] manage the on-disk tuning document and
//! append-only change log, and [manager] composes all of it behind a
//! single [manager::Database] handle. [commands] is the CLI surface
//! built on top; [server] exposes the same primitives over a scan-only
//! TCP protocol for embedding in a stream scanner.

pub mod bloom;
pub mod changelog;
pub mod commands;
pub mod dup_store;
pub mod encoding;
mod error;
pub mod hash;
pub mod hash_store;
pub mod history;
pub mod interner;
pub mod iter;
pub mod manager;
pub mod scan;
pub mod server;
pub mod settings;
pub mod source_metadata;
pub mod util;

pub use crate::error::{Error, Result};

#[cfg(test)]
#[path = "scenarios_test.rs"]
mod scenarios_test;
