//! Forward-only, single-pass iteration over the primary store, expanding
//! count-shape entries via the duplicates store (spec §4.7 "Iteration").
//!
//! No snapshot guarantee: a concurrent writer may be observed mid-walk.
//! This is a plain iterator over borrowed stores rather than a method on
//! [crate::manager::Database] so it composes with any [HashStore] impl.

use crate::{
    dup_store::DupStore,
    encoding::{self, PackedEncoding},
    hash_store::HashStore,
    Result,
};

/// One expanded record: the raw hash bytes, the source id, and the
/// block offset.
pub type Triple = (Vec<u8>, u64, u64);

/// Walk `hash_store` in key order, expanding every count-shape entry
/// into its `n` constituent triples via `dup_store` before advancing.
pub fn iter_triples<'a>(
    hash_store: &'a dyn HashStore,
    dup_store: &'a DupStore,
    k: u32,
) -> impl Iterator<Item = Result<Triple>> + 'a {
    hash_store.iter().flat_map(move |(h, e)| -> Vec<Result<Triple>> {
        match encoding::decode(k, e) {
            Err(err) => vec![Err(err)],
            Ok(PackedEncoding::Singleton { source_id, block_offset }) => {
                vec![Ok((h, source_id, block_offset))]
            }
            Ok(PackedEncoding::Count(_)) => match dup_store.values_for(&h) {
                Err(err) => vec![Err(err)],
                Ok(words) => words
                    .into_iter()
                    .map(|word| match encoding::decode(k, word) {
                        Ok(PackedEncoding::Singleton { source_id, block_offset }) => {
                            Ok((h.clone(), source_id, block_offset))
                        }
                        Ok(PackedEncoding::Count(_)) => {
                            crate::err_at!(Corruption, msg: "duplicates entry for {:?} is count-shape", h)
                        }
                        Err(err) => Err(err),
                    })
                    .collect(),
            },
        }
    })
}

#[cfg(test)]
#[path = "iter_test.rs"]
mod iter_test;
