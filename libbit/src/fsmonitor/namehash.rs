//! case-insensitive filesystems fold a cluster of byte-distinct paths onto the same
//! directory entry. git's own index keeps a "name hash" table mapping a case-folded key
//! back to the canonical entries that share it, built once per status/checkout and
//! discarded. this core doesn't own that table; C3 is handed one through this trait so a
//! reported path can be mapped back to the entries it actually denotes regardless of the
//! case the oracle reported it in.

use crate::index::BitIndexEntry;
use crate::path::BitPath;

/// a case-insensitive path -> entries lookup, built and owned by the surrounding system.
pub trait NameHashLookup {
    /// all live entries whose path case-folds to the same key as `path`.
    fn name_hash_lookup(&self, path: BitPath) -> Vec<BitIndexEntry>;

    /// the canonical (on-disk-cased) form of a directory path, if any entry's ancestry
    /// case-folds to it.
    fn dir_name_hash_lookup(&self, path: BitPath) -> Option<BitPath>;
}

/// the lookup used when `core.ignorecase` is unset: every path is its own case-class.
pub struct CaseSensitive;

impl NameHashLookup for CaseSensitive {
    fn name_hash_lookup(&self, _path: BitPath) -> Vec<BitIndexEntry> {
        Vec::new()
    }

    fn dir_name_hash_lookup(&self, _path: BitPath) -> Option<BitPath> {
        None
    }
}
