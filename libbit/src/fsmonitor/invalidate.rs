//! maps one path reported by the oracle onto index entries and clears their CLEAN bit.
//!
//! the oracle reports bytes exactly as the filesystem gave them to it: a trailing `/`
//! means "this and everything under it", anything else names a single file (which, on a
//! case-insensitive filesystem, may not be byte-identical to what's stored in the index,
//! and may in fact name a directory the oracle didn't bother to slash-terminate).

use crate::fsmonitor::untracked::UntrackedCache;
use crate::fsmonitor::NameHashLookup;
use crate::index::{BitIndexEntry, BitIndexInner};
use crate::path::BitPath;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

/// invalidates whatever `raw_path` denotes, returning the number of entries whose CLEAN
/// bit was actually cleared (an already-dirty entry doesn't count twice).
pub fn invalidate_path(
    inner: &mut BitIndexInner,
    raw_path: &[u8],
    name_hash: &dyn NameHashLookup,
) -> usize {
    if raw_path.is_empty() {
        return invalidate_everything(inner);
    }

    let is_dir_report = raw_path.last() == Some(&b'/');
    let trimmed = if is_dir_report { &raw_path[..raw_path.len() - 1] } else { raw_path };
    let path = BitPath::intern(OsStr::from_bytes(trimmed));

    let cleared = if is_dir_report {
        invalidate_directory(inner, path, name_hash)
    } else {
        invalidate_file_or_ambiguous(inner, path, name_hash)
    };

    if cleared > 0 {
        if let Some(untracked) = &mut inner.untracked {
            untracked.invalidate_path(path);
        }
    }

    cleared
}

fn invalidate_everything(inner: &mut BitIndexInner) -> usize {
    inner.mark_all_dirty()
}

/// step 1: `raw_path` had a trailing slash; `dir` is that path with the slash stripped.
fn invalidate_directory(
    inner: &mut BitIndexInner,
    dir: BitPath,
    name_hash: &dyn NameHashLookup,
) -> usize {
    let cleared = prefix_walk(inner, dir);
    if cleared > 0 {
        return cleared;
    }
    icase_directory_fallback(inner, dir, name_hash)
}

/// step 1(e): the bytewise directory walk found nothing; try the case-folded lookups.
fn icase_directory_fallback(
    inner: &mut BitIndexInner,
    dir: BitPath,
    name_hash: &dyn NameHashLookup,
) -> usize {
    let reported = BitPath::from_bytes(&with_trailing_slash(dir));
    let candidates = name_hash.name_hash_lookup(reported);
    if !candidates.is_empty() {
        return clear_candidates(inner, &candidates);
    }

    // identical canonical name means no case correction is actually available here;
    // bail rather than recursing into ourselves forever.
    match name_hash.dir_name_hash_lookup(dir) {
        Some(canonical) if canonical != dir => prefix_walk(inner, canonical),
        _ => 0,
    }
}

/// step 2: `raw_path` had no trailing slash; it may name a live file, a directory the
/// oracle didn't bother to slash-terminate, or (case-insensitively) either of those under
/// a different spelling.
fn invalidate_file_or_ambiguous(
    inner: &mut BitIndexInner,
    path: BitPath,
    name_hash: &dyn NameHashLookup,
) -> usize {
    let pos = inner.position_of(path);
    if pos >= 0 {
        return clear_at(inner, pos as usize);
    }

    // step 2(c): not a live file under this exact name; maybe it names a directory.
    let cleared = prefix_walk(inner, path);
    if cleared > 0 {
        return cleared;
    }

    icase_file_fallback(inner, path, name_hash)
}

/// step 2(d): both the exact lookup and the directory walk missed; try the case-folded
/// file lookup, then the case-folded directory lookup.
fn icase_file_fallback(
    inner: &mut BitIndexInner,
    path: BitPath,
    name_hash: &dyn NameHashLookup,
) -> usize {
    let candidates = name_hash.name_hash_lookup(path);
    if !candidates.is_empty() {
        return clear_candidates(inner, &candidates);
    }

    match name_hash.dir_name_hash_lookup(path) {
        Some(canonical) if canonical != path => prefix_walk(inner, canonical),
        _ => 0,
    }
}

/// clears the CLEAN bit of the single entry at ordered position `pos`, if it still has one.
fn clear_at(inner: &mut BitIndexInner, pos: usize) -> usize {
    match inner.ordered_entries_mut().nth(pos) {
        Some(entry) if entry.is_clean() => {
            entry.set_clean(false);
            1
        }
        _ => 0,
    }
}

/// clears every live entry whose path is `dir` itself or nested under it (or, for sparse
/// directory entries, stored as `dir` with its own trailing slash). starts scanning from
/// `position_of(dir)`'s insertion hint rather than the whole table; entries sorting before
/// the prefix (e.g. a same-named file in a D/F conflict) are skipped, not stopped on.
fn prefix_walk(inner: &mut BitIndexInner, dir: BitPath) -> usize {
    let prefix = with_trailing_slash(dir);
    let start = insertion_point(inner.position_of(dir));

    let mut cleared = 0;
    for entry in inner.ordered_entries_mut().skip(start) {
        let bytes = entry.path.as_bytes();
        if bytes.starts_with(prefix.as_slice()) {
            if entry.is_clean() {
                entry.set_clean(false);
                cleared += 1;
            }
        } else if bytes < prefix.as_slice() {
            continue;
        } else {
            break;
        }
    }
    cleared
}

/// clears every live entry whose path matches one of the case-folded `candidates`.
fn clear_candidates(inner: &mut BitIndexInner, candidates: &[BitIndexEntry]) -> usize {
    let mut cleared = 0;
    for entry in inner.ordered_entries_mut() {
        if candidates.iter().any(|c| c.path == entry.path) && entry.is_clean() {
            entry.set_clean(false);
            cleared += 1;
        }
    }
    cleared
}

fn with_trailing_slash(path: BitPath) -> Vec<u8> {
    let mut bytes = path.as_bytes().to_vec();
    bytes.push(b'/');
    bytes
}

/// converts a [`BitIndexInner::position_of`] result into a walk-start index: exact matches
/// start there, negative insertion hints `-(i+1)` decode back to `i`.
fn insertion_point(p: isize) -> usize {
    if p >= 0 { p as usize } else { (-p - 1) as usize }
}
