mod index_entry;

use crate::error::BitResult;
use crate::fsmonitor::{self, FsmConfig, FsmDiagnostics, FsmState, UntrackedCache};
use crate::hash::{Oid, BIT_HASH_SIZE};
use crate::io::{HashWriter, ReadExt, WriteExt};
use crate::lockfile::{Lockfile, LockfileFlags};
use crate::path::BitPath;
use crate::repo::BitRepo;
use crate::serialize::{Deserialize, Serialize};
use crate::time::Timespec;
pub use index_entry::*;
use num_enum::TryFromPrimitive;
use sha1::Digest;
use std::convert::{TryFrom, TryInto};
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::fs::Metadata;
use std::io::{prelude::*, BufReader};
use std::ops::{Deref, DerefMut};
use std::os::unix::fs::PermissionsExt;

const BIT_INDEX_HEADER_SIG: &[u8; 4] = b"DIRC";
const BIT_INDEX_VERSION: u32 = 2;
const FSM_EXTENSION_SIG: [u8; 4] = *b"FSMN";

bitflags! {
    /// tracks which parts of the index have changed since load and therefore must be
    /// rewritten on save. `FSM_CHANGED` is currently the only reason, but this is
    /// intentionally a flag set (not a bool) as the host index has other rewrite
    /// triggers that sit outside fsmonitor's scope.
    #[derive(Default)]
    pub struct IndexChangeFlags: u32 {
        const FSM_CHANGED = 1 << 0;
    }
}

/// a repository's mode as the index understands it; not the full `FileMode` the object
/// model uses, but enough to detect submodule links, which is all fsmonitor cares about.
#[derive(Debug, PartialEq, Eq, Ord, PartialOrd, Hash, TryFromPrimitive, Copy, Clone)]
#[repr(u32)]
pub enum FileMode {
    REG     = 0o100644,
    EXEC    = 0o100755,
    LINK    = 0o120000,
    TREE    = 0o40000,
    GITLINK = 0o160000,
}

impl FileMode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn new(u: u32) -> Self {
        Self::try_from(u).unwrap_or_else(|_| panic!("invalid filemode `{:06o}`", u))
    }

    pub fn from_metadata(metadata: &Metadata) -> Self {
        if metadata.file_type().is_symlink() {
            Self::LINK
        } else if metadata.is_dir() {
            Self::TREE
        } else if metadata.permissions().mode() & 0o111 != 0 {
            Self::EXEC
        } else {
            Self::REG
        }
    }

    pub fn is_gitlink(self) -> bool {
        matches!(self, Self::GITLINK)
    }
}

impl Display for FileMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let n = self.as_u32();
        if f.alternate() { write!(f, "{:o}", n) } else { write!(f, "{:06o}", n) }
    }
}

impl Debug for FileMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[derive(Debug)]
pub struct BitIndex<'r> {
    pub repo: BitRepo<'r>,
    // index file may not yet exist
    mtime: Option<Timespec>,
    inner: BitIndexInner,
}

impl<'r> Deref for BitIndex<'r> {
    type Target = BitIndexInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'r> DerefMut for BitIndex<'r> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<'r> BitIndex<'r> {
    /// loads the index file if it exists, or starts from an empty one, then reconciles
    /// any persisted fsmonitor dirty bitmap against the live set of entries (C5).
    pub fn new(repo: BitRepo<'r>) -> BitResult<Self> {
        let inner = Self::load_inner(repo)?;
        let mtime = std::fs::metadata(repo.index_path()).as_ref().map(Timespec::mtime).ok();
        Ok(Self { repo, inner, mtime })
    }

    fn load_inner(repo: BitRepo<'r>) -> BitResult<BitIndexInner> {
        let path = repo.index_path();
        let mut inner = if path.as_path().exists() {
            BitIndexInner::deserialize_unbuffered(std::fs::File::open(path)?)?
        } else {
            BitIndexInner::default()
        };

        let fsm_config = FsmConfig::resolve(&repo.config(), &inner.fsm_diag)?;
        fsmonitor::lifecycle::reconcile(&mut inner, &fsm_config)?;
        Ok(inner)
    }

    /// discards in-memory mutations by reloading straight from disk.
    pub fn rollback(&mut self) {
        if let Ok(inner) = Self::load_inner(self.repo) {
            self.inner = inner;
        }
    }

    /// persists the index, refreshing the fsmonitor extension from the current
    /// entries' clean bits.
    pub fn write(&mut self) -> BitResult<()> {
        let path = self.repo.index_path();
        Lockfile::with_mut(path, LockfileFlags::empty(), |lockfile| {
            self.inner.serialize(lockfile)
        })
    }
}

// refer to https://github.com/git/git/blob/master/Documentation/technical/index-format.txt
// for the format of the index
#[derive(Debug, Default)]
pub struct BitIndexInner {
    /// sorted ascending by filepath (interpreted as unsigned bytes), ties broken by stage
    entries: BitIndexEntries,
    /// extensions other than `FSMN`, kept around opaquely and passed through unchanged
    pub extensions: Vec<BitIndexExtension>,
    pub changed: IndexChangeFlags,
    pub fsm: FsmState,
    pub fsm_diag: FsmDiagnostics,
    pub untracked: Option<UntrackedCache>,
}

impl BitIndexInner {
    pub fn new(entries: BitIndexEntries, extensions: Vec<BitIndexExtension>) -> Self {
        Self { entries, extensions, ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// find entry by path
    pub fn find_entry(&self, path: BitPath, stage: MergeStage) -> Option<&BitIndexEntry> {
        self.entries.get(&(path, stage))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BitIndexEntry> {
        self.entries.values()
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.keys().any(|(_, stage)| stage.is_merging())
    }

    /// entries in on-disk order, restricted to the unmerged (`MergeStage::None`) set that
    /// the fsmonitor bitmap addresses by position (see [`crate::index::BitIndexInner::position_of`]).
    pub(crate) fn ordered_entries(&self) -> impl Iterator<Item = &BitIndexEntry> {
        self.entries.values().filter(|e| e.stage() == MergeStage::None)
    }

    pub(crate) fn ordered_entries_mut(&mut self) -> impl Iterator<Item = &mut BitIndexEntry> {
        self.entries.iter_mut().filter(|((_, stage), _)| *stage == MergeStage::None).map(|(_, e)| e)
    }

    /// returns the exact position of `path` among [`Self::ordered_entries`] if present,
    /// otherwise a negative insertion hint `-(i+1)`.
    // a sorted `Vec` would make this a binary search; we keep the teacher's `BTreeMap`
    // representation and pay for a linear scan, which is fine at index sizes this core
    // is tested against.
    pub(crate) fn position_of(&self, path: BitPath) -> isize {
        let mut pos = 0isize;
        for entry in self.ordered_entries() {
            match entry.path.cmp(&path) {
                std::cmp::Ordering::Less => pos += 1,
                std::cmp::Ordering::Equal => return pos,
                std::cmp::Ordering::Greater => break,
            }
        }
        -pos - 1
    }

    /// clears the CLEAN bit of every entry that currently has it set; returns the number
    /// of entries touched (used to detect whether `FSM_CHANGED` must be set). submodules
    /// are never CLEAN in the first place (see [`Self::mark_all_clean_except_submodules`])
    /// so this naturally leaves them untouched.
    pub(crate) fn mark_all_dirty(&mut self) -> usize {
        let mut changed = 0;
        for entry in self.ordered_entries_mut() {
            if entry.is_clean() {
                entry.set_clean(false);
                changed += 1;
            }
        }
        changed
    }

    /// sets the CLEAN bit of every non-submodule, non-removed entry (speculative mark
    /// performed before reconciling a persisted dirty bitmap, or on `enable`).
    pub(crate) fn mark_all_clean_except_submodules(&mut self) {
        for entry in self.ordered_entries_mut() {
            if !entry.is_submodule() {
                entry.set_clean(true);
            }
        }
    }

    /// builds the bitmap to persist: bit `i - skipped` is set for the `i`-th entry (in
    /// order) whose CLEAN bit is *not* set, skipping REMOVED entries entirely so that
    /// bitmap positions stay dense (§4.1 "build-the-bitmap-to-write").
    pub(crate) fn fill_dirty_bitmap(&self) -> roaring::RoaringBitmap {
        let mut bitmap = roaring::RoaringBitmap::new();
        let mut skipped = 0u32;
        for (i, entry) in self.ordered_entries().enumerate() {
            if entry.is_removed() {
                skipped += 1;
                continue;
            }
            if !entry.is_clean() {
                bitmap.insert(i as u32 - skipped);
            }
        }
        bitmap
    }
}

impl BitIndexInner {
    fn parse_header(r: &mut impl BufRead) -> BitResult<BitIndexHeader> {
        let mut signature = [0u8; 4];
        r.read_exact(&mut signature)?;
        assert_eq!(&signature, BIT_INDEX_HEADER_SIG);
        let version = r.read_u32()?;
        ensure!(version == 2, "only index format v2 is supported");
        let entryc = r.read_u32()?;

        Ok(BitIndexHeader { signature, version, entryc })
    }

    fn parse_extensions(mut buf: &[u8]) -> BitResult<Vec<BitIndexExtension>> {
        let mut extensions = vec![];
        while buf.len() > BIT_HASH_SIZE {
            let signature: [u8; 4] = buf[0..4].try_into().unwrap();
            let size = u32::from_be_bytes(buf[4..8].try_into().unwrap());
            let data = buf[8..8 + size as usize].to_vec();
            extensions.push(BitIndexExtension { signature, size, data });
            buf = &buf[8 + size as usize..];
        }
        Ok(extensions)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BitIndexHeader {
    signature: [u8; 4],
    version: u32,
    entryc: u32,
}

impl Default for BitIndexHeader {
    fn default() -> Self {
        Self { signature: *BIT_INDEX_HEADER_SIG, version: BIT_INDEX_VERSION, entryc: 0 }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct BitIndexExtension {
    pub signature: [u8; 4],
    pub size: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq, Ord, PartialOrd, Hash, TryFromPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum MergeStage {
    /// not merging
    None   = 0,
    Stage1 = 1,
    Stage2 = 2,
    Stage3 = 3,
}

impl Default for MergeStage {
    fn default() -> Self {
        Self::None
    }
}

impl MergeStage {
    pub fn is_merging(self) -> bool {
        self as u8 > 0
    }
}

impl Display for MergeStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl Serialize for BitIndexHeader {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        let Self { signature, version, entryc } = self;
        writer.write_all(signature)?;
        writer.write_all(&version.to_be_bytes())?;
        writer.write_all(&entryc.to_be_bytes())?;
        Ok(())
    }
}

impl Serialize for BitIndexExtension {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        writer.write_all(&self.signature)?;
        writer.write_u32(self.size)?;
        writer.write_all(&self.data)?;
        Ok(())
    }
}

impl Serialize for BitIndexInner {
    fn serialize(&self, writer: &mut dyn Write) -> BitResult<()> {
        let mut hash_writer = HashWriter::new_sha1(writer);

        let header = BitIndexHeader {
            signature: *BIT_INDEX_HEADER_SIG,
            version: BIT_INDEX_VERSION,
            entryc: self.entries.len() as u32,
        };
        header.serialize(&mut hash_writer)?;

        for entry in self.entries.values() {
            entry.serialize(&mut hash_writer)?;
        }

        for extension in &self.extensions {
            extension.serialize(&mut hash_writer)?;
        }

        // the fsmonitor extension is present iff fsmonitor is active (`last_token` set);
        // it is always rebuilt fresh from the live entries, never copied from what we loaded.
        if let Some(token) = &self.fsm.last_token {
            let bitmap = self.fill_dirty_bitmap();
            let data = fsmonitor::write_extension(token, &bitmap)?;
            let extension =
                BitIndexExtension { signature: FSM_EXTENSION_SIG, size: data.len() as u32, data };
            extension.serialize(&mut hash_writer)?;
        }

        hash_writer.write_hash()?;
        Ok(())
    }
}

impl Deserialize for BitIndexInner {
    fn deserialize(r: &mut impl BufRead) -> BitResult<Self>
    where
        Self: Sized,
    {
        // this impl currently has to read the whole stream twice: once to hash it, and
        // once (from memory) to parse the entries/extensions out of it
        let mut buf = vec![];
        r.read_to_end(&mut buf)?;

        let mut r = BufReader::new(&buf[..]);
        let header = Self::parse_header(&mut r)?;
        let entries: BitIndexEntries = (0..header.entryc)
            .map(|_| BitIndexEntry::deserialize(&mut r))
            .collect::<Result<Vec<BitIndexEntry>, _>>()?
            .into_iter()
            .collect();

        let mut remainder = vec![];
        assert!(r.read_to_end(&mut remainder)? >= BIT_HASH_SIZE);
        let mut extensions = Self::parse_extensions(&remainder)?;

        let (bytes, hash) = buf.split_at(buf.len() - BIT_HASH_SIZE);
        let mut hasher = sha1::Sha1::new();
        hasher.update(bytes);
        let actual_hash = Oid::from(hasher.finalize());
        let expected_hash = Oid::new(hash.try_into().unwrap());
        ensure_eq!(actual_hash, expected_hash, "corrupted index (bad hash)");

        let mut bit_index = Self::new(entries, vec![]);

        // peel the `FSMN` extension out of the opaque list, if present; everything else
        // is kept passthrough.
        if let Some(i) = extensions.iter().position(|ext| ext.signature == FSM_EXTENSION_SIG) {
            let fsm_extension = extensions.remove(i);
            match fsmonitor::read_extension(&fsm_extension.data, bit_index.len()) {
                Ok((token, dirty_bitmap)) => {
                    bit_index.fsm.last_token = Some(token);
                    bit_index.fsm.dirty_bitmap = Some(dirty_bitmap);
                }
                Err(err) => warn!("discarding corrupt fsmonitor extension: {}", err),
            }
        }
        bit_index.extensions = extensions;

        Ok(bit_index)
    }
}

#[cfg(test)]
mod tests;
