use super::*;
use crate::fsmonitor::FsmMode;
use crate::hash::Oid;
use crate::index::{BitIndexEntries, BitIndexEntry, BitIndexEntryFlags, FileMode};
use crate::path::BitPath;
use crate::time::Timespec;
use roaring::RoaringBitmap;
use std::iter::FromIterator;

fn entry(path: &str, mode: FileMode) -> BitIndexEntry {
    let path = BitPath::intern_str(path);
    BitIndexEntry {
        ctime: Timespec::zero(),
        mtime: Timespec::zero(),
        device: 0,
        inode: 0,
        mode,
        uid: 0,
        gid: 0,
        filesize: 0,
        oid: Oid::UNKNOWN,
        flags: BitIndexEntryFlags::with_path_len(path.len()),
        path,
        runtime_flags: Default::default(),
    }
}

fn inner_with(paths: &[(&str, FileMode)]) -> BitIndexInner {
    let entries = BitIndexEntries::from_iter(paths.iter().map(|(p, m)| entry(p, *m)));
    BitIndexInner::new(entries, vec![])
}

#[test]
fn enable_seeds_a_token_and_marks_non_submodules_clean() {
    let mut inner = inner_with(&[("a.txt", FileMode::REG), ("sub", FileMode::GITLINK)]);
    enable(&mut inner);

    assert!(inner.fsm.is_active());
    assert!(inner.changed.contains(IndexChangeFlags::FSM_CHANGED));
    assert!(inner.find_entry(BitPath::intern_str("a.txt"), crate::index::MergeStage::None).unwrap().is_clean());
    assert!(!inner.find_entry(BitPath::intern_str("sub"), crate::index::MergeStage::None).unwrap().is_clean());
}

#[test]
fn enable_is_idempotent() {
    let mut inner = inner_with(&[("a.txt", FileMode::REG)]);
    enable(&mut inner);
    let token = inner.fsm.last_token.clone();
    enable(&mut inner);
    assert_eq!(inner.fsm.last_token, token);
}

#[test]
fn disable_clears_fsm_state() {
    let mut inner = inner_with(&[("a.txt", FileMode::REG)]);
    enable(&mut inner);
    disable(&mut inner);
    assert!(!inner.fsm.is_active());
}

#[test]
fn reconcile_enables_when_config_wants_it_and_index_was_inactive() -> BitResult<()> {
    let mut inner = inner_with(&[("a.txt", FileMode::REG)]);
    let config = FsmConfig { mode: FsmMode::Ipc, ..Default::default() };
    reconcile(&mut inner, &config)?;
    assert!(inner.fsm.is_active());
    Ok(())
}

#[test]
fn reconcile_disables_when_config_says_disabled() -> BitResult<()> {
    let mut inner = inner_with(&[("a.txt", FileMode::REG)]);
    enable(&mut inner);
    let config = FsmConfig { mode: FsmMode::Disabled, ..Default::default() };
    reconcile(&mut inner, &config)?;
    assert!(!inner.fsm.is_active());
    Ok(())
}

#[test]
fn reconcile_applies_a_persisted_bitmap_and_consumes_it() -> BitResult<()> {
    let mut inner = inner_with(&[("a.txt", FileMode::REG), ("b.txt", FileMode::REG)]);
    inner.fsm.last_token = Some("tok".into());
    let mut bitmap = RoaringBitmap::new();
    bitmap.insert(1);
    inner.fsm.dirty_bitmap = Some(bitmap);

    let config = FsmConfig { mode: FsmMode::Ipc, ..Default::default() };
    reconcile(&mut inner, &config)?;

    assert!(inner.find_entry(BitPath::intern_str("a.txt"), crate::index::MergeStage::None).unwrap().is_clean());
    assert!(!inner.find_entry(BitPath::intern_str("b.txt"), crate::index::MergeStage::None).unwrap().is_clean());
    assert!(inner.fsm.dirty_bitmap.is_none());
    Ok(())
}
