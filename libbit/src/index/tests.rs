use super::*;
use crate::fsmonitor::{read_extension, write_extension};
use std::iter::FromIterator;

fn entry(path: &str) -> BitIndexEntry {
    let path = BitPath::intern_str(path);
    BitIndexEntry {
        ctime: Timespec::zero(),
        mtime: Timespec::zero(),
        device: 0,
        inode: 0,
        mode: FileMode::REG,
        uid: 0,
        gid: 0,
        filesize: 0,
        oid: Oid::UNKNOWN,
        flags: BitIndexEntryFlags::with_path_len(path.len()),
        path,
        runtime_flags: Default::default(),
    }
}

#[test]
fn filemode_round_trips_through_its_octal_encoding() {
    for mode in [FileMode::REG, FileMode::EXEC, FileMode::LINK, FileMode::TREE, FileMode::GITLINK] {
        assert_eq!(FileMode::new(mode.as_u32()), mode);
    }
}

#[test]
fn only_gitlink_is_a_submodule() {
    let mut e = entry("sub");
    e.mode = FileMode::GITLINK;
    assert!(e.is_submodule());

    let mut e = entry("file");
    e.mode = FileMode::REG;
    assert!(!e.is_submodule());
}

#[test]
fn position_of_finds_exact_and_insertion_points() {
    let entries = BitIndexEntries::from_iter(vec![entry("b.txt"), entry("d.txt")]);
    let inner = BitIndexInner::new(entries, vec![]);

    assert_eq!(inner.position_of(BitPath::intern_str("b.txt")), 0);
    assert_eq!(inner.position_of(BitPath::intern_str("d.txt")), 1);

    // "a.txt" sorts before everything: insertion hint -(0+1)
    assert_eq!(inner.position_of(BitPath::intern_str("a.txt")), -1);
    // "c.txt" sorts between "b.txt" and "d.txt": insertion hint -(1+1)
    assert_eq!(inner.position_of(BitPath::intern_str("c.txt")), -2);
    // "e.txt" sorts after everything: insertion hint -(2+1)
    assert_eq!(inner.position_of(BitPath::intern_str("e.txt")), -3);
}

#[test]
fn fill_dirty_bitmap_skips_removed_entries_and_compacts_positions() {
    let mut entries = vec![entry("a.txt"), entry("b.txt"), entry("c.txt")];
    entries[0].set_clean(true);
    entries[1].runtime_flags |= RuntimeEntryFlags::REMOVED; // dirty, but excluded
    // entries[2] left dirty (not clean)

    let inner = BitIndexInner::new(BitIndexEntries::from_iter(entries), vec![]);
    let bitmap = inner.fill_dirty_bitmap();

    // only "c.txt" is both live and dirty; it occupies compacted position 1 (since
    // "b.txt" was removed and doesn't consume a bitmap slot)
    assert_eq!(bitmap.len(), 1);
    assert!(bitmap.contains(1));
}

#[test]
fn serialize_embeds_and_deserialize_recovers_the_fsmonitor_extension() -> BitResult<()> {
    let mut entries = vec![entry("a.txt"), entry("b.txt")];
    entries[0].set_clean(true);

    let mut inner = BitIndexInner::new(BitIndexEntries::from_iter(entries), vec![]);
    inner.fsm.last_token = Some("deadbeef".into());

    let mut buf = vec![];
    inner.serialize(&mut buf)?;

    let reloaded = BitIndexInner::deserialize_unbuffered(&buf[..])?;
    assert_eq!(reloaded.fsm.last_token.as_deref(), Some("deadbeef"));
    assert!(!reloaded.find_entry(BitPath::intern_str("a.txt"), MergeStage::None).unwrap().is_clean());
    assert!(!reloaded.find_entry(BitPath::intern_str("b.txt"), MergeStage::None).unwrap().is_clean());
    Ok(())
}

#[test]
fn serialize_omits_the_extension_when_fsmonitor_is_inactive() -> BitResult<()> {
    let inner = BitIndexInner::new(BitIndexEntries::from_iter(vec![entry("a.txt")]), vec![]);
    let mut buf = vec![];
    inner.serialize(&mut buf)?;

    let reloaded = BitIndexInner::deserialize_unbuffered(&buf[..])?;
    assert!(reloaded.fsm.last_token.is_none());
    Ok(())
}

#[test]
fn a_corrupt_extension_is_discarded_without_failing_the_whole_load() -> BitResult<()> {
    let mut inner = BitIndexInner::new(BitIndexEntries::from_iter(vec![entry("a.txt")]), vec![]);
    inner.fsm.last_token = Some("tok".into());

    let mut buf = vec![];
    inner.serialize(&mut buf)?;

    // corrupt the fsmonitor extension's version field in place; find the `FSMN` tag and
    // stomp the byte right after its 4-byte size field (the version's low byte).
    let tag_pos = buf.windows(4).position(|w| w == *b"FSMN").unwrap();
    buf[tag_pos + 8] = 0xff;

    let reloaded = BitIndexInner::deserialize_unbuffered(&buf[..])?;
    assert!(reloaded.fsm.last_token.is_none());
    assert_eq!(reloaded.len(), 1);
    Ok(())
}

#[test]
fn extension_helpers_round_trip_through_the_index_module() -> BitResult<()> {
    let bitmap = roaring::RoaringBitmap::new();
    let data = write_extension("tok", &bitmap)?;
    let (token, decoded) = read_extension(&data, 0)?;
    assert_eq!(token, "tok");
    assert_eq!(decoded, bitmap);
    Ok(())
}
