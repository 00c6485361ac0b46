//! the untracked-cache is a sibling index extension that records which directories are
//! known to contain no untracked files, so status can skip rereading them. fsmonitor
//! interacts with it in exactly two ways: flipping whether it trusts fsmonitor-driven
//! invalidation at all, and being told a single path no longer qualifies as "known clean".
//! the cache's own directory bookkeeping lives outside this core; we only model the
//! surface fsmonitor actually calls.

use crate::path::BitPath;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UntrackedCache {
    /// mirrors `core.untrackedcache`'s "true" setting: once fsmonitor has completed a run,
    /// the untracked-cache is allowed to trust fsmonitor's invalidation instead of stat-ing
    /// every directory itself.
    pub use_fsm: bool,
}

impl UntrackedCache {
    pub fn new(use_fsm: bool) -> Self {
        Self { use_fsm }
    }

    /// drop any cached "directory has no untracked files" fact that covers `path`.
    ///
    /// the real cache indexes by directory and has to walk up to the nearest cached
    /// ancestor; this core has no such index to walk, so it is a no-op unless fsmonitor
    /// is the trusted source, in which case the caller (C3) is exactly the trigger that
    /// would otherwise have come from a full directory stat.
    pub fn invalidate_path(&mut self, _path: BitPath) {
        debug_assert!(self.use_fsm, "invalidate_path called while fsmonitor untrusted");
    }
}
