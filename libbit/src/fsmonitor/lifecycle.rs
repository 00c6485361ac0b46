//! the state machine governing whether fsmonitor is "on" for an index, and the two
//! transitions into and out of that state (`disabled -> fresh -> current`).
//!
//! `reconcile` is called once per index load and drives the whole thing: it either
//! brings a freshly-enabled index up to `fresh` (every live entry marked clean,
//! speculatively, since we have no token history to say otherwise yet) or takes a
//! `fresh`/`current` index that was loaded with a persisted dirty bitmap and folds that
//! bitmap into entry state, landing it at `current`.

use crate::error::BitResult;
use crate::fsmonitor::{FsmConfig, FsmMode, FsmState};
use crate::index::{BitIndexInner, IndexChangeFlags};
use std::time::{SystemTime, UNIX_EPOCH};

/// transitions `inner` into whatever state `config` calls for. idempotent: calling this
/// again with the same config and no intervening refresh is a no-op.
pub fn reconcile(inner: &mut BitIndexInner, config: &FsmConfig) -> BitResult<()> {
    match config.mode {
        FsmMode::Disabled => disable(inner),
        FsmMode::Hook | FsmMode::Ipc =>
            if inner.fsm.is_active() {
                apply_persisted_bitmap(inner);
            } else {
                enable(inner);
            },
    }
    Ok(())
}

/// `disabled -> fresh`: seeds a token and speculatively marks every non-submodule entry
/// clean, since there is nothing yet to say otherwise. a no-op if already active.
pub fn enable(inner: &mut BitIndexInner) {
    if inner.fsm.is_active() {
        return;
    }

    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    inner.fsm.last_token = Some(FsmState::seed_token(nanos));
    inner.fsm.dirty_bitmap = None;
    inner.fsm.has_run_once = false;
    inner.mark_all_clean_except_submodules();
    if let Some(untracked) = &mut inner.untracked {
        untracked.use_fsm = true;
    }
    inner.changed |= IndexChangeFlags::FSM_CHANGED;
}

/// `fresh`/`current -> disabled`: drops all fsmonitor state. entries keep whatever CLEAN
/// bits they had; fsmonitor being off just means nothing consults them anymore. a no-op
/// if already inactive.
pub fn disable(inner: &mut BitIndexInner) {
    if !inner.fsm.is_active() {
        return;
    }

    inner.fsm = FsmState::default();
    inner.changed |= IndexChangeFlags::FSM_CHANGED;
}

/// `fresh -> current`: folds a just-loaded persisted dirty bitmap into entry state, then
/// consumes it — after this call `inner.fsm.dirty_bitmap` is always `None`, whether or not
/// one was present.
fn apply_persisted_bitmap(inner: &mut BitIndexInner) {
    inner.mark_all_clean_except_submodules();

    let bitmap = match inner.fsm.dirty_bitmap.take() {
        Some(bitmap) => bitmap,
        None => return,
    };

    let mut skipped = 0u32;
    for (i, entry) in inner.ordered_entries_mut().enumerate() {
        if entry.is_removed() {
            skipped += 1;
            continue;
        }
        if bitmap.contains(i as u32 - skipped) {
            entry.set_clean(false);
        }
    }
}

#[cfg(test)]
mod tests;
