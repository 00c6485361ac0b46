//! drives one refresh cycle: query the oracle, interpret what it says, invalidate the
//! paths it named, and decide what the persisted token/bitmap should look like afterwards.

use crate::error::BitResult;
use crate::fsmonitor::namehash::CaseSensitive;
use crate::fsmonitor::oracle::HookVersion;
use crate::fsmonitor::{FsmConfig, NameHashLookup, Oracle, QueryOutcome, FORCE_THRESHOLD};
use crate::index::{BitIndexInner, IndexChangeFlags};
use std::path::Path;

/// outcome of a single refresh, mostly useful to tests and callers that log/trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub paths_invalidated: usize,
    /// the oracle had nothing useful to say (fresh token, or hard failure) and every
    /// entry was conservatively marked dirty.
    pub forced_full_rescan: bool,
}

/// runs one refresh of `inner` against `oracle`, using `config` to pick the hook wire
/// version (when the user pinned one) and `name_hash` to resolve case-folded paths.
///
/// a no-op if fsmonitor isn't active for this index, or if a refresh already ran once
/// this process (`has_run_once`): the oracle is queried at most once per process lifetime.
pub fn refresh(
    inner: &mut BitIndexInner,
    oracle: &dyn Oracle,
    config: &FsmConfig,
    workdir: &Path,
    name_hash: &dyn NameHashLookup,
) -> BitResult<RefreshReport> {
    if !inner.fsm.is_active() || inner.fsm.has_run_once {
        return Ok(RefreshReport { paths_invalidated: 0, forced_full_rescan: false });
    }
    inner.fsm.has_run_once = true;

    let outcome = query(inner, oracle, config, workdir)?;
    debug!("fsmonitor refresh: query returned {:?}", outcome);

    let report = match outcome {
        QueryOutcome::Failed => {
            inner.fsm_diag.warn_oracle_unavailable_once();
            mark_everything_dirty(inner)
        }
        QueryOutcome::Trivial(new_token) => {
            let report = mark_everything_dirty(inner);
            inner.fsm.last_token = Some(new_token);
            report
        }
        QueryOutcome::Paths(new_token, paths) => {
            let name_hash: &dyn NameHashLookup =
                if config.case_insensitive { name_hash } else { &CaseSensitive };

            let mut cleared = 0;
            for path in &paths {
                cleared += crate::fsmonitor::invalidate::invalidate_path(inner, path, name_hash);
            }
            debug!("fsmonitor refresh: {} paths invalidated {} entries", paths.len(), cleared);

            if !paths.is_empty() {
                if let Some(untracked) = &mut inner.untracked {
                    untracked.use_fsm = true;
                }
            }

            // a huge delta forces an immediate rewrite with the new (much shorter) token,
            // rather than letting every future invocation replay this batch.
            if paths.len() > FORCE_THRESHOLD {
                inner.changed |= IndexChangeFlags::FSM_CHANGED;
            }

            inner.fsm.last_token = Some(new_token);
            RefreshReport { paths_invalidated: cleared, forced_full_rescan: false }
        }
    };

    Ok(report)
}

/// the "everything possibly dirty" path shared by a trivial response and an oracle
/// failure: clear every entry's CLEAN bit and stop trusting the untracked cache's own
/// fsmonitor-driven shortcuts until the next successful refresh repopulates it.
fn mark_everything_dirty(inner: &mut BitIndexInner) -> RefreshReport {
    let cleared = inner.mark_all_dirty();
    if cleared > 0 {
        inner.changed |= IndexChangeFlags::FSM_CHANGED;
    }
    if let Some(untracked) = &mut inner.untracked {
        untracked.use_fsm = false;
    }
    RefreshReport { paths_invalidated: cleared, forced_full_rescan: true }
}

fn query(
    inner: &BitIndexInner,
    oracle: &dyn Oracle,
    config: &FsmConfig,
    workdir: &Path,
) -> BitResult<QueryOutcome> {
    let token = inner.fsm.last_token.as_deref();
    let preferred = config.hook_version.map(to_hook_version);
    oracle.query_preferring(token, workdir, preferred)
}

fn to_hook_version(v: u8) -> HookVersion {
    match v {
        1 => HookVersion::V1,
        _ => HookVersion::V2,
    }
}
