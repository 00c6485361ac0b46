//! filesystem-monitor integration: avoids full worktree scans by asking an external
//! oracle (a long-lived daemon over IPC, or a one-shot hook process) which paths have
//! possibly changed since the last time we asked, and using that to selectively clear
//! the index's per-entry "clean" bit.
//!
//! C1 lives in [`extension`] (the on-disk blob), C2 in [`oracle`], C3 in [`invalidate`],
//! C4 in [`refresh`] and C5 in [`lifecycle`].

mod extension;
mod invalidate;
pub(crate) mod lifecycle;
mod namehash;
mod oracle;
mod refresh;
mod state;
mod untracked;

pub use extension::{read_extension, write_extension};
pub use invalidate::invalidate_path;
pub use namehash::NameHashLookup;
pub use oracle::{oracle_for, HookOracle, IpcOracle, Oracle, QueryOutcome};
pub use refresh::refresh;
pub use state::{FsmDiagnostics, FsmState};
pub use untracked::UntrackedCache;

use crate::config::Config;
use crate::error::BitResult;
use git_config::values::Boolean;
use std::convert::TryFrom;
use std::path::PathBuf;

/// processing more than this many paths in a single refresh forces the extension to be
/// rewritten (and the now much shorter token persisted), instead of accumulating an
/// ever-growing replay on every subsequent invocation.
pub(crate) const FORCE_THRESHOLD: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmMode {
    Disabled,
    Hook,
    Ipc,
}

impl Default for FsmMode {
    fn default() -> Self {
        Self::Disabled
    }
}

/// resolved configuration handed to the core by the surrounding system; independent of
/// how it was sourced (here, from `core.fsmonitor`/`core.fsmonitorHookVersion` via
/// [`crate::config::BitConfig`]).
#[derive(Debug, Clone, Default)]
pub struct FsmConfig {
    pub mode: FsmMode,
    pub hook_path: Option<PathBuf>,
    /// `None` means "no preference"; only `Some(1)` and `Some(2)` are ever installed here,
    /// anything else was already downgraded to `None` with a warning in [`Self::resolve`].
    pub hook_version: Option<u8>,
    pub case_insensitive: bool,
    /// set by the surrounding system to explain why fsmonitor was turned off on this
    /// platform/filesystem even though the user asked for it; surfaced as a one-time warning.
    pub incompatible_reason: Option<String>,
}

impl FsmConfig {
    pub fn resolve(config: &Config<'_>, diag: &FsmDiagnostics) -> BitResult<Self> {
        let case_insensitive = config.ignorecase()?.unwrap_or(false);

        let mode_value = config.fsmonitor()?;
        let (mode, hook_path) = match mode_value {
            None => (FsmMode::Disabled, None),
            Some(value) => match Boolean::try_from(value.clone()) {
                Ok(Boolean::True(_)) => (FsmMode::Ipc, None),
                Ok(Boolean::False(_)) => (FsmMode::Disabled, None),
                Err(_) => (FsmMode::Hook, Some(PathBuf::from(value))),
            },
        };

        let hook_version = match config.fsmonitorHookVersion()? {
            None => None,
            Some(1) => Some(1),
            Some(2) => Some(2),
            Some(other) => {
                diag.warn_invalid_config_once(&format!(
                    "`core.fsmonitorHookVersion` has unrecognized value `{}`, ignoring",
                    other
                ));
                None
            }
        };

        Ok(Self { mode, hook_path, hook_version, case_insensitive, incompatible_reason: None })
    }
}

#[cfg(test)]
mod tests;
