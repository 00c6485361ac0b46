use roaring::RoaringBitmap;
use std::cell::Cell;

/// per-index fsmonitor state: the last token we saw from the oracle, and (transiently,
/// between load and the first refresh) the bitmap of entry positions the previous
/// process left marked dirty.
///
/// `last_token` being `None` means fsmonitor is inactive for this index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FsmState {
    pub last_token: Option<String>,
    pub dirty_bitmap: Option<RoaringBitmap>,
    pub has_run_once: bool,
}

impl FsmState {
    pub fn is_active(&self) -> bool {
        self.last_token.is_some()
    }

    /// seed a freshly-enabled state with the current time as a v2-compatible token.
    pub fn seed_token(nanos_since_epoch: u128) -> String {
        nanos_since_epoch.to_string()
    }
}

/// process-local "warn once" guard, kept alongside [`FsmState`] (rather than as a global)
/// so tests constructing a fresh index never see stale warning state from another test.
#[derive(Debug, Default)]
pub struct FsmDiagnostics {
    warned_oracle_unavailable: Cell<bool>,
    warned_invalid_config: Cell<bool>,
}

impl FsmDiagnostics {
    pub fn warn_oracle_unavailable_once(&self) {
        if !self.warned_oracle_unavailable.replace(true) {
            warn!("fsmonitor oracle is unavailable, falling back to a full rescan");
        }
    }

    pub fn warn_invalid_config_once(&self, msg: &str) {
        if !self.warned_invalid_config.replace(true) {
            warn!("{}", msg);
        }
    }
}

// `Clone`/`PartialEq` would be misleading (the guard's whole point is mutable, process-local
// state) so `FsmDiagnostics` deliberately doesn't derive them.
