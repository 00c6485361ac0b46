use std::fmt::{self, Display, Formatter};

pub type BitResult<T> = Result<T, BitGenericError>;
pub type BitGenericError = anyhow::Error;

/// usually we can just use anyhow for errors, but sometimes its nice to have a "rust"
/// representation we can test or match against
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum FsmError {
    /// the on-disk extension or index state violates an invariant the reader relies on;
    /// the caller should fall back to a full rescan rather than trust the cache
    Corrupt(&'static str),
    /// the oracle (daemon or hook) could not be reached or returned garbage
    OracleUnavailable,
    /// a `core.fsmonitor*` config value could not be parsed
    InvalidConfig(String),
}

pub trait BitErrorExt {
    fn try_into_fsm_error(self) -> BitResult<FsmError>;
    fn try_into_corrupt_err(self) -> BitResult<&'static str>;
}

impl BitErrorExt for BitGenericError {
    fn try_into_fsm_error(self) -> BitResult<FsmError> {
        match self.downcast::<FsmError>() {
            Ok(err) => Ok(err),
            Err(cast_failed_err) => Err(cast_failed_err),
        }
    }

    fn try_into_corrupt_err(self) -> BitResult<&'static str> {
        match self.try_into_fsm_error()? {
            FsmError::Corrupt(msg) => Ok(msg),
            err => Err(anyhow!(err)),
        }
    }
}

pub trait BitResultExt {
    fn is_oracle_unavailable(&self) -> bool;
    fn is_fatal(&self) -> bool;
}

macro_rules! error_ext_is_method {
    ($method:ident) => {
        fn $method(&self) -> bool {
            match self {
                Ok(..) => false,
                Err(err) => err.$method(),
            }
        }
    };
}

impl<T> BitResultExt for BitResult<T> {
    error_ext_is_method!(is_oracle_unavailable);

    error_ext_is_method!(is_fatal);
}

impl BitResultExt for BitGenericError {
    fn is_oracle_unavailable(&self) -> bool {
        matches!(self.downcast_ref::<FsmError>(), Some(FsmError::OracleUnavailable))
    }

    /// `OracleUnavailable` is recoverable (fall back to full rescan); corrupt state and
    /// bad config are not something a caller should silently paper over
    fn is_fatal(&self) -> bool {
        match self.downcast_ref::<FsmError>() {
            Some(err) => !matches!(err, FsmError::OracleUnavailable),
            None => true,
        }
    }
}

impl Display for FsmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FsmError::Corrupt(msg) => write!(f, "corrupt fsmonitor state: {}", msg),
            FsmError::OracleUnavailable => write!(f, "fsmonitor oracle is unavailable"),
            FsmError::InvalidConfig(msg) => write!(f, "invalid fsmonitor configuration: {}", msg),
        }
    }
}

impl std::error::Error for FsmError {}
