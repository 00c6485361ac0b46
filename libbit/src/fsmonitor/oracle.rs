//! uniform `query(token) -> QueryOutcome` over the two oracle backends.
//!
//! both backends are plain blocking calls (a unix socket round-trip, or spawning and
//! waiting on a child process) — there is no concurrency inside this core (see the
//! scheduling model), so there is nothing here for an async runtime to buy us.

use crate::error::BitResult;
use crate::fsmonitor::FsmConfig;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// sent in place of a real token when fsmonitor has never successfully queried before.
const NO_TOKEN_SENTINEL: &str = "builtin:fake";

/// initial read-buffer size hint; the oracle's response may be arbitrarily larger.
const RESPONSE_BUFFER_HINT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// the oracle has no information to give us; treat everything as possibly dirty.
    Trivial(String),
    /// `new_token` plus the NUL-delimited paths the oracle reported as changed.
    Paths(String, Vec<Vec<u8>>),
    Failed,
}

pub trait Oracle {
    /// `token` is `None` the first time fsmonitor queries (no prior state).
    fn query(&self, token: Option<&str>, workdir: &Path) -> BitResult<QueryOutcome>;

    /// same as [`Self::query`], but lets the caller pin a wire version on backends that
    /// support more than one. backends without such a notion (the IPC daemon) ignore
    /// `preferred` and fall back to [`Self::query`].
    fn query_preferring(
        &self,
        token: Option<&str>,
        workdir: &Path,
        preferred: Option<HookVersion>,
    ) -> BitResult<QueryOutcome> {
        let _ = preferred;
        self.query(token, workdir)
    }
}

/// splits a `new_token\0(path\0)*` (or, for v1, a bare `(path\0)*`) body into an outcome.
/// a lone `/\0` after the token is the "trivial" sentinel.
fn parse_body(new_token: String, body: &[u8]) -> QueryOutcome {
    if body.first() == Some(&b'/') {
        return QueryOutcome::Trivial(new_token);
    }
    let paths = body
        .split(|&b| b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.to_vec())
        .collect();
    QueryOutcome::Paths(new_token, paths)
}

/// talks to a long-lived daemon over a unix socket at a well-known path.
pub struct IpcOracle {
    pub socket_path: PathBuf,
}

impl Oracle for IpcOracle {
    fn query(&self, token: Option<&str>, _workdir: &Path) -> BitResult<QueryOutcome> {
        let token = token.unwrap_or(NO_TOKEN_SENTINEL);
        let outcome = (|| -> std::io::Result<QueryOutcome> {
            let mut stream = UnixStream::connect(&self.socket_path)?;
            stream.write_all(token.as_bytes())?;
            stream.write_all(&[0])?;
            stream.shutdown(std::net::Shutdown::Write)?;

            let mut buf = Vec::with_capacity(RESPONSE_BUFFER_HINT);
            stream.read_to_end(&mut buf)?;
            Ok(split_new_token(&buf))
        })();

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(_) => Ok(QueryOutcome::Failed),
        }
    }
}

fn split_new_token(buf: &[u8]) -> QueryOutcome {
    match buf.iter().position(|&b| b == 0) {
        Some(nul) => {
            let new_token = String::from_utf8_lossy(&buf[..nul]).into_owned();
            parse_body(new_token, &buf[nul + 1..])
        }
        None => QueryOutcome::Failed,
    }
}

/// spawns a one-shot hook process. supports both wire versions; the caller (C4) decides
/// which to try and whether to retry with the other on failure.
pub struct HookOracle {
    pub hook_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVersion {
    V1,
    V2,
}

impl HookOracle {
    pub fn query_version(
        &self,
        token: Option<&str>,
        workdir: &Path,
        version: HookVersion,
    ) -> BitResult<QueryOutcome> {
        let token = token.unwrap_or(NO_TOKEN_SENTINEL);
        let ver_arg = match version {
            HookVersion::V1 => "1",
            HookVersion::V2 => "2",
        };

        // v1 has no embedded new token in its response; take the clock reading that will
        // become the new token *before* spawning the hook, same as if the caller had done it.
        let pre_query_token = (version == HookVersion::V1).then(synthesize_token);

        let output =
            Command::new(&self.hook_path).arg(ver_arg).arg(token).current_dir(workdir).output();

        let output = match output {
            Ok(output) if output.status.success() => output,
            _ => return Ok(QueryOutcome::Failed),
        };

        Ok(match version {
            HookVersion::V1 => parse_body(pre_query_token.unwrap(), &output.stdout),
            HookVersion::V2 => match split_new_token(&output.stdout) {
                QueryOutcome::Trivial(token) if token.is_empty() => QueryOutcome::Failed,
                QueryOutcome::Paths(token, _) if token.is_empty() => QueryOutcome::Failed,
                outcome => outcome,
            },
        })
    }
}

impl Oracle for HookOracle {
    /// v2 is tried first; on failure we transparently retry with v1. callers that have a
    /// configured preference should go through [`Self::query_preferring`] instead.
    fn query(&self, token: Option<&str>, workdir: &Path) -> BitResult<QueryOutcome> {
        match self.query_version(token, workdir, HookVersion::V2)? {
            QueryOutcome::Failed => self.query_version(token, workdir, HookVersion::V1),
            outcome => Ok(outcome),
        }
    }

    fn query_preferring(
        &self,
        token: Option<&str>,
        workdir: &Path,
        preferred: Option<HookVersion>,
    ) -> BitResult<QueryOutcome> {
        match preferred {
            Some(version) => self.query_version(token, workdir, version),
            None => self.query(token, workdir),
        }
    }
}

/// resolves the configured backend, or `None` if fsmonitor is disabled.
pub fn oracle_for(config: &FsmConfig) -> Option<Box<dyn Oracle>> {
    match config.mode {
        crate::fsmonitor::FsmMode::Disabled => None,
        crate::fsmonitor::FsmMode::Ipc => {
            Some(Box::new(IpcOracle { socket_path: default_ipc_socket_path() }))
        }
        crate::fsmonitor::FsmMode::Hook => config
            .hook_path
            .clone()
            .map(|hook_path| Box::new(HookOracle { hook_path }) as Box<dyn Oracle>),
    }
}

fn default_ipc_socket_path() -> PathBuf {
    std::env::temp_dir().join("fsmonitor.sock")
}

fn synthesize_token() -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    nanos.to_string()
}
