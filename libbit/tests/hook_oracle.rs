//! exercises the real `HookOracle` against a tiny fixture hook script, rather than a
//! scripted `Oracle` impl, so the v1/v2 argv and stdout wire conventions get checked
//! against an actual spawned process.

use libbit::fsmonitor::{HookOracle, Oracle, QueryOutcome};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

/// writes `script` to a fresh tempdir as an executable hook and returns (tempdir, path).
/// the tempdir is returned so the caller keeps it alive for the test's duration.
fn fixture_hook(script: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hook.sh");
    let mut file = fs::File::create(&path).expect("create hook");
    file.write_all(script.as_bytes()).expect("write hook");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod hook");
    (dir, path)
}

#[test]
fn v2_hook_reports_changed_paths() {
    let (_dir, hook_path) = fixture_hook(
        "#!/bin/sh\n\
         printf 'newtoken\\0a.txt\\0b.txt\\0'\n",
    );
    let oracle = HookOracle { hook_path };
    let workdir = tempfile::tempdir().unwrap();

    let outcome = oracle.query(Some("oldtoken"), workdir.path()).unwrap();
    match outcome {
        QueryOutcome::Paths(token, paths) => {
            assert_eq!(token, "newtoken");
            assert_eq!(paths, vec![b"a.txt".to_vec(), b"b.txt".to_vec()]);
        }
        other => panic!("expected Paths outcome, got {other:?}"),
    }
}

#[test]
fn v2_hook_reporting_trivial_falls_back_to_everything_dirty() {
    let (_dir, hook_path) = fixture_hook(
        "#!/bin/sh\n\
         printf 'newtoken\\0/\\0'\n",
    );
    let oracle = HookOracle { hook_path };
    let workdir = tempfile::tempdir().unwrap();

    let outcome = oracle.query(None, workdir.path()).unwrap();
    assert_eq!(outcome, QueryOutcome::Trivial("newtoken".into()));
}

#[test]
fn a_failing_v2_invocation_is_retried_as_v1() {
    // argv[1] is the wire version ("2" then, on retry, "1"); only answer the v1 call.
    let (_dir, hook_path) = fixture_hook(
        "#!/bin/sh\n\
         if [ \"$1\" = \"1\" ]; then\n\
         printf 'c.txt\\0'\n\
         else\n\
         exit 1\n\
         fi\n",
    );
    let oracle = HookOracle { hook_path };
    let workdir = tempfile::tempdir().unwrap();

    let outcome = oracle.query(Some("sometoken"), workdir.path()).unwrap();
    match outcome {
        QueryOutcome::Paths(_token, paths) => assert_eq!(paths, vec![b"c.txt".to_vec()]),
        other => panic!("expected Paths outcome, got {other:?}"),
    }
}

#[test]
fn a_nonexecutable_or_missing_hook_reports_failed() {
    let missing = PathBuf::from("/nonexistent/path/to/hook");
    let oracle = HookOracle { hook_path: missing };
    let workdir = tempfile::tempdir().unwrap();

    let outcome = oracle.query(None, workdir.path()).unwrap();
    assert_eq!(outcome, QueryOutcome::Failed);
}
