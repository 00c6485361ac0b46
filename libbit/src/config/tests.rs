use super::*;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), contents).unwrap();
    file
}

#[test]
fn test_config_reads_fsmonitor_settings() -> BitResult<()> {
    let file = write_config(
        r#"
[core]
	repositoryformatversion = 0
	filemode = true
	bare = false
	fsmonitor = .git/hooks/fsmonitor-watchman
	fsmonitorHookVersion = 2
"#,
    );

    BitConfig::with_local(file.path(), |config| {
        assert_eq!(config.filemode()?, true);
        assert_eq!(config.fsmonitor()?.as_deref(), Some(".git/hooks/fsmonitor-watchman"));
        assert_eq!(config.fsmonitorHookVersion()?, Some(2));
        Ok(())
    })
}

#[test]
fn test_config_missing_fsmonitor_key_is_none() -> BitResult<()> {
    let file = write_config(
        r#"
[core]
	repositoryformatversion = 0
"#,
    );

    BitConfig::with_local(file.path(), |config| {
        assert_eq!(config.fsmonitor()?, None);
        Ok(())
    })
}
