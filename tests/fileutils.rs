// tests/fileutils.rs
mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;

use testloop::fs::{add_to_path, executable_exists, file_exists};
use testloop::types::EnvMap;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn file_exists_only_for_regular_files() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let file = dir.path().join("present.txt");
    fs::write(&file, "x")?;

    assert!(file_exists(&file).await);
    assert!(!file_exists(dir.path()).await, "a directory is not a file");
    assert!(!file_exists(dir.path().join("absent.txt")).await);
    Ok(())
}

#[tokio::test]
async fn unknown_executable_is_not_found() -> TestResult {
    init_tracing();

    let env = EnvMap::from([("PATH".to_string(), String::new())]);
    assert!(!executable_exists("surely-not-installed-anywhere", Some(&env)).await);
    assert!(!executable_exists("", None).await);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn executable_found_via_custom_path() -> TestResult {
    use std::os::unix::fs::PermissionsExt;

    init_tracing();

    let dir = tempfile::tempdir()?;
    let script = dir.path().join("fake-browser");
    fs::write(&script, "#!/bin/sh\nexit 0\n")?;

    let env = add_to_path(dir.path(), &EnvMap::new());
    assert!(
        !executable_exists("fake-browser", Some(&env)).await,
        "not executable yet"
    );

    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
    assert!(executable_exists("fake-browser", Some(&env)).await);
    assert!(executable_exists(&script.to_string_lossy(), None).await);
    Ok(())
}

#[test]
fn add_to_path_prepends() {
    let env = EnvMap::from([
        ("PATH".to_string(), "/usr/bin".to_string()),
        ("HOME".to_string(), "/home/me".to_string()),
    ]);
    let extended = add_to_path("/opt/tools", &env);

    let first = std::env::split_paths(&extended["PATH"]).next();
    assert_eq!(first.as_deref(), Some(std::path::Path::new("/opt/tools")));
    assert_eq!(extended["HOME"], "/home/me");
    assert_eq!(env["PATH"], "/usr/bin", "input is not modified");
}
