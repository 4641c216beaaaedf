// tests/file_watching.rs
mod common;
use crate::common::{init_tracing, test_app, wait_for_event, with_timeout, FakeLauncher, TestConfigBuilder};

use std::error::Error;
use std::fs;
use std::time::Duration;

use testloop::app::AppEvent;

type TestResult = Result<(), Box<dyn Error>>;

/// Writing a matching source file triggers a run named after the file;
/// ignored files do not.
#[tokio::test]
async fn matching_change_triggers_a_run() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join("src/vendor"))?;
    let root = dir.path().to_path_buf();

    let config = TestConfigBuilder::dev()
        .overrides(|o| {
            o.disable_watching = Some(false);
            o.cwd = Some(root);
            o.src_files = Some(vec!["src/**/*.js".to_string()]);
            o.src_files_ignore = Some(vec!["src/vendor/**".to_string()]);
        })
        .build();
    let t = test_app(config, vec![FakeLauncher::passing("firefox").into_arc()]);
    let mut rx = t.app.subscribe();

    with_timeout(t.app.start()).await;
    wait_for_event(&mut rx, |e| matches!(e, AppEvent::RunFinished { run_id: 1, .. })).await;
    assert!(t.app.is_watching());

    // Give the platform watcher a moment to arm.
    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(dir.path().join("src/vendor/lib.js"), "ignored")?;
    fs::write(dir.path().join("README.md"), "ignored")?;
    fs::write(dir.path().join("src/app.js"), "console.log(1)")?;

    let started = wait_for_event(&mut rx, |e| matches!(e, AppEvent::RunStarted { run_id: 2, .. })).await;
    let AppEvent::RunStarted { reason, .. } = started else {
        unreachable!()
    };
    assert_eq!(reason, "File changed: src/app.js");

    with_timeout(t.app.exit(None)).await;
    assert!(!t.app.is_watching());
    Ok(())
}
