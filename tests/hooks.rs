// tests/hooks.rs
#![cfg(unix)]

mod common;
use crate::common::{
    init_tracing, test_app, wait_for_event, with_timeout, FakeLauncher, TestConfigBuilder,
};

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use testloop::app::AppEvent;
use testloop::config::{Hook, HookTable};
use testloop::hooks::{HookData, HookError, HookRunner};
use testloop::types::EnvMap;
use testloop_test_utils::builders::minimal_env;

type TestResult = Result<(), Box<dyn Error>>;

fn runner(config: TestConfigBuilder) -> HookRunner {
    let mut env = minimal_env();
    env.insert("TESTLOOP_GREETING".to_string(), "hello from env".to_string());
    HookRunner::with_base_env(Arc::new(config.build()), env)
}

#[tokio::test]
async fn shell_hook_sees_base_environment() -> TestResult {
    init_tracing();

    let hooks = runner(TestConfigBuilder::ci().command_hook("on_start", "echo $TESTLOOP_GREETING"));
    let output = with_timeout(hooks.run_hook("on_start", &HookData::new())).await?;

    assert_eq!(output.stdout.trim(), "hello from env");
    assert_eq!(hooks.tracked_count(), 0);
    Ok(())
}

#[tokio::test]
async fn exe_hook_sees_base_and_table_environment() -> TestResult {
    init_tracing();

    let table = HookTable {
        exe: Some("sh".into()),
        args: vec![
            "-c".into(),
            "echo \"$TESTLOOP_GREETING/$TESTLOOP_EXTRA\"".into(),
        ],
        env: EnvMap::from([("TESTLOOP_EXTRA".to_string(), "extra".to_string())]),
        ..Default::default()
    };
    let hooks = runner(TestConfigBuilder::ci().hook("on_start", Hook::Table(table)));
    let output = with_timeout(hooks.run_hook("on_start", &HookData::new())).await?;

    assert_eq!(output.stdout.trim(), "hello from env/extra");
    Ok(())
}

#[tokio::test]
async fn placeholders_are_substituted_before_running() -> TestResult {
    init_tracing();

    let hooks = runner(
        TestConfigBuilder::ci()
            .host("127.0.0.1")
            .command_hook("before_tests", "echo <url> <reason>"),
    );
    hooks.set_port(4321);
    let data = HookData::from([("reason".to_string(), "Start".to_string())]);
    let output = with_timeout(hooks.run_hook("before_tests", &data)).await?;

    assert_eq!(output.stdout.trim(), "http://127.0.0.1:4321/ Start");
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_fails_the_hook() -> TestResult {
    init_tracing();

    let hooks = runner(TestConfigBuilder::ci().command_hook("after_tests", "echo oops >&2; exit 3"));
    let err = with_timeout(hooks.run_hook("after_tests", &HookData::new()))
        .await
        .unwrap_err();

    match err {
        HookError::Failed { name, code, stderr } => {
            assert_eq!(name, "after_tests");
            assert_eq!(code, 3);
            assert_eq!(stderr.trim(), "oops");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn wait_for_text_returns_while_process_keeps_running() -> TestResult {
    init_tracing();

    let hooks = runner(TestConfigBuilder::ci().waiting_hook(
        "on_start",
        "echo launched.; sleep 30",
        "launched\\.",
    ));

    let began = Instant::now();
    let output = with_timeout(hooks.run_hook("on_start", &HookData::new())).await?;
    assert!(began.elapsed() < Duration::from_secs(5));
    assert!(output.stdout.contains("launched."));
    assert_eq!(hooks.tracked_count(), 1);

    assert_eq!(with_timeout(hooks.kill_tracked()).await, 1);
    assert_eq!(with_timeout(hooks.kill_tracked()).await, 0);
    assert_eq!(hooks.tracked_count(), 0);
    Ok(())
}

#[tokio::test]
async fn wait_for_text_matches_output_without_newline() -> TestResult {
    init_tracing();

    let hooks = runner(TestConfigBuilder::ci().waiting_hook(
        "on_start",
        "printf launched.; sleep 30",
        "launched",
    ));

    let began = Instant::now();
    let output = with_timeout(hooks.run_hook("on_start", &HookData::new())).await?;
    assert!(began.elapsed() < Duration::from_secs(3), "took {:?}", began.elapsed());
    assert_eq!(output.stdout, "launched.");

    assert_eq!(with_timeout(hooks.kill_tracked()).await, 1);
    Ok(())
}

#[cfg(target_os = "linux")]
fn process_is_gone(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| rest.trim_start().starts_with('Z')),
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn kill_reaches_children_of_the_shell() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let pid_file = dir.path().join("child.pid");
    let command = format!(
        "sleep 30 & echo $! > '{}'; echo launched.; wait",
        pid_file.display()
    );
    let hooks = runner(TestConfigBuilder::ci().waiting_hook("on_start", &command, "launched"));

    with_timeout(hooks.run_hook("on_start", &HookData::new())).await?;
    let pid = std::fs::read_to_string(&pid_file)?.trim().to_string();
    assert!(!process_is_gone(&pid), "background sleep should be running");

    assert_eq!(with_timeout(hooks.kill_tracked()).await, 1);
    with_timeout(async {
        while !process_is_gone(&pid) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn wait_for_text_matches_stderr_too() -> TestResult {
    init_tracing();

    let hooks = runner(TestConfigBuilder::ci().waiting_hook(
        "on_start",
        "echo 'tunnel ready' >&2; sleep 30",
        "tunnel ready",
    ));
    with_timeout(hooks.run_hook("on_start", &HookData::new())).await?;
    assert_eq!(with_timeout(hooks.kill_tracked()).await, 1);
    Ok(())
}

#[tokio::test]
async fn exit_before_match_is_not_ready() -> TestResult {
    init_tracing();

    let hooks = runner(TestConfigBuilder::ci().waiting_hook("on_start", "echo nope", "ready"));
    let err = with_timeout(hooks.run_hook("on_start", &HookData::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, HookError::NotReady { .. }), "{err:?}");
    assert_eq!(hooks.tracked_count(), 0);
    Ok(())
}

#[tokio::test]
async fn callback_receives_config_and_context() -> TestResult {
    init_tracing();

    let seen = Arc::new(Mutex::new(None::<(u16, HookData)>));
    let hook = {
        let seen = Arc::clone(&seen);
        Hook::callback(move |config, data| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                *seen.lock().unwrap() = Some((config.port(), data));
                Ok::<(), String>(())
            })
        })
    };
    let hooks = runner(TestConfigBuilder::ci().port(9000).hook("on_start", hook));
    let data = HookData::from([("reason".to_string(), "Start".to_string())]);
    with_timeout(hooks.run_hook("on_start", &data)).await?;

    let (port, data) = seen.lock().unwrap().clone().expect("callback ran");
    assert_eq!(port, 9000);
    assert_eq!(data.get("port").map(String::as_str), Some("9000"));
    assert_eq!(data.get("reason").map(String::as_str), Some("Start"));
    Ok(())
}

#[tokio::test]
async fn callback_rejection_propagates_message() -> TestResult {
    init_tracing();

    let hooks = runner(TestConfigBuilder::ci().hook(
        "on_start",
        Hook::callback(|_, _| Box::pin(async { Err::<(), _>("hookError".to_string()) })),
    ));
    let err = with_timeout(hooks.run_hook("on_start", &HookData::new()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "hookError");
    Ok(())
}

#[tokio::test]
async fn empty_hook_table_is_rejected() -> TestResult {
    init_tracing();

    let hooks = runner(TestConfigBuilder::ci().hook("on_start", Hook::Table(HookTable::default())));
    let err = with_timeout(hooks.run_hook("on_start", &HookData::new()))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "No command or exe/args specified for hook on_start"
    );
    Ok(())
}

/// A long-lived `on_start` process is still running when tests run and is
/// terminated by the exit sequence.
#[tokio::test]
async fn exit_kills_long_lived_start_hook() -> TestResult {
    init_tracing();

    let config = TestConfigBuilder::dev()
        .waiting_hook("on_start", "echo launched.; sleep 30", "launched")
        .build();
    let t = test_app(config, vec![FakeLauncher::passing("firefox").into_arc()]);
    let mut rx = t.app.subscribe();

    with_timeout(t.app.start()).await;
    wait_for_event(&mut rx, |e| matches!(e, AppEvent::RunFinished { .. })).await;
    assert_eq!(t.app.hooks().tracked_count(), 1);

    with_timeout(t.app.exit(None)).await;
    let killed = wait_for_event(&mut rx, |e| matches!(e, AppEvent::HookProcessesKilled { .. })).await;
    assert_eq!(killed, AppEvent::HookProcessesKilled { count: 1 });
    assert_eq!(t.app.hooks().kill_tracked().await, 0);
    Ok(())
}
