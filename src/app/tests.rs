// src/app/tests.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use super::*;
use crate::config::{Config, ConfigOverrides};
use crate::reporter::{MemoryReporter, Reporter, TestResult};
use crate::runner::{Launcher, Runner};
use crate::timeout::RunTimeout;
use crate::types::{BoxFuture, Mode};

#[derive(Default)]
struct Counts {
    starts: AtomicUsize,
    exits: AtomicUsize,
}

/// Runner that passes after `delay`, or rejects with `Killed` on exit.
struct StubRunner {
    counts: Arc<Counts>,
    delay: Duration,
    reporter: Arc<dyn Reporter>,
    killed: Notify,
}

impl Runner for StubRunner {
    fn name(&self) -> &str {
        "stub"
    }

    fn start(&self) -> BoxFuture<'_, Result<(), RunError>> {
        Box::pin(async move {
            self.counts.starts.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = self.killed.notified() => Err(RunError::Killed),
                _ = tokio::time::sleep(self.delay) => {
                    self.reporter.report(Some("stub"), TestResult::passed("stub"));
                    Ok(())
                }
            }
        })
    }

    fn exit(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.counts.exits.fetch_add(1, Ordering::SeqCst);
            self.killed.notify_one();
        })
    }
}

struct StubLauncher {
    counts: Arc<Counts>,
    delay: Duration,
}

impl Launcher for StubLauncher {
    fn name(&self) -> &str {
        "stub"
    }

    fn create_runner(&self, reporter: Arc<dyn Reporter>) -> Arc<dyn Runner> {
        Arc::new(StubRunner {
            counts: Arc::clone(&self.counts),
            delay: self.delay,
            reporter,
            killed: Notify::new(),
        })
    }
}

fn app_with_stubs(n: usize, delay: Duration) -> (App, Arc<Counts>) {
    let config = Config::builder(Mode::Ci)
        .overrides(ConfigOverrides {
            parallel: Some(-1),
            ..Default::default()
        })
        .build()
        .unwrap();
    let app = App::builder(Arc::new(config))
        .reporter(Arc::new(MemoryReporter::new()))
        .build();
    let counts = Arc::new(Counts::default());
    app.lock().launchers = (0..n)
        .map(|_| {
            Arc::new(StubLauncher {
                counts: Arc::clone(&counts),
                delay,
            }) as Arc<dyn Launcher>
        })
        .collect();
    (app, counts)
}

#[tokio::test]
async fn zero_timeout_times_out_before_any_start() {
    let (app, counts) = app_with_stubs(2, Duration::from_millis(10));
    let timeout = RunTimeout::from_secs(0.0);

    let result = app.single_run(&timeout).await;

    assert_eq!(result, Err(RunError::TimedOut));
    assert_eq!(result.unwrap_err().to_string(), "Run timed out.");
    assert_eq!(counts.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn restarting_resolves_without_touching_runners() {
    let (app, counts) = app_with_stubs(2, Duration::from_millis(10));
    app.lock().restarting = true;

    let result = app.single_run(&RunTimeout::disabled()).await;

    assert_eq!(result, Ok(()));
    assert_eq!(counts.starts.load(Ordering::SeqCst), 0);
    assert_eq!(counts.exits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn exited_rejects_with_hidden_cancel() {
    let (app, counts) = app_with_stubs(1, Duration::from_millis(10));
    app.lock().exited = true;

    let err = app.single_run(&RunTimeout::disabled()).await.unwrap_err();

    assert_eq!(err.to_string(), "Run canceled.");
    assert!(err.hide_from_reporter());
    assert_eq!(counts.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn timeout_mid_run_surfaces_killed() {
    let (app, counts) = app_with_stubs(2, Duration::from_secs(30));
    let timeout = RunTimeout::start(Duration::from_millis(50));

    let result = tokio::time::timeout(Duration::from_secs(5), app.single_run(&timeout))
        .await
        .expect("single_run should settle after the timeout");

    assert_eq!(result, Err(RunError::Killed));
    assert_eq!(counts.starts.load(Ordering::SeqCst), 2);
    assert_eq!(counts.exits.load(Ordering::SeqCst), 2);
    assert!(timeout.is_timed_out());
}

#[tokio::test]
async fn normal_completion_reports_and_resolves() {
    let (app, counts) = app_with_stubs(3, Duration::from_millis(5));

    let result = app.single_run(&RunTimeout::start(Duration::from_secs(30))).await;

    assert_eq!(result, Ok(()));
    assert_eq!(counts.starts.load(Ordering::SeqCst), 3);
    assert_eq!(app.reporter().totals().pass, 3);
    assert!(app.lock().runners.is_empty());
}

#[tokio::test]
async fn trigger_after_exit_is_canceled() {
    let (app, _) = app_with_stubs(0, Duration::ZERO);
    app.exit(None).await;
    let outcome = app.trigger_run("late").wait().await;
    assert_eq!(outcome, Err(RunError::Canceled));
    assert_eq!(app.try_finished(), Some(Finish { code: 0, error: None }));
}
