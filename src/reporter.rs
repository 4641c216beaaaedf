// src/reporter.rs

//! Result sink read by the exit-code computation.

use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use crate::errors::RunError;

/// Outcome of one test as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub skipped: bool,
    pub error: Option<RunError>,
}

impl TestResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            skipped: false,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: RunError) -> Self {
        Self {
            name: name.into(),
            passed: false,
            skipped: false,
            error: Some(error),
        }
    }

    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            skipped: true,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub total: usize,
    pub pass: usize,
    pub skipped: usize,
}

/// A sink receiving per-test results.
pub trait Reporter: Send + Sync {
    /// `launcher` is `None` for results the orchestrator synthesizes.
    fn report(&self, launcher: Option<&str>, result: TestResult);

    fn totals(&self) -> Totals;

    /// Called once when the app exits.
    fn finish(&self) {}
}

/// `None` means "no override" (exit code 0).
pub fn exit_code_for(totals: Totals, fail_on_zero_tests: bool) -> Option<String> {
    if totals.total == 0 {
        return fail_on_zero_tests.then(|| "No tests found.".to_string());
    }
    if totals.pass + totals.skipped == totals.total {
        return None;
    }
    Some("Not all tests passed.".to_string())
}

/// A reported result tagged with its launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reported {
    pub launcher: Option<String>,
    pub result: TestResult,
}

/// Keeps every result in memory and logs it.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    results: Mutex<Vec<Reported>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<Reported> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Reported>> {
        self.results.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, launcher: Option<&str>, result: TestResult) {
        let launcher_name = launcher.unwrap_or("-");
        match (&result.error, result.passed, result.skipped) {
            (_, _, true) => info!(launcher = launcher_name, test = %result.name, "skipped"),
            (_, true, _) => info!(launcher = launcher_name, test = %result.name, "ok"),
            (Some(err), _, _) => {
                warn!(launcher = launcher_name, test = %result.name, error = %err, "not ok")
            }
            (None, _, _) => warn!(launcher = launcher_name, test = %result.name, "not ok"),
        }
        self.lock().push(Reported {
            launcher: launcher.map(str::to_string),
            result,
        });
    }

    fn totals(&self) -> Totals {
        let results = self.lock();
        Totals {
            total: results.len(),
            pass: results.iter().filter(|r| r.result.passed).count(),
            skipped: results.iter().filter(|r| r.result.skipped).count(),
        }
    }

    fn finish(&self) {
        let t = self.totals();
        info!(total = t.total, pass = t.pass, skipped = t.skipped, "test results");
    }
}
