// src/runner/mod.rs

//! Runner and launcher seams.
//!
//! The orchestrator only needs two operations from a live test session:
//! [`Runner::start`], which settles when the session ends, and
//! [`Runner::exit`], which tears it down. What a launcher actually drives (a
//! child process, a browser, a remote agent) stays behind these traits.
//!
//! - [`process`] provides the command-backed [`ProcessLauncher`].
//! - [`registry`] resolves configured launcher names.

pub mod process;
pub mod registry;

use std::sync::Arc;

use crate::errors::RunError;
use crate::reporter::Reporter;
use crate::types::BoxFuture;

pub use process::{ProcessLauncher, ProcessRunner};
pub use registry::{resolve_launchers, LauncherRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Pending,
    Running,
    Exited,
}

/// One launcher's session for one run. Never reused across runs.
///
/// Contract:
/// - `start` resolves `Ok` when the session completes normally and `Err`
///   when it dies or is killed (`RunError::Killed`).
/// - `exit` is idempotent, safe before, during and after `start`, and
///   forces an outstanding `start` to reject with `Killed`.
pub trait Runner: Send + Sync {
    fn name(&self) -> &str;

    fn start(&self) -> BoxFuture<'_, Result<(), RunError>>;

    fn exit(&self) -> BoxFuture<'_, ()>;
}

/// A configured way to obtain a test environment.
pub trait Launcher: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the environment can be launched at all (e.g. the executable
    /// is installed).
    fn available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }

    /// A fresh runner whose results go to `reporter`.
    fn create_runner(&self, reporter: Arc<dyn Reporter>) -> Arc<dyn Runner>;
}
