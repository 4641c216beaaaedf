// src/errors.rs

//! Crate-wide error types.
//!
//! - [`TestloopError`] covers setup failures (config loading, IO, launcher
//!   resolution) that happen before or outside a run.
//! - [`RunError`] is the run-level taxonomy. It is `Clone` because the same
//!   error is handed to the reporter, to run waiters and to the final
//!   [`Finish`](crate::app::Finish).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestloopError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Launcher {0} not found. Not installed?")]
    LauncherNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TestloopError>;

/// Why a run (or the whole app) failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The deadline elapsed before any runner work started.
    #[error("Run timed out.")]
    TimedOut,

    /// The app already exited; internal bookkeeping only.
    #[error("Run canceled.")]
    Canceled,

    /// A runner was forcibly exited while its session was in flight.
    #[error("Killed")]
    Killed,

    /// Malformed hook spec, missing launcher, ...
    #[error("{0}")]
    Config(String),

    /// Address in use, launcher process crash, ...
    #[error("{0}")]
    Infrastructure(String),

    /// `message` already names the hook.
    #[error("{message}")]
    Hook { name: String, message: String },

    /// A runner's session ended abnormally.
    #[error("{0}")]
    Runner(String),

    /// Exit-code override derived from reporter totals.
    #[error("{0}")]
    Results(String),
}

impl RunError {
    /// Errors flagged here never reach the reporter or the exit code.
    pub fn hide_from_reporter(&self) -> bool {
        matches!(self, RunError::Canceled)
    }
}

impl From<TestloopError> for RunError {
    fn from(err: TestloopError) -> Self {
        match err {
            TestloopError::ConfigError(msg) => RunError::Config(msg),
            e @ TestloopError::LauncherNotFound(_) => RunError::Config(e.to_string()),
            other => RunError::Infrastructure(other.to_string()),
        }
    }
}
