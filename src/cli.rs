// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::ConfigOverrides;
use crate::types::Mode;

/// Command-line arguments for `testloop`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "testloop",
    version,
    about = "Run a test suite across browsers, processes and commands, on change or once for CI.",
    long_about = None
)]
pub struct CliArgs {
    /// Operating mode. Defaults to `dev`.
    #[command(subcommand)]
    pub command: Option<ModeCommand>,

    /// Path to the config file (TOML).
    #[arg(long, global = true, value_name = "PATH", default_value = "testloop.toml")]
    pub config: String,

    /// Host the server listens on and hooks see as `<host>`.
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// Port the server listens on (0 picks a free one).
    #[arg(long, global = true, value_name = "PORT")]
    pub port: Option<u16>,

    /// Per-run timeout in seconds (0 disables).
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Max launchers started concurrently in CI (-1 = unbounded).
    #[arg(long, global = true, value_name = "N", allow_negative_numbers = true)]
    pub parallel: Option<i64>,

    /// Comma-separated launcher names to use for this mode.
    #[arg(long, global = true, value_name = "NAMES", value_delimiter = ',')]
    pub launch: Option<Vec<String>>,

    /// Fail when no tests were reported.
    #[arg(long, global = true)]
    pub fail_on_zero_tests: bool,

    /// Skip launchers that cannot be found instead of failing.
    #[arg(long, global = true)]
    pub ignore_missing_launchers: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TESTLOOP_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and settle the configuration, print it, run nothing.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ModeCommand {
    /// Watch files and rerun on change.
    Dev,
    /// Run once and exit with the aggregated result.
    Ci,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    pub fn mode(&self) -> Mode {
        match self.command {
            Some(ModeCommand::Ci) => Mode::Ci,
            Some(ModeCommand::Dev) | None => Mode::Dev,
        }
    }

    /// Flags that override file values.
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            timeout: self.timeout,
            parallel: self.parallel,
            fail_on_zero_tests: self.fail_on_zero_tests.then_some(true),
            ignore_missing_launchers: self.ignore_missing_launchers.then_some(true),
            ..ConfigOverrides::default()
        };
        if let Some(names) = &self.launch {
            match self.mode() {
                Mode::Ci => overrides.launch_in_ci = Some(names.clone()),
                Mode::Dev => overrides.launch_in_dev = Some(names.clone()),
            }
        }
        overrides
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
