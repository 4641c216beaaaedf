// src/config/model.rs

use std::collections::BTreeMap;
use std::ops::Deref;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// timeout = 30
/// parallel = 2
/// launch_in_ci = ["node"]
/// src_files = ["src/**/*.js", "test/**/*.js"]
///
/// on_start = { command = "tunnel <host>:<port> -u <url>", wait_for_text = "ready" }
/// on_exit = "echo bye"
///
/// [launchers.node]
/// exe = "node"
/// args = ["test/run.js"]
/// ```
///
/// Every key is optional; mode defaults fill the gaps when the file is
/// settled into a [`Config`](crate::config::Config).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Concurrent launcher starts in CI (`-1` = unbounded).
    pub parallel: Option<i64>,

    /// Per-run timeout in seconds; `0` disables it.
    pub timeout: Option<f64>,

    pub disable_watching: Option<bool>,
    pub single_run: Option<bool>,

    /// Launcher names used in CI mode.
    pub launch_in_ci: Option<Vec<String>>,

    /// Launcher names used in dev mode.
    pub launch_in_dev: Option<Vec<String>>,

    pub ignore_missing_launchers: Option<bool>,
    pub fail_on_zero_tests: Option<bool>,

    pub host: Option<String>,
    pub port: Option<u16>,
    pub reporter: Option<String>,

    /// Glob patterns (relative to `cwd`) that trigger a rerun when changed.
    pub src_files: Option<Vec<String>>,

    /// Glob patterns excluded from `src_files`.
    pub src_files_ignore: Option<Vec<String>>,

    /// Project root; relative paths resolve against the config file's dir.
    pub cwd: Option<String>,

    /// `[launchers.<name>]` tables.
    #[serde(default)]
    pub launchers: BTreeMap<String, LauncherConfig>,

    /// Remaining top-level keys. Only hook names (`on_*`, `before_*`,
    /// `after_*`) survive validation.
    #[serde(flatten)]
    pub hooks: BTreeMap<String, RawHook>,
}

/// A hook as written in the file: either a bare shell command or a table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawHook {
    Command(String),
    Table(HookTable),
}

/// Structured hook descriptor.
///
/// Exactly one of `command` (run through the shell) or `exe` + `args`
/// (spawned directly) must be present; that is checked when the hook runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HookTable {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub exe: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Regex; the hook counts as done once the combined output matches.
    #[serde(default)]
    pub wait_for_text: Option<String>,

    /// Environment overrides applied on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `[launchers.<name>]` table: how to run one test environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub exe: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A [`RawConfigFile`] that passed validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    raw: RawConfigFile,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self { raw }
    }

    pub fn into_raw(self) -> RawConfigFile {
        self.raw
    }
}

impl Deref for ConfigFile {
    type Target = RawConfigFile;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}
