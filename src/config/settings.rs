// src/config/settings.rs

//! The settled, read-only configuration shared by the orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::model::{ConfigFile, HookTable, LauncherConfig, RawHook};
use crate::config::validate::{validate_parallel, validate_timeout};
use crate::errors::Result;
use crate::hooks::{HookCallback, HookData};
use crate::types::{BoxFuture, Mode};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 7357;

/// A hook descriptor after settling.
///
/// `Callback` can only be registered programmatically; the other two come
/// from the config file or from overrides.
#[derive(Clone)]
pub enum Hook {
    Command(String),
    Table(HookTable),
    Callback(HookCallback),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            Hook::Table(table) => f.debug_tuple("Table").field(table).finish(),
            Hook::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl From<RawHook> for Hook {
    fn from(raw: RawHook) -> Self {
        match raw {
            RawHook::Command(cmd) => Hook::Command(cmd),
            RawHook::Table(table) => Hook::Table(table),
        }
    }
}

impl Hook {
    /// Wrap an async closure as a callback hook.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Arc<Config>, HookData) -> BoxFuture<'static, std::result::Result<(), String>>
            + Send
            + Sync
            + 'static,
    {
        Hook::Callback(Arc::new(f))
    }

    fn describe(&self) -> String {
        match self {
            Hook::Command(cmd) => cmd.clone(),
            Hook::Table(table) => match (&table.command, &table.exe) {
                (Some(cmd), _) => cmd.clone(),
                (None, Some(exe)) => std::iter::once(exe.as_str())
                    .chain(table.args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" "),
                (None, None) => String::new(),
            },
            Hook::Callback(_) => "<callback>".to_string(),
        }
    }
}

/// Values that take precedence over the file (CLI flags, API options), or,
/// when passed as default options, fill in below it.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub parallel: Option<i64>,
    pub timeout: Option<f64>,
    pub disable_watching: Option<bool>,
    pub single_run: Option<bool>,
    pub launch_in_ci: Option<Vec<String>>,
    pub launch_in_dev: Option<Vec<String>>,
    pub ignore_missing_launchers: Option<bool>,
    pub fail_on_zero_tests: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub reporter: Option<String>,
    pub src_files: Option<Vec<String>>,
    pub src_files_ignore: Option<Vec<String>>,
    pub cwd: Option<PathBuf>,
    pub launchers: BTreeMap<String, LauncherConfig>,
    pub hooks: BTreeMap<String, Hook>,
}

impl ConfigOverrides {
    pub fn hook(mut self, name: impl Into<String>, hook: Hook) -> Self {
        self.hooks.insert(name.into(), hook);
        self
    }
}

/// Immutable configuration for one app lifetime.
///
/// Owned by the caller and shared as `Arc<Config>`; the orchestrator never
/// mutates it.
#[derive(Debug, Clone)]
pub struct Config {
    mode: Mode,
    parallel: i64,
    timeout: Option<Duration>,
    disable_watching: bool,
    single_run: bool,
    launch_in_ci: Vec<String>,
    launch_in_dev: Vec<String>,
    ignore_missing_launchers: bool,
    fail_on_zero_tests: bool,
    host: String,
    port: u16,
    reporter: String,
    src_files: Vec<String>,
    src_files_ignore: Vec<String>,
    cwd: PathBuf,
    launchers: BTreeMap<String, LauncherConfig>,
    hooks: BTreeMap<String, Hook>,
}

impl Config {
    pub fn builder(mode: Mode) -> ConfigBuilder {
        ConfigBuilder::new(mode)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// `-1` means unbounded.
    pub fn parallel(&self) -> i64 {
        self.parallel
    }

    /// `None` when timeouts are disabled.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn disable_watching(&self) -> bool {
        self.disable_watching
    }

    pub fn single_run(&self) -> bool {
        self.single_run
    }

    /// Launcher names requested for the current mode.
    pub fn launch_names(&self) -> &[String] {
        match self.mode {
            Mode::Ci => &self.launch_in_ci,
            Mode::Dev => &self.launch_in_dev,
        }
    }

    pub fn ignore_missing_launchers(&self) -> bool {
        self.ignore_missing_launchers
    }

    pub fn fail_on_zero_tests(&self) -> bool {
        self.fail_on_zero_tests
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        url_for(&self.host, self.port)
    }

    pub fn reporter(&self) -> &str {
        &self.reporter
    }

    pub fn src_files(&self) -> &[String] {
        &self.src_files
    }

    pub fn src_files_ignore(&self) -> &[String] {
        &self.src_files_ignore
    }

    pub fn cwd(&self) -> &PathBuf {
        &self.cwd
    }

    pub fn launchers(&self) -> &BTreeMap<String, LauncherConfig> {
        &self.launchers
    }

    pub fn hook(&self, name: &str) -> Option<&Hook> {
        self.hooks.get(name)
    }

    pub fn hook_names(&self) -> impl Iterator<Item = &str> {
        self.hooks.keys().map(String::as_str)
    }

    /// String view of a single key, e.g. for `--dry-run` output.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "mode" => self.mode.to_string(),
            "parallel" => self.parallel.to_string(),
            "timeout" => self
                .timeout
                .map(|t| t.as_secs_f64().to_string())
                .unwrap_or_else(|| "0".to_string()),
            "disable_watching" => self.disable_watching.to_string(),
            "single_run" => self.single_run.to_string(),
            "launch_in_ci" => self.launch_in_ci.join(","),
            "launch_in_dev" => self.launch_in_dev.join(","),
            "ignore_missing_launchers" => self.ignore_missing_launchers.to_string(),
            "fail_on_zero_tests" => self.fail_on_zero_tests.to_string(),
            "host" => self.host.clone(),
            "port" => self.port.to_string(),
            "url" => self.url(),
            "reporter" => self.reporter.clone(),
            "cwd" => self.cwd.to_string_lossy().into_owned(),
            other => return self.hooks.get(other).map(Hook::describe),
        };
        Some(value)
    }

    /// Keys accepted by [`Config::get`], hooks last.
    pub fn keys(&self) -> Vec<String> {
        const SCALARS: &[&str] = &[
            "mode",
            "parallel",
            "timeout",
            "disable_watching",
            "single_run",
            "launch_in_ci",
            "launch_in_dev",
            "ignore_missing_launchers",
            "fail_on_zero_tests",
            "host",
            "port",
            "url",
            "reporter",
            "cwd",
        ];
        SCALARS
            .iter()
            .map(|k| k.to_string())
            .chain(self.hooks.keys().cloned())
            .collect()
    }
}

pub(crate) fn url_for(host: &str, port: u16) -> String {
    format!("http://{host}:{port}/")
}

/// Layers overrides → file → default options → mode defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    mode: Mode,
    file: ConfigFile,
    defaults: ConfigOverrides,
    overrides: ConfigOverrides,
}

impl ConfigBuilder {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            file: ConfigFile::default(),
            defaults: ConfigOverrides::default(),
            overrides: ConfigOverrides::default(),
        }
    }

    pub fn file(mut self, file: ConfigFile) -> Self {
        self.file = file;
        self
    }

    pub fn defaults(mut self, defaults: ConfigOverrides) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn hook(mut self, name: impl Into<String>, hook: Hook) -> Self {
        self.overrides.hooks.insert(name.into(), hook);
        self
    }

    pub fn build(self) -> Result<Config> {
        let ConfigBuilder {
            mode,
            file,
            defaults,
            overrides,
        } = self;
        let file = file.into_raw();

        macro_rules! layered {
            ($field:ident) => {
                overrides
                    .$field
                    .clone()
                    .or_else(|| file.$field.clone())
                    .or_else(|| defaults.$field.clone())
            };
        }

        let parallel = match mode {
            Mode::Dev => -1,
            Mode::Ci => layered!(parallel).unwrap_or(1),
        };
        validate_parallel(parallel)?;

        let timeout_secs = layered!(timeout).unwrap_or(0.0);
        validate_timeout(timeout_secs)?;
        let timeout = Some(Duration::try_from_secs_f64(timeout_secs).unwrap_or_default())
            .filter(|d| !d.is_zero());

        let (disable_watching, single_run) = match mode {
            Mode::Ci => (true, true),
            Mode::Dev => (
                layered!(disable_watching).unwrap_or(false),
                layered!(single_run).unwrap_or(false),
            ),
        };

        let reporter = layered!(reporter).unwrap_or_else(|| match mode {
            Mode::Dev => "dev".to_string(),
            Mode::Ci => "tap".to_string(),
        });

        let cwd = overrides
            .cwd
            .clone()
            .or_else(|| file.cwd.as_ref().map(PathBuf::from))
            .or_else(|| defaults.cwd.clone())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let mut launchers = defaults.launchers.clone();
        launchers.extend(file.launchers.clone());
        launchers.extend(overrides.launchers.clone());

        let mut hooks: BTreeMap<String, Hook> = defaults.hooks.clone();
        hooks.extend(file.hooks.into_iter().map(|(k, v)| (k, Hook::from(v))));
        hooks.extend(overrides.hooks.clone());

        Ok(Config {
            mode,
            parallel,
            timeout,
            disable_watching,
            single_run,
            launch_in_ci: layered!(launch_in_ci).unwrap_or_default(),
            launch_in_dev: layered!(launch_in_dev).unwrap_or_default(),
            ignore_missing_launchers: layered!(ignore_missing_launchers).unwrap_or(false),
            fail_on_zero_tests: layered!(fail_on_zero_tests).unwrap_or(false),
            host: layered!(host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: layered!(port).unwrap_or(DEFAULT_PORT),
            reporter,
            src_files: layered!(src_files).unwrap_or_else(|| vec!["**/*".to_string()]),
            src_files_ignore: layered!(src_files_ignore).unwrap_or_default(),
            cwd,
            launchers,
            hooks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RawConfigFile;

    fn file(raw: RawConfigFile) -> ConfigFile {
        ConfigFile::try_from(raw).expect("valid file")
    }

    #[test]
    fn dev_mode_forces_unbounded_parallel() {
        let overrides = ConfigOverrides {
            parallel: Some(5),
            ..Default::default()
        }
        .hook("on_exit", Hook::Command("test".into()));

        let cfg = Config::builder(Mode::Dev).overrides(overrides).build().unwrap();
        assert_eq!(cfg.parallel(), -1);
        assert_eq!(cfg.reporter(), "dev");
        assert_eq!(cfg.get("on_exit").as_deref(), Some("test"));
    }

    #[test]
    fn ci_mode_keeps_parallel_and_forces_single_run() {
        let overrides = ConfigOverrides {
            parallel: Some(5),
            disable_watching: Some(false),
            ..Default::default()
        };
        let cfg = Config::builder(Mode::Ci).overrides(overrides).build().unwrap();
        assert_eq!(cfg.parallel(), 5);
        assert!(cfg.disable_watching());
        assert!(cfg.single_run());
    }

    #[test]
    fn overrides_beat_file_beat_defaults() {
        let raw = RawConfigFile {
            host: Some("file.host".into()),
            port: Some(9000),
            ..Default::default()
        };
        let defaults = ConfigOverrides {
            host: Some("default.host".into()),
            port: Some(1),
            timeout: Some(3.0),
            ..Default::default()
        };
        let overrides = ConfigOverrides {
            port: Some(2837),
            ..Default::default()
        };
        let cfg = Config::builder(Mode::Ci)
            .file(file(raw))
            .defaults(defaults)
            .overrides(overrides)
            .build()
            .unwrap();

        assert_eq!(cfg.host(), "file.host");
        assert_eq!(cfg.port(), 2837);
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(cfg.url(), "http://file.host:2837/");
    }

    #[test]
    fn zero_timeout_is_disabled() {
        let cfg = Config::builder(Mode::Ci)
            .overrides(ConfigOverrides {
                timeout: Some(0.0),
                ..Default::default()
            })
            .build()
            .unwrap();
        assert_eq!(cfg.timeout(), None);
        assert_eq!(cfg.get("timeout").as_deref(), Some("0"));
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::builder(Mode::Ci).build().unwrap();
        assert_eq!(cfg.host(), DEFAULT_HOST);
        assert_eq!(cfg.port(), DEFAULT_PORT);
        assert_eq!(cfg.parallel(), 1);
        assert_eq!(cfg.src_files(), ["**/*".to_string()]);
        assert!(cfg.launch_names().is_empty());
    }
}
