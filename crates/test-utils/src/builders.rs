#![allow(dead_code)]

use std::sync::Arc;

use testloop::app::App;
use testloop::config::{Config, ConfigOverrides, Hook, HookTable};
use testloop::reporter::MemoryReporter;
use testloop::runner::Launcher;
use testloop::types::{EnvMap, Mode};

use crate::fakes::FakeServer;

/// Builder for a settled [`Config`] to simplify test setup.
///
/// Starts from "no watching, port 0, no launchers requested" so tests never
/// touch the real filesystem watcher or a fixed port.
pub struct TestConfigBuilder {
    mode: Mode,
    overrides: ConfigOverrides,
}

impl TestConfigBuilder {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            overrides: ConfigOverrides {
                disable_watching: Some(true),
                port: Some(0),
                ..Default::default()
            },
        }
    }

    pub fn ci() -> Self {
        Self::new(Mode::Ci)
    }

    pub fn dev() -> Self {
        Self::new(Mode::Dev)
    }

    pub fn timeout(mut self, secs: f64) -> Self {
        self.overrides.timeout = Some(secs);
        self
    }

    pub fn parallel(mut self, n: i64) -> Self {
        self.overrides.parallel = Some(n);
        self
    }

    pub fn single_run(mut self, on: bool) -> Self {
        self.overrides.single_run = Some(on);
        self
    }

    pub fn launch(mut self, names: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        match self.mode {
            Mode::Ci => self.overrides.launch_in_ci = Some(names),
            Mode::Dev => self.overrides.launch_in_dev = Some(names),
        }
        self
    }

    pub fn ignore_missing_launchers(mut self) -> Self {
        self.overrides.ignore_missing_launchers = Some(true);
        self
    }

    pub fn fail_on_zero_tests(mut self) -> Self {
        self.overrides.fail_on_zero_tests = Some(true);
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.overrides.host = Some(host.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.overrides.port = Some(port);
        self
    }

    pub fn hook(mut self, name: &str, hook: Hook) -> Self {
        self.overrides.hooks.insert(name.to_string(), hook);
        self
    }

    /// Shell hook from a command line.
    pub fn command_hook(self, name: &str, command: &str) -> Self {
        self.hook(name, Hook::Command(command.to_string()))
    }

    /// Shell hook that counts as done once `pattern` shows up in its output.
    pub fn waiting_hook(self, name: &str, command: &str, pattern: &str) -> Self {
        self.hook(
            name,
            Hook::Table(HookTable {
                command: Some(command.to_string()),
                wait_for_text: Some(pattern.to_string()),
                ..Default::default()
            }),
        )
    }

    pub fn overrides(mut self, f: impl FnOnce(&mut ConfigOverrides)) -> Self {
        f(&mut self.overrides);
        self
    }

    pub fn build(self) -> Config {
        Config::builder(self.mode)
            .overrides(self.overrides)
            .build()
            .expect("test config should be valid")
    }
}

/// The pieces a test usually wants to inspect after driving an [`App`].
pub struct TestApp {
    pub app: App,
    pub reporter: Arc<MemoryReporter>,
    pub server: Arc<FakeServer>,
}

/// App with a [`MemoryReporter`], a [`FakeServer`] and the given launchers.
pub fn test_app(config: Config, launchers: Vec<Arc<dyn Launcher>>) -> TestApp {
    test_app_with_server(config, launchers, FakeServer::new(7357))
}

pub fn test_app_with_server(
    config: Config,
    launchers: Vec<Arc<dyn Launcher>>,
    server: FakeServer,
) -> TestApp {
    let reporter = Arc::new(MemoryReporter::new());
    let server = Arc::new(server);
    let mut builder = App::builder(Arc::new(config))
        .reporter(reporter.clone())
        .server(server.clone())
        .hook_env(minimal_env());
    for launcher in launchers {
        builder = builder.launcher(launcher);
    }
    TestApp {
        app: builder.build(),
        reporter,
        server,
    }
}

/// Enough environment for `sh -c` to find standard tools.
pub fn minimal_env() -> EnvMap {
    let mut env = EnvMap::new();
    if let Ok(path) = std::env::var("PATH") {
        env.insert("PATH".to_string(), path);
    }
    env
}
