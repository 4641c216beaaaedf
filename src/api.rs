// src/api.rs

//! Programmatic entry point: settle a config for a mode and start an app.

use std::sync::Arc;

use tracing::info;

use crate::app::{App, RunHandle};
use crate::config::{Config, ConfigFile, ConfigOverrides};
use crate::errors::Result;
use crate::reporter::Reporter;
use crate::runner::Launcher;
use crate::server::Server;
use crate::types::Mode;

#[derive(Default)]
pub struct Api {
    file: ConfigFile,
    defaults: ConfigOverrides,
    launchers: Vec<Arc<dyn Launcher>>,
    reporter: Option<Arc<dyn Reporter>>,
    server: Option<Arc<dyn Server>>,
    app: Option<App>,
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("defaults", &self.defaults)
            .field("launchers", &self.launchers.len())
            .field("app", &self.app)
            .finish_non_exhaustive()
    }
}

impl Api {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use values from a loaded config file.
    pub fn with_file(file: ConfigFile) -> Self {
        Self {
            file,
            ..Self::default()
        }
    }

    /// Options that sit below the file and above mode defaults.
    pub fn set_default_options(&mut self, options: ConfigOverrides) {
        self.defaults = options;
    }

    pub fn default_options(&self) -> &ConfigOverrides {
        &self.defaults
    }

    pub fn register_launcher(&mut self, launcher: Arc<dyn Launcher>) {
        self.launchers.push(launcher);
    }

    pub fn set_reporter(&mut self, reporter: Arc<dyn Reporter>) {
        self.reporter = Some(reporter);
    }

    pub fn set_server(&mut self, server: Arc<dyn Server>) {
        self.server = Some(server);
    }

    /// Settle the configuration `start_*` would use.
    pub fn configure(&self, mode: Mode, options: ConfigOverrides) -> Result<Config> {
        Config::builder(mode)
            .file(self.file.clone())
            .defaults(self.defaults.clone())
            .overrides(options)
            .build()
    }

    pub async fn start_dev(&mut self, options: ConfigOverrides) -> Result<App> {
        self.start(Mode::Dev, options).await
    }

    pub async fn start_ci(&mut self, options: ConfigOverrides) -> Result<App> {
        self.start(Mode::Ci, options).await
    }

    async fn start(&mut self, mode: Mode, options: ConfigOverrides) -> Result<App> {
        let config = Arc::new(self.configure(mode, options)?);
        info!(%mode, "starting app");

        let mut builder = App::builder(config);
        for launcher in &self.launchers {
            builder = builder.launcher(Arc::clone(launcher));
        }
        if let Some(reporter) = &self.reporter {
            builder = builder.reporter(Arc::clone(reporter));
        }
        if let Some(server) = &self.server {
            builder = builder.server(Arc::clone(server));
        }

        let app = builder.build();
        app.start().await;
        self.app = Some(app.clone());
        Ok(app)
    }

    pub fn app(&self) -> Option<&App> {
        self.app.as_ref()
    }

    /// Restart the running app, if any.
    pub fn restart(&self) -> Option<RunHandle> {
        self.app.as_ref().map(App::restart)
    }
}
