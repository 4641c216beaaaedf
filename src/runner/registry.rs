// src/runner/registry.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::{Launcher, ProcessLauncher};
use crate::config::Config;
use crate::errors::{Result, TestloopError};

/// Named launchers known to one app.
#[derive(Default, Clone)]
pub struct LauncherRegistry {
    launchers: BTreeMap<String, Arc<dyn Launcher>>,
}

impl std::fmt::Debug for LauncherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.launchers.keys()).finish()
    }
}

impl LauncherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`ProcessLauncher`] per `[launchers.<name>]` table.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (name, spec) in config.launchers() {
            registry.register(Arc::new(ProcessLauncher::new(
                name.clone(),
                spec.clone(),
                config.cwd().clone(),
            )));
        }
        registry
    }

    /// Later registrations replace earlier ones with the same name.
    pub fn register(&mut self, launcher: Arc<dyn Launcher>) {
        self.launchers.insert(launcher.name().to_string(), launcher);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Launcher>> {
        self.launchers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.launchers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.launchers.is_empty()
    }
}

/// Pick the launchers for the configured mode.
///
/// An empty `launch_in_*` list selects every registered launcher. A name that
/// is unknown or not installed fails with [`TestloopError::LauncherNotFound`]
/// unless `ignore_missing_launchers` is set, in which case it is skipped.
pub async fn resolve_launchers(
    config: &Config,
    registry: &LauncherRegistry,
) -> Result<Vec<Arc<dyn Launcher>>> {
    let wanted: Vec<String> = if config.launch_names().is_empty() {
        registry.names().map(str::to_string).collect()
    } else {
        config.launch_names().to_vec()
    };

    let mut resolved = Vec::with_capacity(wanted.len());
    for name in wanted {
        let found = match registry.get(&name) {
            Some(launcher) => launcher.available().await.then(|| Arc::clone(launcher)),
            None => None,
        };
        match found {
            Some(launcher) => resolved.push(launcher),
            None if config.ignore_missing_launchers() => {
                warn!(launcher = %name, "launcher not found; skipping");
            }
            None => return Err(TestloopError::LauncherNotFound(name)),
        }
    }

    info!(
        launchers = ?resolved.iter().map(|l| l.name()).collect::<Vec<_>>(),
        "launchers resolved"
    );
    Ok(resolved)
}
