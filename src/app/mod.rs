// src/app/mod.rs

//! The run orchestrator.
//!
//! [`App`] owns the runner set, the active [`RunTimeout`](crate::timeout::RunTimeout)
//! and the lifecycle flags (`paused`, `restarting`, `exited`). File changes,
//! the dev console and API calls only ever *request* a run through
//! [`App::trigger_run`] / [`App::file_changed`]; the single-flight guard in
//! there guarantees at most one run drives runners at any time.
//!
//! - [`state`] holds the mutable state and [`RunHandle`].
//! - [`run`] implements triggering, the run cycle and `single_run`.
//! - [`exit`] implements start-up, wrap-up and the exit sequence.

pub mod exit;
pub mod run;
pub mod state;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::RunError;
use crate::hooks::{HookData, HookOutput, HookRunner};
use crate::reporter::{MemoryReporter, Reporter};
use crate::runner::{Launcher, LauncherRegistry};
use crate::server::{ListenerServer, Server};
use crate::types::{EnvMap, TriggerKind};
use crate::watch::WatcherHandle;

pub use state::{RunHandle, RunOutcome};

use state::State;

/// Lifecycle notifications, published for observers (console, tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    RunStarted { run_id: u64, reason: String },
    RunFinished { run_id: u64, outcome: RunOutcome },
    RunnersStopped { count: usize },
    TimeoutCreated { run_id: u64, timeout_id: u64 },
    TimeoutFired { timeout_id: u64 },
    TimeoutDisposed { timeout_id: u64 },
    RunnerStarted { run_id: u64, launcher: String },
    HookStarted { name: String },
    HookFinished { name: String, ok: bool },
    HookProcessesKilled { count: usize },
    ServerStopped,
    Exited { code: i32 },
}

/// Final result handed to whoever waits on [`App::finished`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finish {
    pub code: i32,
    pub error: Option<RunError>,
}

const EVENT_CAPACITY: usize = 256;

pub(crate) struct Inner {
    config: Arc<Config>,
    reporter: Arc<dyn Reporter>,
    server: Arc<dyn Server>,
    hooks: HookRunner,
    registry: LauncherRegistry,
    state: Mutex<State>,
    events: broadcast::Sender<AppEvent>,
    finish_tx: watch::Sender<Option<Finish>>,
    watcher: Mutex<Option<WatcherHandle>>,
}

/// Cheap-to-clone handle to one orchestrator.
#[derive(Clone)]
pub struct App {
    inner: Arc<Inner>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("mode", &self.inner.config.mode())
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

/// Assembles an [`App`]; every collaborator has a production default.
pub struct AppBuilder {
    config: Arc<Config>,
    reporter: Option<Arc<dyn Reporter>>,
    server: Option<Arc<dyn Server>>,
    hook_env: Option<EnvMap>,
    registry: LauncherRegistry,
}

impl AppBuilder {
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn server(mut self, server: Arc<dyn Server>) -> Self {
        self.server = Some(server);
        self
    }

    /// Register a launcher next to the ones from `[launchers.*]`.
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.registry.register(launcher);
        self
    }

    /// Base environment for hook processes instead of the current one.
    pub fn hook_env(mut self, env: EnvMap) -> Self {
        self.hook_env = Some(env);
        self
    }

    pub fn build(self) -> App {
        let config = self.config;
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(MemoryReporter::new()));
        let server = self
            .server
            .unwrap_or_else(|| Arc::new(ListenerServer::new(config.host(), config.port())));
        let hooks = match self.hook_env {
            Some(env) => HookRunner::with_base_env(Arc::clone(&config), env),
            None => HookRunner::new(Arc::clone(&config)),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (finish_tx, _) = watch::channel(None);

        App {
            inner: Arc::new(Inner {
                config,
                reporter,
                server,
                hooks,
                registry: self.registry,
                state: Mutex::new(State::default()),
                events,
                finish_tx,
                watcher: Mutex::new(None),
            }),
        }
    }
}

impl App {
    pub fn builder(config: Arc<Config>) -> AppBuilder {
        let registry = LauncherRegistry::from_config(&config);
        AppBuilder {
            config,
            reporter: None,
            server: None,
            hook_env: None,
            registry,
        }
    }

    /// An app with the default reporter, server and launchers.
    pub fn new(config: Arc<Config>) -> Self {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.inner.config
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.inner.reporter
    }

    pub fn hooks(&self) -> &HookRunner {
        &self.inner.hooks
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves once [`exit`](Self::exit) has completed.
    pub async fn finished(&self) -> Finish {
        let mut rx = self.inner.finish_tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(finish) => (*finish).clone().unwrap_or(Finish {
                code: 1,
                error: Some(RunError::Canceled),
            }),
            Err(_) => Finish {
                code: 1,
                error: Some(RunError::Canceled),
            },
        }
    }

    /// `Some` once the app has exited.
    pub fn try_finished(&self) -> Option<Finish> {
        self.inner.finish_tx.borrow().clone()
    }

    pub fn pause(&self) {
        self.lock().paused = true;
        info!("paused; file changes will not start runs");
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        info!("resumed");
    }

    pub fn toggle_pause(&self) -> bool {
        let paused = {
            let mut state = self.lock();
            state.paused = !state.paused;
            state.paused
        };
        info!(paused, "pause toggled");
        paused
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn is_restarting(&self) -> bool {
        self.lock().restarting
    }

    pub fn is_exited(&self) -> bool {
        self.lock().exited
    }

    pub fn is_watching(&self) -> bool {
        self.watcher_slot().is_some()
    }

    /// Automatic trigger from the file watcher. Ignored while paused.
    pub fn file_changed(&self, path: &str) -> Option<RunHandle> {
        self.request_run(TriggerKind::Automatic, format!("File changed: {path}"))
    }

    fn request_run(&self, kind: TriggerKind, reason: String) -> Option<RunHandle> {
        if kind == TriggerKind::Automatic && self.is_paused() {
            debug!(%reason, "paused; trigger ignored");
            return None;
        }
        Some(self.trigger_run(reason))
    }

    /// Run a named hook with lifecycle events around it.
    pub async fn run_hook(&self, name: &str, data: &HookData) -> Result<HookOutput, RunError> {
        if self.inner.config.hook(name).is_none() {
            return Ok(HookOutput::default());
        }
        self.emit(AppEvent::HookStarted {
            name: name.to_string(),
        });
        let result = self.inner.hooks.run_hook(name, data).await;
        if let Err(err) = &result {
            warn!(hook = name, error = %err, "hook failed");
        }
        self.emit(AppEvent::HookFinished {
            name: name.to_string(),
            ok: result.is_ok(),
        });
        result.map_err(RunError::from)
    }

    pub(crate) fn emit(&self, event: AppEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn watcher_slot(&self) -> MutexGuard<'_, Option<WatcherHandle>> {
        self.inner
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
