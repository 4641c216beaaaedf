// src/app/exit.rs

//! Start-up, CI wrap-up and the exit sequence.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::run::exit_all;
use super::{App, AppEvent, Finish};
use crate::errors::RunError;
use crate::hooks::HookData;
use crate::reporter::{exit_code_for, TestResult};
use crate::runner::resolve_launchers;
use crate::watch::{spawn_watcher, SourcePatterns};

impl App {
    /// Bring the app up and issue the first run.
    ///
    /// Order: server, `on_start` hook, launcher resolution, file watcher,
    /// `trigger_run("Start")`. A failure in any step goes to
    /// [`wrap_up`](Self::wrap_up), so the outcome always arrives through
    /// [`finished`](Self::finished).
    pub async fn start(&self) {
        {
            let mut state = self.lock();
            if state.started || state.exited {
                warn!("start called twice; ignoring");
                return;
            }
            state.started = true;
        }
        let config = self.config().clone();
        info!(mode = %config.mode(), "starting");

        match self.inner.server.start().await {
            Ok(addr) => self.hooks().set_port(addr.port()),
            Err(err) => {
                error!(error = %err, "server failed to start");
                return self.wrap_up(Some(err)).await;
            }
        }

        if let Err(err) = self.run_hook("on_start", &HookData::new()).await {
            return self.wrap_up(Some(err)).await;
        }

        match resolve_launchers(&config, &self.inner.registry).await {
            Ok(launchers) => self.lock().launchers = launchers,
            Err(err) => {
                error!(error = %err, "launcher resolution failed");
                return self.wrap_up(Some(err.into())).await;
            }
        }

        if !config.disable_watching() {
            if let Err(err) = self.start_watching() {
                warn!(error = %format!("{err:#}"), "file watching disabled");
            }
        }

        self.trigger_run("Start");
    }

    fn start_watching(&self) -> anyhow::Result<()> {
        let config = self.config();
        let patterns = SourcePatterns::from_config(config)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = spawn_watcher(config.cwd().clone(), patterns, tx)?;

        *self.watcher_slot() = Some(handle);

        let app = self.clone();
        tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                if app.is_exited() {
                    break;
                }
                info!(%path, "file changed");
                app.file_changed(&path);
            }
        });
        Ok(())
    }

    fn stop_watching(&self) {
        let handle = self.watcher_slot().take();
        if let Some(handle) = handle {
            debug!(root = %handle.root().display(), "file watcher stopped");
        }
    }

    /// Final aggregation for single-run mode.
    ///
    /// A visible error is recorded as a failing result named "Error"; the
    /// server is always stopped; without an error the reporter totals decide
    /// the exit code.
    pub async fn wrap_up(&self, error: Option<RunError>) {
        let error = error.filter(|e| !e.hide_from_reporter());
        if let Some(err) = &error {
            self.reporter()
                .report(None, TestResult::failed("Error", err.clone()));
        }
        self.stop_server().await;

        let error = error.or_else(|| self.get_exit_code().map(RunError::Results));
        self.exit(error).await;
    }

    /// `None` means success.
    pub fn get_exit_code(&self) -> Option<String> {
        exit_code_for(
            self.reporter().totals(),
            self.config().fail_on_zero_tests(),
        )
    }

    /// Exit every runner still registered, tolerating ones already gone.
    pub async fn exit_runners(&self) {
        let runners = std::mem::take(&mut self.lock().runners);
        if runners.is_empty() {
            return;
        }
        debug!(count = runners.len(), "exiting runners");
        exit_all(runners).await;
    }

    pub async fn stop_server(&self) {
        self.inner.server.stop().await;
        let first = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.server_stopped, true)
        };
        if first {
            self.emit(AppEvent::ServerStopped);
        }
    }

    /// Tear everything down and publish the [`Finish`].
    ///
    /// Runs once; later calls return immediately. The `on_exit` hook always
    /// settles before the finish is published, and its failure is logged
    /// without changing the outcome.
    pub async fn exit(&self, error: Option<RunError>) {
        let current = {
            let mut state = self.lock();
            if state.exited {
                return;
            }
            state.exited = true;
            state.current_handle()
        };
        info!(error = ?error, "exiting");

        self.stop_runners().await;
        if let Some(current) = current {
            let _ = current.wait().await;
        }
        self.exit_runners().await;
        self.stop_watching();

        let mut data = HookData::new();
        if let Some(err) = &error {
            data.insert("error".to_string(), err.to_string());
        }
        if let Err(err) = self.run_hook("on_exit", &data).await {
            warn!(error = %err, "on_exit hook failed");
        }

        let killed = self.hooks().kill_tracked().await;
        if killed > 0 {
            self.emit(AppEvent::HookProcessesKilled { count: killed });
        }

        self.stop_server().await;
        self.reporter().finish();

        let code = if error.is_some() { 1 } else { 0 };
        info!(code, "exited");
        self.emit(AppEvent::Exited { code });
        self.inner
            .finish_tx
            .send_replace(Some(Finish { code, error }));
    }
}
