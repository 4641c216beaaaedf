// src/app/run.rs

//! Triggering and executing runs.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::state::{OutcomeTx, PendingRun, RunHandle, RunOutcome};
use super::{App, AppEvent};
use crate::errors::RunError;
use crate::hooks::HookData;
use crate::runner::Runner;
use crate::timeout::{RunTimeout, TimeoutGuard};

impl App {
    /// Request a run (explicit trigger; not affected by `pause`).
    ///
    /// Single-flight: with a run in flight, its runners are stopped once and
    /// the new run starts only after the old one settled. Triggers arriving
    /// while such a replacement is pending coalesce into it and share its
    /// handle; the newest reason wins.
    pub fn trigger_run(&self, reason: impl Into<String>) -> RunHandle {
        let reason = reason.into();
        let mut state = self.lock();

        if state.exited {
            debug!(%reason, "app exited; trigger ignored");
            return RunHandle::settled(Err(RunError::Canceled));
        }

        if let Some(pending) = state.pending.as_mut() {
            debug!(%reason, previous = %pending.reason, "coalescing trigger into pending run");
            pending.reason = reason;
            return pending.handle.clone();
        }

        let (tx, handle) = RunHandle::channel();
        match state.current_handle() {
            Some(previous) => {
                info!(%reason, "run in flight; superseding it");
                state.restarting = true;
                state.pending = Some(PendingRun {
                    reason,
                    tx,
                    handle: handle.clone(),
                });
                drop(state);
                let app = self.clone();
                tokio::spawn(async move { app.supersede(previous).await });
            }
            None => {
                let id = state.begin_run(&reason, handle.clone());
                drop(state);
                let app = self.clone();
                tokio::spawn(async move { app.run_cycle(id, reason, tx).await });
            }
        }
        handle
    }

    /// Stop the current run and start the run currently recorded as pending.
    async fn supersede(&self, previous: RunHandle) {
        self.stop_runners().await;
        let _ = previous.wait().await;

        let next = {
            let mut state = self.lock();
            state.restarting = false;
            match state.pending.take() {
                Some(pending) if state.exited => {
                    pending.tx.send_replace(Some(Err(RunError::Canceled)));
                    None
                }
                Some(pending) => {
                    let id = state.begin_run(&pending.reason, pending.handle.clone());
                    Some((id, pending.reason, pending.tx))
                }
                None => None,
            }
        };

        if let Some((id, reason, tx)) = next {
            self.run_cycle(id, reason, tx).await;
        }
    }

    /// Explicit restart: supersede whatever is in flight with a fresh
    /// "Start" run.
    pub fn restart(&self) -> RunHandle {
        info!("restart requested");
        self.trigger_run("Start")
    }

    /// Pause-aware trigger; a no-op while paused.
    pub async fn run_tests(&self) -> RunOutcome {
        if self.is_paused() {
            debug!("paused; run_tests ignored");
            return Ok(());
        }
        self.trigger_run("Run tests").wait().await
    }

    /// One run cycle: `before_tests`, timeout, runners, `after_tests`.
    async fn run_cycle(&self, run_id: u64, reason: String, tx: OutcomeTx) {
        info!(run_id, %reason, "test run started");
        self.emit(AppEvent::RunStarted {
            run_id,
            reason: reason.clone(),
        });

        let data = HookData::from([("reason".to_string(), reason.clone())]);
        let mut result = self.run_hook("before_tests", &data).await.map(drop);

        if result.is_ok() {
            let timeout = RunTimeout::from_config(self.config().timeout());
            self.lock().timeout = Some(timeout.clone());
            self.emit(AppEvent::TimeoutCreated {
                run_id,
                timeout_id: timeout.id(),
            });

            let events = self.inner.events.clone();
            let guard = TimeoutGuard::new(timeout.clone(), move |t| {
                let _ = events.send(AppEvent::TimeoutDisposed { timeout_id: t.id() });
            });
            result = self.single_run_with(run_id, &timeout).await;
            drop(guard);

            let mut state = self.lock();
            if state.timeout.as_ref().is_some_and(|t| t.id() == timeout.id()) {
                state.timeout = None;
            }
        }

        let (superseded, exited) = {
            let state = self.lock();
            (state.restarting, state.exited)
        };
        if let Err(err) = &result {
            if superseded || exited {
                debug!(run_id, error = %err, superseded, exited, "run error swallowed");
                result = if exited { Err(RunError::Canceled) } else { Ok(()) };
            } else {
                warn!(run_id, error = %err, "test run failed");
            }
        }

        if result.is_ok() && !superseded && !exited {
            result = self.run_hook("after_tests", &data).await.map(drop);
        }

        self.lock().end_run(run_id);
        info!(run_id, ok = result.is_ok(), "test run finished");
        self.emit(AppEvent::RunFinished {
            run_id,
            outcome: result.clone(),
        });
        tx.send_replace(Some(result.clone()));

        if self.config().single_run() && !superseded && !exited {
            self.wrap_up(result.err()).await;
        }
    }

    /// Start every resolved launcher's runner and race them against
    /// `timeout`.
    ///
    /// - `restarting`: resolves `Ok` without touching any runner.
    /// - `exited`: rejects with the hidden `RunError::Canceled`.
    /// - timeout fires: all runners are killed; the first runner error wins
    ///   (`Killed` for in-flight sessions, `TimedOut` for runners that never
    ///   started). If every runner still succeeded, the timeout wins the tie.
    pub async fn single_run(&self, timeout: &RunTimeout) -> RunOutcome {
        let run_id = self.lock().run_seq;
        self.single_run_with(run_id, timeout).await
    }

    async fn single_run_with(&self, run_id: u64, timeout: &RunTimeout) -> RunOutcome {
        let runners: Vec<Arc<dyn Runner>> = {
            let mut state = self.lock();
            if state.restarting {
                info!(run_id, "restart in flight; skipping run");
                return Ok(());
            }
            if state.exited {
                return Err(RunError::Canceled);
            }
            let runners: Vec<Arc<dyn Runner>> = state
                .launchers
                .iter()
                .map(|l| l.create_runner(Arc::clone(self.reporter())))
                .collect();
            state.runners = runners.clone();
            runners
        };

        let limit = match self.config().parallel() {
            n if n > 0 => {
                let permits = usize::try_from(n)
                    .map_or(Semaphore::MAX_PERMITS, |n| n.min(Semaphore::MAX_PERMITS));
                Some(Arc::new(Semaphore::new(permits)))
            }
            _ => None,
        };
        debug!(run_id, runners = runners.len(), parallel = self.config().parallel(), "starting runners");

        let mut set = JoinSet::new();
        for runner in runners {
            let app = self.clone();
            let timeout = timeout.clone();
            let limit = limit.clone();
            set.spawn(async move {
                let _permit = match limit {
                    Some(sem) => Some(sem.acquire_owned().await.map_err(|_| RunError::Canceled)?),
                    None => None,
                };
                {
                    let state = app.lock();
                    if state.exited {
                        return Err(RunError::Canceled);
                    }
                    if state.restarting {
                        return Ok(());
                    }
                }
                if timeout.is_timed_out() {
                    return Err(RunError::TimedOut);
                }
                app.emit(AppEvent::RunnerStarted {
                    run_id,
                    launcher: runner.name().to_string(),
                });
                runner.start().await
            });
        }

        let mut first_err: Option<RunError> = None;
        let fired = tokio::select! {
            biased;
            _ = timeout.fired() => true,
            _ = collect(&mut set, &mut first_err) => false,
        };

        if fired {
            warn!(run_id, timeout_id = timeout.id(), "run timeout fired; killing runners");
            self.emit(AppEvent::TimeoutFired {
                timeout_id: timeout.id(),
            });
            self.kill_runners().await;
            collect(&mut set, &mut first_err).await;
        }

        self.lock().runners.clear();

        match (first_err, fired) {
            (Some(err), _) => Err(err),
            (None, true) => Err(RunError::TimedOut),
            (None, false) => Ok(()),
        }
    }

    /// Exit every active runner and dispose the active timeout.
    pub async fn stop_runners(&self) {
        let (runners, timeout) = {
            let mut state = self.lock();
            (state.runners.clone(), state.timeout.take())
        };

        if let Some(timeout) = timeout {
            if timeout.dispose() {
                self.emit(AppEvent::TimeoutDisposed {
                    timeout_id: timeout.id(),
                });
            }
        }

        let count = runners.len();
        exit_all(runners).await;
        info!(count, "runners stopped");
        self.emit(AppEvent::RunnersStopped { count });
    }

    /// Abort the current run without starting a new one.
    pub async fn kill_runners(&self) {
        self.stop_runners().await;
    }
}

/// Drain `set`, keeping the first error. Cancel-safe: results already
/// joined are recorded in `first_err`.
async fn collect(set: &mut JoinSet<RunOutcome>, first_err: &mut Option<RunError>) {
    while let Some(joined) = set.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(RunError::Runner(format!("runner task failed: {e}"))));
        if let Err(err) = outcome {
            debug!(error = %err, "runner settled with error");
            first_err.get_or_insert(err);
        }
    }
}

/// Exit runners concurrently and wait for all of them.
pub(crate) async fn exit_all(runners: Vec<Arc<dyn Runner>>) {
    let mut set = JoinSet::new();
    for runner in runners {
        set.spawn(async move { runner.exit().await });
    }
    while set.join_next().await.is_some() {}
}
