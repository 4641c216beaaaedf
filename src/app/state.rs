// src/app/state.rs

//! Mutable orchestrator state and run handles.
//!
//! Everything here sits behind one `std::sync::Mutex` that is never held
//! across an `.await`; the async parts of the app only take snapshots.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::RunError;
use crate::runner::{Launcher, Runner};
use crate::timeout::RunTimeout;

/// Settlement of one run as seen by whoever triggered it.
pub type RunOutcome = Result<(), RunError>;

pub(crate) type OutcomeTx = watch::Sender<Option<RunOutcome>>;

/// Awaitable settlement of a triggered run.
///
/// Triggers that coalesce into the same pending run share one handle.
#[derive(Clone)]
pub struct RunHandle {
    rx: watch::Receiver<Option<RunOutcome>>,
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("settled", &self.rx.borrow().clone())
            .finish()
    }
}

impl RunHandle {
    pub(crate) fn channel() -> (OutcomeTx, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    pub(crate) fn settled(outcome: RunOutcome) -> Self {
        let (tx, handle) = Self::channel();
        tx.send_replace(Some(outcome));
        handle
    }

    /// `None` while the run is still in flight.
    pub fn try_outcome(&self) -> Option<RunOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait for the run to settle.
    pub async fn wait(mut self) -> RunOutcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Err(RunError::Canceled)),
            Err(_) => Err(RunError::Canceled),
        }
    }
}

pub(crate) struct CurrentRun {
    pub id: u64,
    pub reason: String,
    pub handle: RunHandle,
}

/// A run waiting for the current one to be torn down.
pub(crate) struct PendingRun {
    pub reason: String,
    pub tx: OutcomeTx,
    pub handle: RunHandle,
}

#[derive(Default)]
pub(crate) struct State {
    pub started: bool,
    pub paused: bool,
    pub restarting: bool,
    pub exited: bool,
    pub server_stopped: bool,
    pub run_seq: u64,
    pub current: Option<CurrentRun>,
    pub pending: Option<PendingRun>,
    pub timeout: Option<RunTimeout>,
    pub runners: Vec<Arc<dyn Runner>>,
    pub launchers: Vec<Arc<dyn Launcher>>,
}

impl State {
    /// Register a new current run and return its id.
    pub fn begin_run(&mut self, reason: &str, handle: RunHandle) -> u64 {
        self.run_seq += 1;
        let id = self.run_seq;
        self.current = Some(CurrentRun {
            id,
            reason: reason.to_string(),
            handle,
        });
        id
    }

    /// Clear `current` only if it still refers to run `id`.
    pub fn end_run(&mut self, id: u64) {
        if self.current.as_ref().is_some_and(|c| c.id == id) {
            self.current = None;
        }
    }

    pub fn current_handle(&self) -> Option<RunHandle> {
        self.current.as_ref().map(|c| c.handle.clone())
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("paused", &self.paused)
            .field("restarting", &self.restarting)
            .field("exited", &self.exited)
            .field("current", &self.current.as_ref().map(|c| (c.id, c.reason.as_str())))
            .field("pending", &self.pending.as_ref().map(|p| p.reason.as_str()))
            .field("runners", &self.runners.len())
            .finish_non_exhaustive()
    }
}
