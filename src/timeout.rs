// src/timeout.rs

//! Per-run deadline.
//!
//! A [`RunTimeout`] fires its notification at most once. Disposal cancels
//! the timer task and, because firing and disposing share one lock, a
//! disposed timeout can never fire afterwards even if the timer was already
//! due.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct RunTimeout {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    duration: Option<Duration>,
    state: Mutex<State>,
    fired_tx: watch::Sender<bool>,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct State {
    timed_out: bool,
    fired: bool,
    disposed: bool,
}

impl fmt::Debug for RunTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("RunTimeout")
            .field("id", &self.inner.id)
            .field("duration", &self.inner.duration)
            .field("timed_out", &state.timed_out)
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl RunTimeout {
    fn build(duration: Option<Duration>) -> Self {
        let (fired_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                duration,
                state: Mutex::new(State::default()),
                fired_tx,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// A timeout that never fires on its own.
    pub fn disabled() -> Self {
        Self::build(None)
    }

    /// Start a countdown of `duration`. Must be called inside a runtime.
    pub fn start(duration: Duration) -> Self {
        let timeout = Self::build(Some(duration));
        let weak = Arc::downgrade(&timeout.inner);
        let token = timeout.inner.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(duration) => fire_weak(&weak),
            }
        });
        timeout
    }

    /// `None` disables the timeout; a zero duration is timed out immediately.
    pub fn from_config(duration: Option<Duration>) -> Self {
        match duration {
            None => Self::disabled(),
            Some(d) if d.is_zero() => {
                let timeout = Self::build(Some(d));
                timeout.set_timed_out();
                timeout
            }
            Some(d) => Self::start(d),
        }
    }

    /// Seconds as written in config; `<= 0` is already timed out and
    /// anything past `Duration::MAX` saturates.
    pub fn from_secs(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Self::from_config(Some(Duration::ZERO));
        }
        Self::start(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Mark as timed out now, without waiting for the timer.
    pub fn set_timed_out(&self) {
        self.fire();
    }

    pub fn is_timed_out(&self) -> bool {
        self.lock().timed_out
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Fire the notification unless already fired or disposed.
    fn fire(&self) -> bool {
        fire_inner(&self.inner)
    }

    /// Resolves once the timeout fires; stays pending forever otherwise.
    pub async fn fired(&self) {
        let mut rx = self.inner.fired_tx.subscribe();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Release the timer. Returns true only for the first call.
    pub fn dispose(&self) -> bool {
        let mut state = self.lock();
        if state.disposed {
            return false;
        }
        state.disposed = true;
        self.inner.cancel.cancel();
        debug!(timeout_id = self.inner.id, "run timeout disposed");
        true
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock_state(&self.inner)
    }
}

fn lock_state(inner: &Inner) -> MutexGuard<'_, State> {
    inner.state.lock().unwrap_or_else(|p| p.into_inner())
}

fn fire_inner(inner: &Inner) -> bool {
    let mut state = lock_state(inner);
    if state.disposed || state.fired {
        return false;
    }
    state.fired = true;
    state.timed_out = true;
    info!(timeout_id = inner.id, duration = ?inner.duration, "run timed out");
    inner.fired_tx.send_replace(true);
    true
}

fn fire_weak(weak: &Weak<Inner>) {
    if let Some(inner) = weak.upgrade() {
        fire_inner(&inner);
    }
}

/// Disposes a [`RunTimeout`] when dropped, covering every exit path of the
/// scope that owns it.
pub struct TimeoutGuard<F: FnMut(&RunTimeout)> {
    timeout: RunTimeout,
    on_dispose: F,
}

impl<F: FnMut(&RunTimeout)> TimeoutGuard<F> {
    /// `on_dispose` runs only if this drop performs the first disposal.
    pub fn new(timeout: RunTimeout, on_dispose: F) -> Self {
        Self {
            timeout,
            on_dispose,
        }
    }

    pub fn timeout(&self) -> &RunTimeout {
        &self.timeout
    }
}

impl<F: FnMut(&RunTimeout)> Drop for TimeoutGuard<F> {
    fn drop(&mut self) {
        if self.timeout.dispose() {
            (self.on_dispose)(&self.timeout);
        }
    }
}
