use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use testloop::errors::RunError;
use testloop::reporter::{Reporter, TestResult};
use testloop::runner::{Launcher, Runner, RunnerState};
use testloop::server::Server;
use testloop::types::BoxFuture;

/// Call counters shared by every runner a [`FakeLauncher`] creates.
#[derive(Debug, Default)]
pub struct RunnerStats {
    pub created: AtomicUsize,
    pub starts: AtomicUsize,
    pub exits: AtomicUsize,
    pub killed: AtomicUsize,
}

impl RunnerStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    /// Sessions that were torn down while `start` was outstanding.
    pub fn killed(&self) -> usize {
        self.killed.load(Ordering::SeqCst)
    }
}

/// What a fake session does once started.
#[derive(Debug, Clone)]
pub struct Behaviour {
    /// `None` never finishes on its own.
    pub delay: Option<Duration>,
    /// One reported result per entry: `true` passes.
    pub results: Vec<bool>,
    /// Settle with this error instead of reporting.
    pub error: Option<RunError>,
}

/// A launcher whose runners follow a scripted [`Behaviour`].
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    name: String,
    behaviour: Behaviour,
    stats: Arc<RunnerStats>,
    available: bool,
}

impl FakeLauncher {
    pub fn new(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            stats: Arc::new(RunnerStats::default()),
            available: true,
        }
    }

    /// Reports one passing test right away.
    pub fn passing(name: &str) -> Self {
        Self::new(
            name,
            Behaviour {
                delay: Some(Duration::ZERO),
                results: vec![true],
                error: None,
            },
        )
    }

    /// Reports one failing test right away.
    pub fn failing(name: &str) -> Self {
        Self::new(
            name,
            Behaviour {
                delay: Some(Duration::ZERO),
                results: vec![false],
                error: None,
            },
        )
    }

    /// Reports one passing test after `delay`.
    pub fn slow(name: &str, delay: Duration) -> Self {
        Self::new(
            name,
            Behaviour {
                delay: Some(delay),
                results: vec![true],
                error: None,
            },
        )
    }

    /// Never finishes unless exited.
    pub fn hanging(name: &str) -> Self {
        Self::new(
            name,
            Behaviour {
                delay: None,
                results: vec![],
                error: None,
            },
        )
    }

    /// Session dies with `error`.
    pub fn erroring(name: &str, error: RunError) -> Self {
        Self::new(
            name,
            Behaviour {
                delay: Some(Duration::ZERO),
                results: vec![],
                error: Some(error),
            },
        )
    }

    /// Pretend the environment is not installed.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn stats(&self) -> Arc<RunnerStats> {
        Arc::clone(&self.stats)
    }

    pub fn into_arc(self) -> Arc<dyn Launcher> {
        Arc::new(self)
    }
}

impl Launcher for FakeLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> BoxFuture<'_, bool> {
        let available = self.available;
        Box::pin(async move { available })
    }

    fn create_runner(&self, reporter: Arc<dyn Reporter>) -> Arc<dyn Runner> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeRunner::new(
            &self.name,
            self.behaviour.clone(),
            Arc::clone(&self.stats),
            reporter,
        ))
    }
}

pub struct FakeRunner {
    name: String,
    behaviour: Behaviour,
    stats: Arc<RunnerStats>,
    reporter: Arc<dyn Reporter>,
    state: Mutex<RunnerState>,
    exit_tx: watch::Sender<bool>,
}

impl FakeRunner {
    pub fn new(
        name: &str,
        behaviour: Behaviour,
        stats: Arc<RunnerStats>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let (exit_tx, _) = watch::channel(false);
        Self {
            name: name.to_string(),
            behaviour,
            stats,
            reporter,
            state: Mutex::new(RunnerState::Pending),
            exit_tx,
        }
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock().unwrap()
    }
}

impl Runner for FakeRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> BoxFuture<'_, Result<(), RunError>> {
        Box::pin(async move {
            self.stats.starts.fetch_add(1, Ordering::SeqCst);
            {
                let mut state = self.state.lock().unwrap();
                if *state == RunnerState::Exited {
                    return Err(RunError::Killed);
                }
                *state = RunnerState::Running;
            }

            let mut exited = self.exit_tx.subscribe();
            let finish = async {
                match self.behaviour.delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let result = tokio::select! {
                biased;
                _ = exited.wait_for(|e| *e) => {
                    self.stats.killed.fetch_add(1, Ordering::SeqCst);
                    Err(RunError::Killed)
                }
                _ = finish => {
                    match &self.behaviour.error {
                        Some(err) => Err(err.clone()),
                        None => {
                            for (i, passed) in self.behaviour.results.iter().enumerate() {
                                let test = format!("{} test {}", self.name, i + 1);
                                let result = if *passed {
                                    TestResult::passed(test)
                                } else {
                                    TestResult::failed(test, RunError::Runner("assertion failed".into()))
                                };
                                self.reporter.report(Some(&self.name), result);
                            }
                            Ok(())
                        }
                    }
                }
            };

            *self.state.lock().unwrap() = RunnerState::Exited;
            result
        })
    }

    fn exit(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.stats.exits.fetch_add(1, Ordering::SeqCst);
            {
                let mut state = self.state.lock().unwrap();
                if *state == RunnerState::Pending {
                    *state = RunnerState::Exited;
                }
            }
            self.exit_tx.send_replace(true);
        })
    }
}

/// In-memory [`Server`]: hands out a fixed address or a scripted error.
#[derive(Debug, Default)]
pub struct FakeServer {
    port: u16,
    error: Option<RunError>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// A server whose `start` fails like an address already in use.
    pub fn address_in_use(port: u16) -> Self {
        Self {
            port,
            error: Some(RunError::Infrastructure(format!(
                "could not listen on localhost:{port}: Address already in use"
            ))),
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Server for FakeServer {
    fn start(&self) -> BoxFuture<'_, Result<SocketAddr, RunError>> {
        Box::pin(async move {
            self.starts.fetch_add(1, Ordering::SeqCst);
            match &self.error {
                Some(err) => Err(err.clone()),
                None => Ok(SocketAddr::from(([127, 0, 0, 1], self.port))),
            }
        })
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
        })
    }
}
