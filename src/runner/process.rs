// src/runner/process.rs

//! Command-backed launcher: each run spawns the configured command and
//! reports a single result named after the launcher.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::{Launcher, Runner, RunnerState};
use crate::config::LauncherConfig;
use crate::errors::RunError;
use crate::fs::executable_exists;
use crate::hooks::process::shell_command;
use crate::reporter::{Reporter, TestResult};
use crate::types::{inherited_env, BoxFuture, EnvMap};

/// Launcher built from a `[launchers.<name>]` table.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    name: String,
    spec: LauncherConfig,
    cwd: PathBuf,
    env: EnvMap,
}

impl ProcessLauncher {
    /// The child gets the current environment with the table's `env` on top.
    pub fn new(name: impl Into<String>, spec: LauncherConfig, cwd: PathBuf) -> Self {
        let mut env = inherited_env();
        env.extend(spec.env.clone());
        Self {
            name: name.into(),
            spec,
            cwd,
            env,
        }
    }

    fn command(&self) -> Option<Command> {
        match (&self.spec.command, &self.spec.exe) {
            (Some(line), _) => Some(shell_command(line)),
            (None, Some(exe)) => {
                let mut c = Command::new(exe);
                c.args(&self.spec.args);
                Some(c)
            }
            (None, None) => None,
        }
    }
}

impl Launcher for ProcessLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match (&self.spec.command, &self.spec.exe) {
                (None, Some(exe)) => executable_exists(exe, Some(&self.env)).await,
                _ => true,
            }
        })
    }

    fn create_runner(&self, reporter: Arc<dyn Reporter>) -> Arc<dyn Runner> {
        Arc::new(ProcessRunner::new(self.clone(), reporter))
    }
}

struct Session {
    state: RunnerState,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// One spawned launcher command for one run.
pub struct ProcessRunner {
    launcher: ProcessLauncher,
    reporter: Arc<dyn Reporter>,
    session: Mutex<Session>,
    done_tx: watch::Sender<bool>,
}

impl ProcessRunner {
    pub fn new(launcher: ProcessLauncher, reporter: Arc<dyn Reporter>) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            launcher,
            reporter,
            session: Mutex::new(Session {
                state: RunnerState::Pending,
                cancel_tx: None,
            }),
            done_tx,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn finish(&self) {
        self.lock().state = RunnerState::Exited;
        self.done_tx.send_replace(true);
    }

    async fn run_session(&self, cancel_rx: oneshot::Receiver<()>) -> Result<(), RunError> {
        let name = self.launcher.name.as_str();
        let Some(mut cmd) = self.launcher.command() else {
            return Err(RunError::Config(format!(
                "No command or exe/args specified for launcher {name}"
            )));
        };

        cmd.current_dir(&self.launcher.cwd)
            .env_clear()
            .envs(&self.launcher.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for launcher '{name}'"))
            .map_err(|e| RunError::Infrastructure(format!("{e:#}")))?;

        info!(launcher = name, pid = ?child.id(), "launcher process started");

        if let Some(stdout) = child.stdout.take() {
            drain(name, "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            drain(name, "stderr", stderr);
        }

        tokio::select! {
            status = child.wait() => {
                let status = status
                    .with_context(|| format!("waiting for process of launcher '{name}'"))
                    .map_err(|e| RunError::Infrastructure(format!("{e:#}")))?;
                let code = status.code().unwrap_or(-1);
                info!(launcher = name, exit_code = code, success = status.success(), "launcher process exited");

                let result = if status.success() {
                    TestResult::passed(name)
                } else {
                    TestResult::failed(name, RunError::Runner(format!("{name} exited with code {code}")))
                };
                self.reporter.report(Some(name), result);
                Ok(())
            }
            cancel = cancel_rx => {
                if cancel.is_ok() {
                    info!(launcher = name, "exit requested; killing launcher process");
                    if let Err(e) = child.kill().await {
                        warn!(launcher = name, error = %e, "failed to kill launcher process");
                    }
                }
                Err(RunError::Killed)
            }
        }
    }
}

fn drain<R>(launcher: &str, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let launcher = launcher.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(launcher = %launcher, "{stream}: {line}");
        }
    });
}

impl Runner for ProcessRunner {
    fn name(&self) -> &str {
        &self.launcher.name
    }

    fn start(&self) -> BoxFuture<'_, Result<(), RunError>> {
        Box::pin(async move {
            let cancel_rx = {
                let mut session = self.lock();
                match session.state {
                    RunnerState::Exited => return Err(RunError::Killed),
                    RunnerState::Running => {
                        return Err(RunError::Runner(format!(
                            "{} already started",
                            self.launcher.name
                        )));
                    }
                    RunnerState::Pending => {}
                }
                let (tx, rx) = oneshot::channel();
                session.state = RunnerState::Running;
                session.cancel_tx = Some(tx);
                rx
            };

            let result = self.run_session(cancel_rx).await;
            self.finish();
            result
        })
    }

    fn exit(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let (was_pending, cancel_tx) = {
                let mut session = self.lock();
                match session.state {
                    RunnerState::Exited => return,
                    RunnerState::Pending => {
                        session.state = RunnerState::Exited;
                        (true, None)
                    }
                    RunnerState::Running => (false, session.cancel_tx.take()),
                }
            };
            if was_pending {
                self.done_tx.send_replace(true);
                return;
            }
            if let Some(tx) = cancel_tx {
                let _ = tx.send(());
            }
            let mut done = self.done_tx.subscribe();
            let _ = done.wait_for(|d| *d).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::MemoryReporter;
    use std::time::Duration;

    fn launcher(command: &str) -> ProcessLauncher {
        ProcessLauncher::new(
            "sh",
            LauncherConfig {
                command: Some(command.to_string()),
                ..Default::default()
            },
            std::env::temp_dir(),
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_pass_for_zero_exit() {
        let reporter = Arc::new(MemoryReporter::new());
        let runner = launcher("true").create_runner(reporter.clone());
        runner.start().await.unwrap();
        let totals = reporter.totals();
        assert_eq!((totals.total, totals.pass), (1, 1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_while_running_rejects_with_killed() {
        let reporter = Arc::new(MemoryReporter::new());
        let runner = launcher("sleep 5").create_runner(reporter.clone());
        let r2 = runner.clone();
        let start = tokio::spawn(async move { r2.start().await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        runner.exit().await;
        runner.exit().await;

        let res = tokio::time::timeout(Duration::from_secs(2), start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(res, Err(RunError::Killed));
        assert_eq!(reporter.totals().total, 0);
    }

    #[tokio::test]
    async fn exit_before_start_is_terminal() {
        let reporter = Arc::new(MemoryReporter::new());
        let runner = launcher("true").create_runner(reporter);
        runner.exit().await;
        assert_eq!(runner.start().await, Err(RunError::Killed));
    }
}
