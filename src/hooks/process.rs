// src/hooks/process.rs

//! Spawning and supervising hook processes.
//!
//! A hook process is owned by a supervisor task that waits for either the
//! child to exit or a kill request. Output chunks from stdout and stderr are
//! forwarded to the caller as they are read, which decides when the hook is
//! "done":
//!
//! - without `wait_for_text`: when the child exits,
//! - with `wait_for_text`: as soon as the combined output matches, leaving
//!   the child running and tracked for a later kill.
//!
//! On unix the child leads its own process group, and a kill signals the
//! whole group so grandchildren of `sh -c` go down with it.

use std::process::Stdio;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{HookError, HookOutput};
use crate::types::EnvMap;

/// What to execute: a shell command line or a program plus argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessTarget {
    Shell(String),
    Exe { exe: String, args: Vec<String> },
}

impl ProcessTarget {
    fn command(&self) -> Command {
        match self {
            ProcessTarget::Shell(line) => shell_command(line),
            ProcessTarget::Exe { exe, args } => {
                let mut c = Command::new(exe);
                c.args(args);
                c
            }
        }
    }
}

/// Build a shell command appropriate for the platform.
pub fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
enum ExitOutcome {
    Exited(Option<i32>),
    Killed,
    WaitFailed(String),
}

/// Handle kept by the hook runner for a child that may still be alive.
#[derive(Debug)]
pub struct TrackedProcess {
    pub(crate) id: u64,
    pub(crate) hook: String,
    pub(crate) pid: Option<u32>,
    kill_tx: oneshot::Sender<()>,
    done_rx: oneshot::Receiver<()>,
}

impl TrackedProcess {
    /// Ask the supervisor to kill the child and wait until it is reaped.
    ///
    /// Returns false when the child had already exited on its own.
    pub async fn terminate(self) -> bool {
        if self.kill_tx.is_closed() {
            return false;
        }
        info!(hook = %self.hook, pid = ?self.pid, "terminating hook process");
        let signalled = self.kill_tx.send(()).is_ok();
        let _ = self.done_rx.await;
        signalled
    }
}

/// A started hook process: the kill handle plus the output the caller
/// drives with [`settle`].
pub struct Spawned {
    pub tracked: TrackedProcess,
    pub output: ProcessOutput,
}

pub struct ProcessOutput {
    chunks: mpsc::UnboundedReceiver<(Stream, Vec<u8>)>,
    exit_rx: oneshot::Receiver<ExitOutcome>,
}

/// Spawn `target` with exactly `env` as its environment.
pub fn spawn(hook: &str, id: u64, target: &ProcessTarget, env: &EnvMap) -> Result<Spawned, HookError> {
    let mut cmd = target.command();
    cmd.env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| HookError::Spawn {
        name: hook.to_string(),
        message: e.to_string(),
    })?;

    let pid = child.id();
    info!(hook, ?pid, ?target, "hook process started");

    let (chunk_tx, chunks) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        forward_chunks(hook, Stream::Stdout, stdout, chunk_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_chunks(hook, Stream::Stderr, stderr, chunk_tx);
    }

    let (kill_tx, kill_rx) = oneshot::channel::<()>();
    let (exit_tx, exit_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();
    let hook_name = hook.to_string();

    tokio::spawn(async move {
        let outcome = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => ExitOutcome::Exited(status.code()),
                Err(e) => ExitOutcome::WaitFailed(e.to_string()),
            },
            cancel = kill_rx => {
                if cancel.is_ok() {
                    if let Err(e) = kill_group(&mut child, pid).await {
                        warn!(hook = %hook_name, error = %e, "failed to kill hook process");
                    }
                    ExitOutcome::Killed
                } else {
                    // Handle dropped without a request; kill_on_drop covers it.
                    match child.wait().await {
                        Ok(status) => ExitOutcome::Exited(status.code()),
                        Err(e) => ExitOutcome::WaitFailed(e.to_string()),
                    }
                }
            }
        };
        debug!(hook = %hook_name, ?outcome, "hook process finished");
        let _ = exit_tx.send(outcome);
        let _ = done_tx.send(());
    });

    Ok(Spawned {
        tracked: TrackedProcess {
            id,
            hook: hook.to_string(),
            pid,
            kill_tx,
            done_rx,
        },
        output: ProcessOutput { chunks, exit_rx },
    })
}

/// Signal the child's process group, then the child itself, and reap it.
async fn kill_group(child: &mut Child, pid: Option<u32>) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) {
            if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                debug!(pgid, error = %e, "killpg failed");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
    child.kill().await
}

/// Read until EOF, forwarding every chunk as soon as it arrives. Once the
/// receiver is gone chunks are only logged, so a long-lived child never
/// blocks on a full pipe.
fn forward_chunks<R>(hook: &str, stream: Stream, mut reader: R, tx: mpsc::UnboundedSender<(Stream, Vec<u8>)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let hook = hook.to_string();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let mut partial = Vec::new();
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            log_lines(&hook, stream, &mut partial, &buf[..n]);
            let _ = tx.send((stream, buf[..n].to_vec()));
        }
        if !partial.is_empty() {
            debug!(hook = %hook, ?stream, "{}", String::from_utf8_lossy(&partial));
        }
    });
}

/// Log each complete line in `partial + chunk`, keeping the unterminated tail.
fn log_lines(hook: &str, stream: Stream, partial: &mut Vec<u8>, chunk: &[u8]) {
    partial.extend_from_slice(chunk);
    while let Some(end) = partial.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = partial.drain(..=end).collect();
        let text = String::from_utf8_lossy(&line);
        debug!(hook, ?stream, "{}", text.trim_end());
    }
}

/// How a spawned hook settled from the caller's point of view.
#[derive(Debug)]
pub enum Settled {
    /// The child exited successfully.
    Exited(HookOutput),
    /// `wait_for_text` matched; the child keeps running.
    Ready(HookOutput),
}

/// Drive a spawned hook's output until it is done.
pub async fn settle(
    hook: &str,
    output: ProcessOutput,
    wait_for_text: Option<&Regex>,
) -> Result<Settled, HookError> {
    let ProcessOutput { mut chunks, exit_rx } = output;

    let mut captured = Captured::default();

    while let Some((stream, chunk)) = chunks.recv().await {
        captured.push(stream, &chunk);

        if let Some(re) = wait_for_text {
            if re.is_match(&String::from_utf8_lossy(&captured.combined)) {
                info!(hook, pattern = %re, "hook output matched; continuing without waiting for exit");
                return Ok(Settled::Ready(captured.into_output()));
            }
        }
    }

    let output = captured.into_output();

    let outcome = exit_rx.await.unwrap_or(ExitOutcome::Killed);
    match outcome {
        ExitOutcome::Exited(Some(0)) => {}
        ExitOutcome::Exited(code) => {
            return Err(HookError::Failed {
                name: hook.to_string(),
                code: code.unwrap_or(-1),
                stderr: output.stderr,
            });
        }
        ExitOutcome::Killed => return Err(HookError::Killed(hook.to_string())),
        ExitOutcome::WaitFailed(message) => {
            return Err(HookError::Spawn {
                name: hook.to_string(),
                message,
            });
        }
    }

    if let Some(re) = wait_for_text {
        return Err(HookError::NotReady {
            name: hook.to_string(),
            pattern: re.as_str().to_string(),
        });
    }

    Ok(Settled::Exited(output))
}

/// Raw bytes seen so far, per stream and interleaved in arrival order.
#[derive(Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    combined: Vec<u8>,
}

impl Captured {
    fn push(&mut self, stream: Stream, chunk: &[u8]) {
        match stream {
            Stream::Stdout => self.stdout.extend_from_slice(chunk),
            Stream::Stderr => self.stderr.extend_from_slice(chunk),
        }
        self.combined.extend_from_slice(chunk);
    }

    fn into_output(self) -> HookOutput {
        HookOutput {
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        }
    }
}
