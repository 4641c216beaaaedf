// src/hooks/mod.rs

//! Named lifecycle hooks (`on_start`, `on_exit`, `before_tests`, ...).
//!
//! A hook descriptor is settled into a [`HookPlan`] at invocation time:
//! template tokens are substituted against the run context, the environment
//! is merged, and `wait_for_text` is compiled. Running the plan either calls
//! a callback or spawns a process supervised by [`process`].

pub mod process;
pub mod template;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, Hook};
use crate::config::model::HookTable;
use crate::config::settings::url_for;
use crate::errors::RunError;
use crate::types::{inherited_env, BoxFuture, EnvMap};

use self::process::{ProcessTarget, Settled, TrackedProcess};
pub use self::template::substitute;

/// Context data passed to a hook and used for `<token>` substitution.
pub type HookData = BTreeMap<String, String>;

/// Programmatic hook: receives the settled config and the hook data.
pub type HookCallback =
    Arc<dyn Fn(Arc<Config>, HookData) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("No command or exe/args specified for hook {0}")]
    MissingCommand(String),

    #[error("invalid wait_for_text pattern for hook {name}: {message}")]
    InvalidPattern { name: String, message: String },

    #[error("failed to start hook {name}: {message}")]
    Spawn { name: String, message: String },

    #[error("hook {name} exited with code {code}")]
    Failed {
        name: String,
        code: i32,
        stderr: String,
    },

    #[error("hook {name} exited before output matched {pattern}")]
    NotReady { name: String, pattern: String },

    #[error("hook {0} was killed")]
    Killed(String),

    #[error("{message}")]
    Callback { name: String, message: String },
}

impl HookError {
    pub fn hook_name(&self) -> &str {
        match self {
            HookError::MissingCommand(name) | HookError::Killed(name) => name,
            HookError::InvalidPattern { name, .. }
            | HookError::Spawn { name, .. }
            | HookError::Failed { name, .. }
            | HookError::NotReady { name, .. }
            | HookError::Callback { name, .. } => name,
        }
    }
}

impl From<HookError> for RunError {
    fn from(err: HookError) -> Self {
        match err {
            e @ (HookError::MissingCommand(_) | HookError::InvalidPattern { .. }) => {
                RunError::Config(e.to_string())
            }
            other => RunError::Hook {
                name: other.hook_name().to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// A hook descriptor resolved for one invocation.
#[derive(Clone)]
pub enum HookPlan {
    Shell {
        command: String,
        wait_for_text: Option<Regex>,
        env: EnvMap,
    },
    Spawn {
        exe: String,
        args: Vec<String>,
        wait_for_text: Option<Regex>,
        env: EnvMap,
    },
    Callback(HookCallback),
}

impl fmt::Debug for HookPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPlan::Shell {
                command,
                wait_for_text,
                ..
            } => f
                .debug_struct("Shell")
                .field("command", command)
                .field("wait_for_text", &wait_for_text.as_ref().map(Regex::as_str))
                .finish_non_exhaustive(),
            HookPlan::Spawn {
                exe,
                args,
                wait_for_text,
                ..
            } => f
                .debug_struct("Spawn")
                .field("exe", exe)
                .field("args", args)
                .field("wait_for_text", &wait_for_text.as_ref().map(Regex::as_str))
                .finish_non_exhaustive(),
            HookPlan::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl HookPlan {
    fn target(&self) -> Option<(ProcessTarget, Option<&Regex>, &EnvMap)> {
        match self {
            HookPlan::Shell {
                command,
                wait_for_text,
                env,
            } => Some((
                ProcessTarget::Shell(command.clone()),
                wait_for_text.as_ref(),
                env,
            )),
            HookPlan::Spawn {
                exe,
                args,
                wait_for_text,
                env,
            } => Some((
                ProcessTarget::Exe {
                    exe: exe.clone(),
                    args: args.clone(),
                },
                wait_for_text.as_ref(),
                env,
            )),
            HookPlan::Callback(_) => None,
        }
    }
}

/// Captured output of a process hook. Empty for callbacks and no-ops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes hooks for one app and tracks processes that outlive them.
pub struct HookRunner {
    config: Arc<Config>,
    base_env: EnvMap,
    /// Bound server port; 0 means "use the configured port".
    port: AtomicU16,
    next_id: AtomicU64,
    tracked: Mutex<Vec<TrackedProcess>>,
}

impl fmt::Debug for HookRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRunner")
            .field("port", &self.port.load(Ordering::SeqCst))
            .field("tracked", &self.tracked_count())
            .finish_non_exhaustive()
    }
}

impl HookRunner {
    /// Hook processes inherit a snapshot of the current environment.
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_base_env(config, inherited_env())
    }

    /// Use `base_env` instead of the process environment.
    pub fn with_base_env(config: Arc<Config>, base_env: EnvMap) -> Self {
        Self {
            config,
            base_env,
            port: AtomicU16::new(0),
            next_id: AtomicU64::new(1),
            tracked: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Record the port the server actually bound.
    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::SeqCst);
    }

    fn port(&self) -> u16 {
        match self.port.load(Ordering::SeqCst) {
            0 => self.config.port(),
            bound => bound,
        }
    }

    /// `{host, port, url}` overlaid with caller data.
    pub fn context(&self, data: &HookData) -> HookData {
        let host = self.config.host().to_string();
        let port = self.port();
        let mut ctx = HookData::new();
        ctx.insert("url".to_string(), url_for(&host, port));
        ctx.insert("port".to_string(), port.to_string());
        ctx.insert("host".to_string(), host);
        ctx.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        ctx
    }

    /// Resolve the hook named `name`; `Ok(None)` if it is not configured.
    pub fn plan_hook(&self, name: &str, data: &HookData) -> Result<Option<HookPlan>, HookError> {
        let Some(hook) = self.config.hook(name) else {
            return Ok(None);
        };
        let ctx = self.context(data);

        let plan = match hook {
            Hook::Callback(cb) => HookPlan::Callback(Arc::clone(cb)),
            Hook::Command(command) => HookPlan::Shell {
                command: substitute(command, &ctx),
                wait_for_text: None,
                env: self.base_env.clone(),
            },
            Hook::Table(table) => self.plan_table(name, table, &ctx)?,
        };
        Ok(Some(plan))
    }

    fn plan_table(&self, name: &str, table: &HookTable, ctx: &HookData) -> Result<HookPlan, HookError> {
        let wait_for_text = table
            .wait_for_text
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| HookError::InvalidPattern {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let mut env = self.base_env.clone();
        env.extend(table.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        match (&table.command, &table.exe) {
            (Some(command), _) => Ok(HookPlan::Shell {
                command: substitute(command, ctx),
                wait_for_text,
                env,
            }),
            (None, Some(exe)) => Ok(HookPlan::Spawn {
                exe: exe.clone(),
                args: table.args.iter().map(|a| substitute(a, ctx)).collect(),
                wait_for_text,
                env,
            }),
            (None, None) => Err(HookError::MissingCommand(name.to_string())),
        }
    }

    /// Run a hook until it is done.
    ///
    /// A missing hook is a no-op success. With `wait_for_text` the call
    /// returns once the output matched and the child stays tracked until
    /// [`kill_tracked`](Self::kill_tracked).
    pub async fn run_hook(&self, name: &str, data: &HookData) -> Result<HookOutput, HookError> {
        let Some(plan) = self.plan_hook(name, data)? else {
            debug!(hook = name, "no hook configured");
            return Ok(HookOutput::default());
        };

        info!(hook = name, ?plan, "running hook");

        if let HookPlan::Callback(cb) = &plan {
            let ctx = self.context(data);
            return cb(Arc::clone(&self.config), ctx)
                .await
                .map(|()| HookOutput::default())
                .map_err(|message| HookError::Callback {
                    name: name.to_string(),
                    message,
                });
        }

        let Some((target, wait_for_text, env)) = plan.target() else {
            return Ok(HookOutput::default());
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let spawned = process::spawn(name, id, &target, env)?;
        self.lock_tracked().push(spawned.tracked);

        let settled = process::settle(name, spawned.output, wait_for_text).await;
        match settled {
            Ok(Settled::Ready(output)) => Ok(output),
            Ok(Settled::Exited(output)) => {
                self.untrack(id);
                Ok(output)
            }
            Err(err) => {
                self.untrack(id);
                Err(err)
            }
        }
    }

    /// Terminate every still-tracked hook process.
    ///
    /// The list is drained, so each process is signalled at most once no
    /// matter how often this is called. Returns how many were signalled.
    pub async fn kill_tracked(&self) -> usize {
        let drained: Vec<TrackedProcess> = std::mem::take(&mut *self.lock_tracked());
        let mut killed = 0;
        for proc in drained {
            let (id, hook) = (proc.id, proc.hook.clone());
            if proc.terminate().await {
                killed += 1;
            } else {
                debug!(hook = %hook, id, "hook process already gone");
            }
        }
        if killed > 0 {
            info!(killed, "terminated hook processes");
        }
        killed
    }

    pub fn tracked_count(&self) -> usize {
        self.lock_tracked().len()
    }

    fn untrack(&self, id: u64) {
        self.lock_tracked().retain(|p| p.id != id);
    }

    fn lock_tracked(&self) -> MutexGuard<'_, Vec<TrackedProcess>> {
        self.tracked.lock().unwrap_or_else(|poisoned| {
            warn!("hook process list lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}
