use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::Deserialize;

/// Operating profile. Only changes configuration defaults, never the
/// orchestration logic itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Dev,
    Ci,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Dev
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Dev => f.write_str("dev"),
            Mode::Ci => f.write_str("ci"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" => Ok(Mode::Dev),
            "ci" => Ok(Mode::Ci),
            other => Err(format!("invalid mode: {other} (expected \"dev\" or \"ci\")")),
        }
    }
}

/// Where a trigger came from.
///
/// Only `Automatic` triggers respect the pause flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// API calls: initial start, restart, `trigger_run`.
    Explicit,
    /// File-change notifications.
    Automatic,
}

/// Boxed, sendable future used at the trait seams (runners, launchers,
/// servers, callback hooks).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Explicit environment handed to spawned processes.
pub type EnvMap = BTreeMap<String, String>;

/// Snapshot of the current process environment.
pub fn inherited_env() -> EnvMap {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("CI".parse::<Mode>(), Ok(Mode::Ci));
        assert_eq!(" dev ".parse::<Mode>(), Ok(Mode::Dev));
        assert!("prod".parse::<Mode>().is_err());
    }
}
