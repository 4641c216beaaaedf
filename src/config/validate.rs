// src/config/validate.rs

use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::model::{ConfigFile, LauncherConfig, RawConfigFile};
use crate::errors::{Result, TestloopError};

/// Prefixes a leftover top-level key must carry to be accepted as a hook.
pub const HOOK_PREFIXES: &[&str] = &["on_", "before_", "after_"];

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TestloopError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    if let Some(parallel) = cfg.parallel {
        validate_parallel(parallel)?;
    }
    if let Some(timeout) = cfg.timeout {
        validate_timeout(timeout)?;
    }
    validate_hook_names(cfg)?;
    for (name, launcher) in cfg.launchers.iter() {
        validate_launcher(name, launcher)?;
    }
    Ok(())
}

/// `parallel` is either `-1` (unbounded) or a positive cap no larger than
/// the number of permits a semaphore can hold.
pub fn validate_parallel(parallel: i64) -> Result<()> {
    if parallel == -1 {
        return Ok(());
    }
    let fits = usize::try_from(parallel).is_ok_and(|n| (1..=Semaphore::MAX_PERMITS).contains(&n));
    if fits {
        return Ok(());
    }
    Err(TestloopError::ConfigError(format!(
        "parallel must be -1 (unbounded) or between 1 and {} (got {parallel})",
        Semaphore::MAX_PERMITS
    )))
}

/// Seconds, non-negative and small enough to become a `Duration`.
pub fn validate_timeout(timeout: f64) -> Result<()> {
    if Duration::try_from_secs_f64(timeout).is_ok() {
        return Ok(());
    }
    Err(TestloopError::ConfigError(format!(
        "timeout must be a non-negative number of seconds (got {timeout})"
    )))
}

/// True for names that may carry a hook descriptor.
pub fn is_hook_name(name: &str) -> bool {
    HOOK_PREFIXES
        .iter()
        .any(|prefix| name.len() > prefix.len() && name.starts_with(prefix))
}

fn validate_hook_names(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.hooks.keys() {
        if !is_hook_name(name) {
            return Err(TestloopError::ConfigError(format!(
                "unknown config key '{name}'"
            )));
        }
    }
    Ok(())
}

fn validate_launcher(name: &str, launcher: &LauncherConfig) -> Result<()> {
    match (&launcher.command, &launcher.exe) {
        (Some(_), Some(_)) => Err(TestloopError::ConfigError(format!(
            "launcher '{name}' sets both `command` and `exe`"
        ))),
        (None, None) => Err(TestloopError::ConfigError(format!(
            "launcher '{name}' needs `command` or `exe`"
        ))),
        (None, Some(_)) | (Some(_), None) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_range() {
        assert!(validate_parallel(-1).is_ok());
        assert!(validate_parallel(4).is_ok());
        assert!(validate_parallel(0).is_err());
        assert!(validate_parallel(-2).is_err());
        assert!(validate_parallel(i64::MAX).is_err());
    }

    #[test]
    fn timeout_must_fit_a_duration() {
        assert!(validate_timeout(0.0).is_ok());
        assert!(validate_timeout(2.5).is_ok());
        assert!(validate_timeout(-1.0).is_err());
        assert!(validate_timeout(f64::NAN).is_err());
        assert!(validate_timeout(f64::INFINITY).is_err());
        assert!(validate_timeout(1e20).is_err());
    }

    #[test]
    fn hook_names_need_a_suffix() {
        assert!(is_hook_name("on_start"));
        assert!(is_hook_name("before_tests"));
        assert!(!is_hook_name("on_"));
        assert!(!is_hook_name("reporter_x"));
    }
}
