// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated `RawConfigFile`.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for the
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let mut config: RawConfigFile = toml::from_str(&contents)?;

    // A relative `cwd` is relative to the file, not to the process.
    if let Some(cwd) = config.cwd.as_deref() {
        let cwd = Path::new(cwd);
        if cwd.is_relative() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                config.cwd = Some(parent.join(cwd).to_string_lossy().into_owned());
            }
        }
    }

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point:
///
/// - Reads TOML.
/// - Checks `parallel` / `timeout` ranges, launcher tables, and that every
///   leftover top-level key is a hook name.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields an empty config.
///
/// Running without a config file is fine as long as launchers and hooks
/// come from the command line or the API.
pub fn load_optional(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(?path, "no config file; using defaults");
        return ConfigFile::try_from(RawConfigFile::default());
    }
    load_and_validate(path)
}

/// Default config path: `testloop.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("testloop.toml")
}
