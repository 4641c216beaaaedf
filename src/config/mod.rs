// src/config/mod.rs

//! Configuration loading, validation and settling.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate ranges and key names (`validate.rs`).
//! - Layer overrides, file values, default options and mode defaults into
//!   the immutable [`Config`] the rest of the crate reads (`settings.rs`).

pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_optional};
pub use model::{ConfigFile, HookTable, LauncherConfig, RawConfigFile, RawHook};
pub use settings::{Config, ConfigBuilder, ConfigOverrides, Hook, DEFAULT_HOST, DEFAULT_PORT};
