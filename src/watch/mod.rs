// src/watch/mod.rs

//! Source file watching.
//!
//! Turns filesystem notifications under the project root into relative path
//! strings for the orchestrator. It knows nothing about runs; the app decides
//! what a change means (see `App::file_changed`).

pub mod patterns;
pub mod watcher;

pub use patterns::SourcePatterns;
pub use watcher::{spawn_watcher, WatcherHandle};
