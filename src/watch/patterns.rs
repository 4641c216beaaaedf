// src/watch/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::Config;

/// Compiled `src_files` / `src_files_ignore` globs.
///
/// Patterns are relative to the project root; the watcher passes paths like
/// `"src/app.js"` into [`matches`](Self::matches).
#[derive(Clone)]
pub struct SourcePatterns {
    include: GlobSet,
    ignore: Option<GlobSet>,
}

impl fmt::Debug for SourcePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePatterns")
            .field("include", &self.include.len())
            .field("ignore", &self.ignore.as_ref().map(GlobSet::len))
            .finish()
    }
}

impl SourcePatterns {
    pub fn new(include: &[String], ignore: &[String]) -> Result<Self> {
        let include = build_globset(include).context("building src_files globset")?;
        let ignore = if ignore.is_empty() {
            None
        } else {
            Some(build_globset(ignore).context("building src_files_ignore globset")?)
        };
        Ok(Self { include, ignore })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.src_files(), config.src_files_ignore())
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include.is_match(rel_path) {
            return false;
        }
        match &self.ignore {
            Some(ignore) => !ignore.is_match(rel_path),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
