// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::watch::patterns::SourcePatterns;

/// Keeps the underlying `RecommendedWatcher` alive. Dropping it stops
/// watching and ends the forwarding task.
pub struct WatcherHandle {
    root: PathBuf,
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl WatcherHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Watch `root` recursively and send the root-relative path of every
/// changed file that matches `patterns`.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    patterns: SourcePatterns,
    changes_tx: mpsc::UnboundedSender<String>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    // notify calls back on its own thread; hop into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    debug!("watch event dropped; forwarder gone");
                }
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )
    .context("creating file watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {}", root.display()))?;

    info!(root = %root.display(), ?patterns, "file watcher started");

    let task_root = root.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !is_content_change(&event.kind) {
                continue;
            }
            for path in event.paths {
                let Some(rel) = relative_str(&task_root, &path) else {
                    continue;
                };
                if !patterns.matches(&rel) {
                    debug!(path = %rel, "change ignored by patterns");
                    continue;
                }
                if changes_tx.send(rel).is_err() {
                    debug!("change receiver closed; watcher loop ending");
                    return;
                }
            }
        }
    });

    Ok(WatcherHandle {
        root,
        _inner: watcher,
    })
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// `path` relative to `root` with forward slashes, retrying with both sides
/// canonicalized (macOS reports `/private/var/...` for `/var/...`).
fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let to_string = |rel: &Path| rel.to_string_lossy().replace('\\', "/");

    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_string(rel));
    }
    let root = root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    path.strip_prefix(&root).ok().map(to_string)
}
