// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::event::EventKind;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::info;

/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `dir` (non-recursively) and forward paths of created or modified
/// files to `tx`.
pub fn spawn_dir_watcher(
    dir: &Path,
    tx: mpsc::UnboundedSender<PathBuf>,
) -> Result<WatcherHandle> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        // Receiver gone means the watch loop is shutting down.
                        let _ = tx.send(path);
                    }
                }
            }
            Err(err) => {
                eprintln!("flowchain: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("hotfolder watcher started on {:?}", dir);

    Ok(WatcherHandle { _inner: watcher })
}
