// src/watch/mod.rs

//! The filesystem watcher (§4.C).
//!
//! A thin, "dumb" layer: it knows nothing about nodes or triggers. It
//! watches the union of every `Watch` trigger's root paths recursively and
//! republishes each notify batch as one raw [`Event::WatchEvent`]. Per-node
//! debouncing and path matching live downstream, in
//! [`crate::trigger::TriggerClocks`] and the scheduler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bus::{Event, EventBus};
use crate::errors::SynthesizeError;
use crate::fs::FileSystem;

/// Keeps the underlying OS watcher, and its forwarding task, alive. Dropping
/// this handle stops all watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Start watching `roots` recursively, publishing a raw [`Event::WatchEvent`]
/// for every batch notify reports. Every root must exist at call time; §4.C
/// treats a missing root as a configuration error rather than a runtime one.
/// A root that disappears later is tolerated -- notify simply stops
/// reporting changes under it until it reappears.
pub fn spawn_watcher(
    roots: &[String],
    fs: &dyn FileSystem,
    bus: Arc<EventBus>,
) -> Result<WatcherHandle, SynthesizeError> {
    for root in roots {
        if !fs.exists(Path::new(root)) {
            return Err(SynthesizeError::ConfigError(format!(
                "watch root '{root}' does not exist"
            )));
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<NotifyEvent>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<NotifyEvent>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(err) => warn!(error = %err, "filesystem watch error"),
        },
        Config::default(),
    )
    .map_err(|err| SynthesizeError::ConfigError(format!("failed to start watcher: {err}")))?;

    for root in roots {
        watcher
            .watch(Path::new(root), RecursiveMode::Recursive)
            .map_err(|err| SynthesizeError::ConfigError(format!("failed to watch '{root}': {err}")))?;
    }

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let paths: Vec<String> = event
                .paths
                .iter()
                .map(|p: &PathBuf| p.display().to_string())
                .collect();
            if paths.is_empty() {
                continue;
            }
            debug!(?paths, "raw filesystem change");
            bus.publish(Event::WatchEvent { paths }).await;
        }
    });

    Ok(WatcherHandle { _inner: watcher })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[tokio::test]
    async fn rejects_nonexistent_root() {
        let fs = MockFileSystem::new();
        let bus = EventBus::new();
        let err = spawn_watcher(&["./does-not-exist".to_string()], &fs, bus).unwrap_err();
        assert!(matches!(err, SynthesizeError::ConfigError(_)));
    }
}
