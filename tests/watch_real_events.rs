// tests/watch_real_events.rs
mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::time::Duration;

use synthesize::bus::Event;
use synthesize::fs::RealFileSystem;
use synthesize::watch::spawn_watcher;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

/// §4.C: a real write under a watched root produces a `WatchEvent` on the
/// bus carrying that path. Per-trigger debouncing is downstream
/// ([`synthesize::trigger::TriggerClocks`]) and covered by its own unit
/// tests; this just proves the notify -> bus wiring works end to end.
#[tokio::test]
async fn writing_a_file_under_a_watched_root_reaches_the_bus() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let root = dir.path().to_string_lossy().to_string();

        let bus = synthesize::bus::EventBus::new();
        let mut rx = bus.subscribe().await;
        let fs = RealFileSystem;
        let _watcher = spawn_watcher(&[root.clone()], &fs, bus.clone())?;

        // Give the watcher a moment to register with the OS before writing.
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("touched.txt"), b"hello")?;

        let event = tokio::time::timeout(Duration::from_secs(4), async {
            loop {
                if let Some(Event::WatchEvent { paths }) = rx.recv().await {
                    return paths;
                }
            }
        })
        .await?;

        assert!(event.iter().any(|p| p.contains("touched.txt")));

        Ok(())
    })
    .await
}
