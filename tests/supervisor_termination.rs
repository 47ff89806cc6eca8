// tests/supervisor_termination.rs
mod common;
use crate::common::{init_tracing, with_timeout};

use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use synthesize::bus::Event;
use synthesize::exec::{RealSupervisor, SpawnRequest, Supervisor};

type TestResult = Result<(), Box<dyn Error>>;

/// §4.B termination protocol: `stop` sends SIGTERM first; a process that
/// honors it (the default disposition) exits before the grace timer fires,
/// and is reported via the usual `NodeExited` with a recorded signal.
#[tokio::test]
async fn stop_terminates_a_long_running_child_with_sigterm() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bus = synthesize::bus::EventBus::new();
        let mut rx = bus.subscribe().await;
        // A grace period long enough that we can assert the child died to
        // SIGTERM, not the SIGKILL escalation.
        let supervisor = RealSupervisor::with_grace(bus.clone(), Duration::from_secs(10));

        let req = SpawnRequest {
            node: "sleeper".to_string(),
            command: "sleep 30".to_string(),
            env: HashMap::new(),
            cwd: std::env::temp_dir(),
        };
        supervisor.spawn(req).await;

        // Let it actually start before asking it to stop.
        loop {
            if let Some(Event::NodeStarted { .. }) = rx.recv().await {
                break;
            }
        }

        let stop_started = std::time::Instant::now();
        supervisor.stop(&"sleeper".to_string()).await;

        let exit = loop {
            match rx.recv().await {
                Some(Event::NodeExited { exit, .. }) => break exit,
                Some(_) => continue,
                None => panic!("bus closed before NodeExited"),
            }
        };

        assert!(
            stop_started.elapsed() < Duration::from_secs(9),
            "child should have died to SIGTERM well before the 10s grace timer"
        );
        assert_eq!(exit.signal, Some(15));
        assert!(!exit.succeeded());

        Ok(())
    })
    .await
}
