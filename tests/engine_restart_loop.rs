// tests/engine_restart_loop.rs
mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use synthesize::bus::Event;
use synthesize::config::render::SimpleRenderer;
use synthesize::engine::run_engine;
use synthesize::engine::signals::ShutdownSignal;
use synthesize::exec::RealSupervisor;
use synthesize::types::Trigger;
use synthesize_test_utils::builders::FlowBuilder;

type TestResult = Result<(), Box<dyn Error>>;

/// §8 "Restart loop bounded by shutdown": a single `Restart{delay=0}` node
/// keeps re-running `sh -c 'exit 0'` on its own. This drives the engine loop
/// end to end with a real child process under a real `RealSupervisor`, and a
/// graceful shutdown delivered through the same injected signal channel
/// `lib::run` wires up from `engine::signals::spawn`.
#[tokio::test]
async fn restart_loop_cut_off_by_shutdown_is_cancelled_and_exits_nonzero() -> TestResult {
    with_timeout(async {
        init_tracing();

        let flow = FlowBuilder::new()
            .with_simple_node(
                "a",
                "sh -c 'exit 0'",
                vec![Trigger::Restart { delay: Duration::ZERO }],
            )
            .build();

        let bus = synthesize::bus::EventBus::new();
        let mut rx = bus.subscribe().await;
        let supervisor = Arc::new(RealSupervisor::new(bus.clone()));
        let renderer = Arc::new(SimpleRenderer);
        let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel(1);

        let engine = tokio::spawn(run_engine(
            flow,
            std::env::temp_dir(),
            bus.clone(),
            supervisor,
            renderer,
            shutdown_rx,
        ));

        let mut starts = 0;
        while starts < 3 {
            match rx.recv().await {
                Some(Event::NodeStarted { .. }) => starts += 1,
                Some(_) => {}
                None => break,
            }
        }

        shutdown_tx.send(ShutdownSignal::Graceful).await.unwrap();
        let exit_code = engine.await?;

        assert!(starts >= 3, "restart trigger should keep re-running its node");
        assert_eq!(
            exit_code, 1,
            "a restart loop cut off by a user interrupt is not a clean exit, even though every run succeeded"
        );

        Ok(())
    })
    .await
}

/// §4.G second-interrupt escalation: a node that ignores SIGTERM is still
/// torn down promptly by a `Force` signal, via `Supervisor::force_kill`
/// rather than waiting out the (long) SIGTERM grace period.
#[tokio::test]
async fn force_signal_kills_a_sigterm_ignoring_node_without_waiting_for_grace() -> TestResult {
    with_timeout(async {
        init_tracing();

        let flow = FlowBuilder::new()
            .with_simple_node("a", "trap '' TERM; sleep 30", vec![Trigger::Once])
            .build();

        let bus = synthesize::bus::EventBus::new();
        let mut rx = bus.subscribe().await;
        // A grace period long enough that, without the force-kill escalation,
        // this test would time out long before it elapsed.
        let supervisor = Arc::new(RealSupervisor::with_grace(bus.clone(), Duration::from_secs(120)));
        let renderer = Arc::new(SimpleRenderer);
        let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel(1);

        let engine = tokio::spawn(run_engine(
            flow,
            std::env::temp_dir(),
            bus.clone(),
            supervisor,
            renderer,
            shutdown_rx,
        ));

        loop {
            if let Some(Event::NodeStarted { .. }) = rx.recv().await {
                break;
            }
        }

        shutdown_tx.send(ShutdownSignal::Graceful).await.unwrap();
        // Give the SIGTERM a moment to be (deliberately) ignored, then force.
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(ShutdownSignal::Force).await.unwrap();

        let exit_code = engine.await?;
        assert_eq!(exit_code, 1);

        Ok(())
    })
    .await
}
