// tests/engine_failure_blocks_downstream.rs
mod common;
use crate::common::{init_tracing, with_timeout};

use std::collections::BTreeSet;
use std::error::Error;
use std::sync::Arc;

use synthesize::bus::Event;
use synthesize::config::render::SimpleRenderer;
use synthesize::engine::run_engine;
use synthesize::types::Trigger;
use synthesize_test_utils::builders::FlowBuilder;
use synthesize_test_utils::fake_executor::FakeSupervisor;

type TestResult = Result<(), Box<dyn Error>>;

/// §8 "Failure blocks downstream": `a` exits non-zero, so `b` and `c`
/// (which are downstream via `After`) never start; the engine exits 1 and
/// exactly one `NodeStarted` is ever published.
#[tokio::test]
async fn failed_predecessor_blocks_downstream_and_exits_one() -> TestResult {
    with_timeout(async {
        init_tracing();

        let flow = FlowBuilder::new()
            .with_simple_node("a", "exit 2", vec![Trigger::Once])
            .with_simple_node(
                "b",
                "echo ok",
                vec![Trigger::After {
                    predecessors: BTreeSet::from(["a".to_string()]),
                }],
            )
            .with_simple_node(
                "c",
                "echo ok",
                vec![Trigger::After {
                    predecessors: BTreeSet::from(["b".to_string()]),
                }],
            )
            .build();

        let bus = synthesize::bus::EventBus::new();
        let mut rx = bus.subscribe().await;
        let supervisor = Arc::new(FakeSupervisor::with_exit_code(bus.clone(), 2));
        let renderer = Arc::new(SimpleRenderer);

        let (_shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel(1);
        let engine = tokio::spawn(run_engine(
            flow,
            std::env::temp_dir(),
            bus.clone(),
            supervisor,
            renderer,
            shutdown_rx,
        ));

        let mut started = Vec::new();
        loop {
            match rx.recv().await {
                Some(Event::NodeStarted { node, .. }) => started.push(node),
                Some(Event::EngineStopped) => break,
                Some(_) => {}
                None => break,
            }
        }

        let exit_code = engine.await?;
        assert_eq!(exit_code, 1);
        assert_eq!(started, vec!["a".to_string()]);

        Ok(())
    })
    .await
}
