// tests/supervisor_long_line.rs
mod common;
use crate::common::{init_tracing, with_timeout};

use std::collections::HashMap;
use std::error::Error;

use synthesize::bus::{Event, OutputStream};
use synthesize::exec::{RealSupervisor, SpawnRequest, Supervisor};

type TestResult = Result<(), Box<dyn Error>>;

/// §8 "Long line": a child emits 200 KiB with no newline, then exits. The
/// supervisor must split that into several `NodeOutput` events rather than
/// buffering it unbounded (§4.B's long-line policy), and the concatenation
/// of those events must equal the full payload.
#[tokio::test]
async fn long_unterminated_line_is_split_into_bounded_chunks() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bus = synthesize::bus::EventBus::new();
        let mut rx = bus.subscribe().await;
        let supervisor = RealSupervisor::new(bus.clone());

        let req = SpawnRequest {
            node: "long".to_string(),
            command: "head -c 200000 /dev/zero | tr '\\0' 'a'".to_string(),
            env: HashMap::new(),
            cwd: std::env::temp_dir(),
        };
        supervisor.spawn(req).await;

        let mut collected: Vec<u8> = Vec::new();
        let mut output_events = 0usize;
        let mut exit_code = None;
        loop {
            match rx.recv().await {
                Some(Event::NodeOutput { stream, bytes, .. }) => {
                    assert_eq!(stream, OutputStream::Stdout);
                    output_events += 1;
                    collected.extend_from_slice(&bytes);
                }
                Some(Event::NodeExited { exit, .. }) => {
                    exit_code = Some(exit.code);
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }

        assert_eq!(exit_code, Some(0));
        assert!(output_events >= 3, "expected several chunked output events, got {output_events}");
        assert_eq!(collected.len(), 200_000);
        assert!(collected.iter().all(|&b| b == b'a'));

        Ok(())
    })
    .await
}
