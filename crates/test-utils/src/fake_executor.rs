use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use synthesize::bus::{Event, EventBus};
use synthesize::exec::{SpawnRequest, Supervisor};
use synthesize::types::{ExitInfo, NodeId};

/// A fake supervisor that never touches a real process: `spawn` records the
/// request and immediately publishes `NodeStarted` then `NodeExited` with a
/// configurable exit code, exactly as the teacher's `FakeExecutor`
/// immediately reports `TaskCompleted` for every scheduled task.
pub struct FakeSupervisor {
    bus: Arc<EventBus>,
    executed: Arc<Mutex<Vec<String>>>,
    exit_code: i32,
    next_pid: Mutex<u32>,
}

impl FakeSupervisor {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_exit_code(bus, 0)
    }

    pub fn with_exit_code(bus: Arc<EventBus>, exit_code: i32) -> Self {
        Self {
            bus,
            executed: Arc::new(Mutex::new(Vec::new())),
            exit_code,
            next_pid: Mutex::new(1),
        }
    }

    /// Node ids spawned so far, in spawn order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl Supervisor for FakeSupervisor {
    fn spawn(&self, req: SpawnRequest) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(req.node.clone());

            let pid = {
                let mut guard = self.next_pid.lock().unwrap();
                let pid = *guard;
                *guard += 1;
                pid
            };

            self.bus
                .publish(Event::NodeStarted {
                    node: req.node.clone(),
                    pid,
                })
                .await;

            self.bus
                .publish(Event::NodeExited {
                    node: req.node,
                    exit: ExitInfo {
                        code: self.exit_code,
                        signal: None,
                        duration: Duration::from_millis(1),
                    },
                })
                .await;
        })
    }

    fn stop(&self, node: &NodeId) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let node = node.clone();
        Box::pin(async move {
            self.bus
                .publish(Event::NodeExited {
                    node,
                    exit: ExitInfo {
                        code: -1,
                        signal: Some(15),
                        duration: Duration::ZERO,
                    },
                })
                .await;
        })
    }

    fn force_kill(&self, node: &NodeId) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let node = node.clone();
        Box::pin(async move {
            self.bus
                .publish(Event::NodeExited {
                    node,
                    exit: ExitInfo {
                        code: -1,
                        signal: Some(9),
                        duration: Duration::ZERO,
                    },
                })
                .await;
        })
    }
}

