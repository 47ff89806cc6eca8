// src/bus/mod.rs

//! The event bus (§4.A).
//!
//! Every component that produces observable state — the supervisor, the
//! trigger runtime, the watcher, the scheduler, the engine itself —
//! publishes [`Event`]s here. Every subscriber (the output renderer, tests,
//! future consumers) gets its own bounded `mpsc` channel; [`EventBus::publish`]
//! awaits delivery to each subscriber in turn, so a slow subscriber applies
//! backpressure to the publisher rather than ever losing an event.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::types::{ExitInfo, NodeId};

/// Per-subscriber channel depth. Generous enough that ordinary bursts (a
/// node's stdout during startup) never block the producer, while still
/// bounding memory if a subscriber genuinely stalls.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Why a `TriggerFired` was emitted (§4.D). Carried for observability only;
/// the scheduler's decision does not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCause {
    Startup,
    PredecessorSucceeded,
    RestartTimer,
    WatchDebounce,
}

/// Why the engine is shutting down (§4.G, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    UserInterrupt,
    Quiescent,
}

#[derive(Debug, Clone)]
pub enum Event {
    NodeStarted {
        node: NodeId,
        pid: u32,
    },
    /// One line (or line fragment, for unterminated long lines) of output.
    NodeOutput {
        node: NodeId,
        stream: OutputStream,
        bytes: Vec<u8>,
    },
    NodeExited {
        node: NodeId,
        exit: ExitInfo,
    },
    TriggerFired {
        node: NodeId,
        trigger_index: usize,
        cause: TriggerCause,
    },
    /// A raw, undebounced batch of changed paths from the watcher (§4.C).
    /// Per-trigger debouncing happens downstream in the trigger runtime.
    WatchEvent {
        paths: Vec<String>,
    },
    EngineShuttingDown {
        reason: ShutdownReason,
    },
    EngineStopped,
}

/// Multi-consumer, lossless fan-out bus.
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Register a new subscriber. Must be called before any event the
    /// caller wants to observe is published.
    pub async fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        self.subscribers.lock().await.push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, awaiting each send.
    /// Subscribers whose receiver half has been dropped are pruned; that is
    /// not treated as a delivery failure.
    pub async fn publish(&self, event: Event) {
        let mut subs = self.subscribers.lock().await;
        let mut i = 0;
        while i < subs.len() {
            match subs[i].send(event.clone()).await {
                Ok(()) => i += 1,
                Err(_) => {
                    subs.swap_remove(i);
                }
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
