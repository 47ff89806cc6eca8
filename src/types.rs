// src/types.rs

//! The core data model: targets, triggers, nodes, flows, and the
//! engine-internal per-node runtime state.
//!
//! `Target`, `Trigger`, `Node`, and `Flow` are constructed once from
//! validated configuration and are read-only for the lifetime of the
//! engine. `NodeState` is the only mutable piece; it is created at engine
//! start and mutated exclusively by the scheduler.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Unique identifier for a node within a flow.
pub type NodeId = String;

/// A renderable shell command plus defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    /// Multi-line string executed as a single `sh -c` script.
    pub commands: String,
    /// Default bindings available to templating, name -> default string.
    pub args: BTreeMap<String, String>,
    /// Overlaid onto the process environment.
    pub env: BTreeMap<String, String>,
}

impl Target {
    pub fn new(id: impl Into<String>, commands: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            commands: commands.into(),
            args: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

/// A condition that requests a node run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fires exactly once when the engine starts.
    Once,
    /// Fires once all `predecessors` have completed a successful run.
    After { predecessors: BTreeSet<NodeId> },
    /// Fires once at start after `delay`, then again `delay` after each
    /// exit of the same node.
    Restart { delay: Duration },
    /// Fires on filesystem changes under any of `paths`.
    Watch { paths: Vec<String>, debounce: Duration },
}

impl Trigger {
    /// Whether this trigger kind can, by its own nature, fire more than
    /// once over the life of the engine (ignoring predecessor state, which
    /// `After` alone cannot answer).
    pub fn is_repeatable(&self) -> bool {
        matches!(self, Trigger::Restart { .. } | Trigger::Watch { .. })
    }
}

/// A vertex in the flow graph: binds a target to one or more triggers.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub target_ref: String,
    pub triggers: Vec<Trigger>,
    pub args: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
}

impl Node {
    /// Direct `After` predecessors declared by this node's triggers.
    pub fn after_predecessors(&self) -> BTreeSet<NodeId> {
        let mut preds = BTreeSet::new();
        for t in &self.triggers {
            if let Trigger::After { predecessors } = t {
                preds.extend(predecessors.iter().cloned());
            }
        }
        preds
    }
}

/// A set of nodes plus the transitive `After` edges they imply.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    pub targets: BTreeMap<String, Target>,
    pub nodes: BTreeMap<NodeId, Node>,
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_for(&self, node: &Node) -> Option<&Target> {
        self.targets.get(&node.target_ref)
    }

    /// Effective bindings for a node: overlay target defaults, then node
    /// overrides — most specific wins, per §3.
    pub fn effective_args(&self, node: &Node) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(target) = self.target_for(node) {
            out.extend(target.args.clone());
        }
        out.extend(node.args.clone());
        out
    }

    pub fn effective_env(&self, node: &Node) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(target) = self.target_for(node) {
            out.extend(target.env.clone());
        }
        out.extend(node.env.clone());
        out
    }

    /// Rewrite every `Restart`/`Watch` trigger in the flow to `Once`.
    ///
    /// Pre-processing transformation for `--once`, applied before the
    /// engine starts so the scheduler's logic stays uniform (§4.E).
    pub fn rewrite_once(mut self) -> Self {
        for node in self.nodes.values_mut() {
            for trigger in node.triggers.iter_mut() {
                if matches!(trigger, Trigger::Restart { .. } | Trigger::Watch { .. }) {
                    *trigger = Trigger::Once;
                }
            }
        }
        self
    }
}

/// Per-node lifecycle. A node has at most one OS process in flight at a
/// time, so `Running`/`Terminating` carry no node-level concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Waiting,
    Ready,
    Running,
    Terminating,
    Succeeded,
    Failed,
    Cancelled,
}

impl Lifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Succeeded | Lifecycle::Failed | Lifecycle::Cancelled)
    }

    pub fn is_live(self) -> bool {
        matches!(self, Lifecycle::Running | Lifecycle::Terminating)
    }
}

/// Outcome of a single completed run.
#[derive(Debug, Clone, Copy)]
pub struct ExitInfo {
    pub code: i32,
    pub signal: Option<i32>,
    pub duration: Duration,
}

impl ExitInfo {
    pub fn succeeded(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

/// Engine-internal, one per node.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub lifecycle: Lifecycle,
    pub run_count: u64,
    pub last_exit: Option<ExitInfo>,
    pub predecessors_remaining: usize,
    /// Set when a trigger fires while the node is `Running`/`Terminating`;
    /// coalesces into a single restart once the current instance exits.
    pub restart_pending: bool,
    pub pid: Option<u32>,
    pub started_at: Option<Instant>,
    /// Per-trigger bookkeeping: whether the `Once` trigger at this index
    /// has already fired (`Once` never fires twice).
    pub once_fired: Vec<bool>,
}

impl NodeState {
    pub fn new(node: &Node) -> Self {
        Self {
            lifecycle: Lifecycle::Waiting,
            run_count: 0,
            last_exit: None,
            predecessors_remaining: node.after_predecessors().len(),
            restart_pending: false,
            pid: None,
            started_at: None,
            once_fired: vec![false; node.triggers.len()],
        }
    }
}
