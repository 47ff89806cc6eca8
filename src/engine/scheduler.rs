// src/engine/scheduler.rs

//! The scheduler (§4.E): single owner of the `NodeState` table.
//!
//! Pure and synchronous by design (§5 -- "the `NodeState` table is mutated
//! only by the scheduler task"). It never touches the supervisor, the
//! clock, or the bus directly; instead every method returns a batch of
//! [`SchedulerOutput`] for the async engine loop in [`super`] to act on.
//! This mirrors the teacher's core/shell split: the decision logic here is
//! trivially unit-testable without tokio.

use std::collections::{BTreeMap, BTreeSet};

use crate::bus::{Event, TriggerCause};
use crate::types::{ExitInfo, Flow, Lifecycle, Node, NodeId, NodeState, Trigger};

/// A command the engine loop must carry out as a result of a scheduler
/// decision.
#[derive(Debug, Clone)]
pub enum SchedulerOutput {
    /// Render this node's command/env and spawn it under the supervisor.
    Spawn(NodeId),
    /// Ask the supervisor to stop this node (shutdown only).
    Stop(NodeId),
    /// Publish straight onto the event bus.
    Publish(Event),
}

/// Owns every node's lifecycle state and decides, from trigger fires and
/// exit reports, when nodes start, restart, or settle into a terminal
/// state.
#[derive(Debug)]
pub struct Scheduler {
    flow: Flow,
    states: BTreeMap<NodeId, NodeState>,
    /// Distinct predecessors that have succeeded since the node's `After`
    /// condition last fired (or since start).
    after_progress: BTreeMap<NodeId, BTreeSet<NodeId>>,
    any_failed: bool,
    shutdown_reason: Option<ShutdownReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    UserInterrupt,
    Quiescent,
}

impl From<ShutdownReason> for crate::bus::ShutdownReason {
    fn from(r: ShutdownReason) -> Self {
        match r {
            ShutdownReason::UserInterrupt => crate::bus::ShutdownReason::UserInterrupt,
            ShutdownReason::Quiescent => crate::bus::ShutdownReason::Quiescent,
        }
    }
}

impl Scheduler {
    pub fn new(flow: &Flow) -> Self {
        let states = flow
            .nodes
            .iter()
            .map(|(id, node)| (id.clone(), NodeState::new(node)))
            .collect();
        Self {
            flow: flow.clone(),
            states,
            after_progress: BTreeMap::new(),
            any_failed: false,
            shutdown_reason: None,
        }
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn state(&self, node: &NodeId) -> Option<&NodeState> {
        self.states.get(node)
    }

    /// Fire every `Once` trigger in the flow. Called exactly once, before
    /// the engine loop starts waiting on events.
    pub fn start(&mut self, out: &mut Vec<SchedulerOutput>) {
        let once_triggers: Vec<(NodeId, usize)> = self
            .flow
            .nodes
            .iter()
            .flat_map(|(id, node)| {
                node.triggers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| matches!(t, Trigger::Once))
                    .map(move |(i, _)| (id.clone(), i))
            })
            .collect();
        for (node, idx) in once_triggers {
            self.fire(&node, idx, TriggerCause::Startup, out);
        }
    }

    /// A `Restart` timer or `Watch` debouncer outside the scheduler decided
    /// its condition is met; this is the entry point for that.
    pub fn fire(
        &mut self,
        node_id: &NodeId,
        trigger_index: usize,
        cause: TriggerCause,
        out: &mut Vec<SchedulerOutput>,
    ) {
        if matches!(cause, TriggerCause::Startup) {
            if let Some(state) = self.states.get_mut(node_id) {
                if let Some(slot) = state.once_fired.get_mut(trigger_index) {
                    *slot = true;
                }
            }
        }

        out.push(SchedulerOutput::Publish(Event::TriggerFired {
            node: node_id.clone(),
            trigger_index,
            cause,
        }));

        let Some(state) = self.states.get_mut(node_id) else {
            return;
        };
        if state.lifecycle.is_live() {
            state.restart_pending = true;
            return;
        }
        state.lifecycle = Lifecycle::Running;
        out.push(SchedulerOutput::Spawn(node_id.clone()));
    }

    /// Record that a spawn the scheduler requested has actually started,
    /// for introspection (`NodeState.pid`/`started_at`) only -- it does not
    /// affect any scheduling decision.
    pub fn node_started(&mut self, node_id: &NodeId, pid: u32) {
        if let Some(state) = self.states.get_mut(node_id) {
            state.pid = Some(pid);
            state.started_at = Some(std::time::Instant::now());
        }
    }

    /// Process one completed run of `node_id` (§4.E exit policy).
    pub fn node_exited(&mut self, node_id: &NodeId, exit: ExitInfo, out: &mut Vec<SchedulerOutput>) {
        if !exit.succeeded() {
            self.any_failed = true;
        }

        let was_terminating = self
            .states
            .get(node_id)
            .map(|s| s.lifecycle == Lifecycle::Terminating)
            .unwrap_or(false);

        {
            let Some(state) = self.states.get_mut(node_id) else {
                return;
            };
            state.run_count += 1;
            state.last_exit = Some(exit);
            state.pid = None;
            state.started_at = None;
        }

        if was_terminating {
            // Shutdown already asked this node to stop (§4.E state diagram:
            // Running -> Terminating -> Cancelled); a trigger that raced
            // with the stop request does not get to resurrect it into
            // Waiting/Succeeded/Failed.
            if let Some(state) = self.states.get_mut(node_id) {
                state.lifecycle = Lifecycle::Cancelled;
                state.restart_pending = false;
            }
            return;
        }

        if exit.succeeded() {
            self.notify_successors(node_id, out);
        }

        let restart_pending = self
            .states
            .get_mut(node_id)
            .map(|s| std::mem::take(&mut s.restart_pending))
            .unwrap_or(false);

        if restart_pending {
            out.push(SchedulerOutput::Publish(Event::TriggerFired {
                node: node_id.clone(),
                trigger_index: 0,
                cause: TriggerCause::RestartTimer,
            }));
            if let Some(state) = self.states.get_mut(node_id) {
                state.lifecycle = Lifecycle::Running;
            }
            out.push(SchedulerOutput::Spawn(node_id.clone()));
            return;
        }

        let node = match self.flow.nodes.get(node_id) {
            Some(node) => node,
            None => return,
        };
        let can_fire_again = self.node_can_fire_again(node);

        if let Some(state) = self.states.get_mut(node_id) {
            state.lifecycle = if can_fire_again {
                Lifecycle::Waiting
            } else if exit.succeeded() {
                Lifecycle::Succeeded
            } else {
                Lifecycle::Failed
            };
        }
    }

    /// Whether any trigger on `node` could still produce a future fire.
    /// `After` predecessors that have already reached a terminal lifecycle
    /// can, by the induction this scheduler maintains, never produce
    /// another success -- terminal states are only assigned once this same
    /// check has already determined no trigger can fire again.
    fn node_can_fire_again(&self, node: &Node) -> bool {
        node.triggers.iter().enumerate().any(|(i, trigger)| match trigger {
            Trigger::Once => !self
                .states
                .get(&node.id)
                .map(|s| s.once_fired.get(i).copied().unwrap_or(false))
                .unwrap_or(false),
            Trigger::After { predecessors } => predecessors
                .iter()
                .any(|p| !self.states.get(p).map(|s| s.lifecycle.is_terminal()).unwrap_or(true)),
            Trigger::Restart { .. } | Trigger::Watch { .. } => true,
        })
    }

    /// `node_id` just completed a successful run; advance every downstream
    /// `After` condition and fire any that just became satisfied.
    fn notify_successors(&mut self, node_id: &NodeId, out: &mut Vec<SchedulerOutput>) {
        let successors: Vec<(NodeId, usize, BTreeSet<NodeId>)> = self
            .flow
            .nodes
            .values()
            .filter_map(|node| {
                let preds = node.after_predecessors();
                if preds.contains(node_id) {
                    let idx = node
                        .triggers
                        .iter()
                        .position(|t| matches!(t, Trigger::After { .. }))
                        .unwrap_or(0);
                    Some((node.id.clone(), idx, preds))
                } else {
                    None
                }
            })
            .collect();

        for (successor, trigger_index, preds) in successors {
            let progress = self.after_progress.entry(successor.clone()).or_default();
            progress.insert(node_id.clone());

            if let Some(state) = self.states.get_mut(&successor) {
                state.predecessors_remaining = preds.len().saturating_sub(progress.len());
            }

            if progress.len() >= preds.len() {
                self.after_progress.remove(&successor);
                self.fire(&successor, trigger_index, TriggerCause::PredecessorSucceeded, out);
            }
        }
    }

    /// No node is running/terminating and no trigger anywhere could still
    /// fire (§4.E "no-more-work detection").
    pub fn is_quiescent(&self) -> bool {
        let any_live = self.states.values().any(|s| s.lifecycle.is_live());
        if any_live {
            return false;
        }
        !self
            .flow
            .nodes
            .values()
            .any(|node| self.node_can_fire_again(node))
    }

    /// Request every running/terminating node stop. Returns the nodes that
    /// were actually live (i.e. that the caller must wait to hear
    /// `NodeExited` for).
    pub fn shutdown(&mut self, reason: ShutdownReason, out: &mut Vec<SchedulerOutput>) -> Vec<NodeId> {
        self.shutdown_reason = Some(reason);
        let mut stopped = Vec::new();
        for (id, state) in self.states.iter_mut() {
            if state.lifecycle.is_live() {
                state.lifecycle = Lifecycle::Terminating;
                out.push(SchedulerOutput::Stop(id.clone()));
                stopped.push(id.clone());
            }
        }
        stopped
    }

    /// Mark every still-`Terminating` node `Cancelled`. Called once the
    /// supervisor has confirmed (or been given up on waiting for) every
    /// stop request.
    pub fn finish_shutdown(&mut self) {
        for state in self.states.values_mut() {
            if state.lifecycle == Lifecycle::Terminating {
                state.lifecycle = Lifecycle::Cancelled;
            }
        }
    }

    /// Final process exit code (§4.E).
    ///
    /// A node that was actually interrupted mid-run (`Cancelled`) always
    /// forces `1`, even though it is `Restart`/`Watch`-driven and would
    /// otherwise be excluded from the success predicate -- per §8's
    /// "Restart loop bounded by shutdown" scenario, a user interrupt that
    /// cuts off live work is not a clean exit.
    pub fn exit_code(&self) -> i32 {
        if self.any_failed {
            return 1;
        }
        if self.shutdown_reason == Some(ShutdownReason::UserInterrupt)
            && self.states.values().any(|s| s.lifecycle == Lifecycle::Cancelled)
        {
            return 1;
        }
        for (id, node) in self.flow.nodes.iter() {
            let repeatable = node.triggers.iter().any(Trigger::is_repeatable);
            if repeatable && self.shutdown_reason == Some(ShutdownReason::UserInterrupt) {
                continue;
            }
            match self.states.get(id).map(|s| s.lifecycle) {
                Some(Lifecycle::Succeeded) => {}
                _ => return 1,
            }
        }
        0
    }
}
