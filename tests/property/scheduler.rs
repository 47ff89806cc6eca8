// tests/property/scheduler.rs
//
// Property-checked "eventual termination" test (§8, invariant 4): for any
// acyclic `After` graph with a simulated completion order, repeatedly
// feeding `node_exited` outcomes into the scheduler (driving downstream
// fires the way the engine loop would) must reach quiescence in a bounded
// number of steps, never loop forever, and never leave a node `Running`
// once the simulation stops producing completions for it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use proptest::prelude::*;

use synthesize::engine::{Scheduler, SchedulerOutput};
use synthesize::types::{ExitInfo, Flow, Node, Target, Trigger};

/// Build a `Flow` of `num_nodes` nodes, where node `i` may declare an
/// `After` on any node `j < i` (so the induced edge set is acyclic by
/// construction, the same trick the teacher's DAG strategy uses) plus a
/// `Once` trigger for roots that declare no predecessors.
fn flow_strategy(max_nodes: usize) -> impl Strategy<Value = Flow> {
    (1..=max_nodes).prop_flat_map(|num_nodes| {
        let deps_strat = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_nodes),
            num_nodes,
        );
        deps_strat.prop_map(move |raw_deps| {
            let mut flow = Flow::new();
            flow.targets.insert("t".to_string(), Target::new("t", "true"));
            for (i, potential_deps) in raw_deps.into_iter().enumerate() {
                let name = format!("n{i}");
                let mut preds = BTreeSet::new();
                for dep in potential_deps {
                    if i > 0 {
                        preds.insert(format!("n{}", dep % i));
                    }
                }
                let triggers = if preds.is_empty() {
                    vec![Trigger::Once]
                } else {
                    vec![Trigger::After { predecessors: preds }]
                };
                flow.nodes.insert(
                    name.clone(),
                    Node {
                        id: name,
                        target_ref: "t".to_string(),
                        triggers,
                        args: BTreeMap::new(),
                        env: BTreeMap::new(),
                    },
                );
            }
            flow
        })
    })
}

fn ok() -> ExitInfo {
    ExitInfo { code: 0, signal: None, duration: Duration::ZERO }
}

fn fail() -> ExitInfo {
    ExitInfo { code: 1, signal: None, duration: Duration::ZERO }
}

proptest! {
    #[test]
    fn scheduler_always_reaches_quiescence(
        flow in flow_strategy(12),
        failing_indices in proptest::collection::vec(0..12usize, 0..4),
    ) {
        let failing: HashSet<String> = failing_indices.iter().map(|i| format!("n{i}")).collect();

        let mut scheduler = Scheduler::new(&flow);
        let mut out = Vec::new();
        scheduler.start(&mut out);

        // Queue of nodes the fake world considers "running" right now.
        let mut running: Vec<String> = out
            .iter()
            .filter_map(|o| match o {
                SchedulerOutput::Spawn(n) => Some(n.clone()),
                _ => None,
            })
            .collect();

        let mut steps = 0;
        let max_steps = 10_000;

        while !scheduler.is_quiescent() && steps < max_steps {
            steps += 1;

            if running.is_empty() {
                // No node can be making progress; with an acyclic graph and
                // every trigger kind here being Once/After, that can only
                // happen if is_quiescent() was already true -- which the
                // loop guard already checked. Treat as a logic error.
                prop_assert!(false, "scheduler reports non-quiescent with nothing running");
                break;
            }

            let node = running.remove(0);
            let exit = if failing.contains(&node) { fail() } else { ok() };

            let mut more = Vec::new();
            scheduler.node_exited(&node, exit, &mut more);
            for o in &more {
                if let SchedulerOutput::Spawn(n) = o {
                    running.push(n.clone());
                }
            }
        }

        prop_assert!(steps < max_steps, "scheduler did not reach quiescence within {max_steps} steps");
    }
}
