#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use synthesize::types::{Flow, Node, Target, Trigger};

/// Builder for `Target` to simplify test setup.
pub struct TargetBuilder {
    target: Target,
}

impl TargetBuilder {
    pub fn new(id: &str, commands: &str) -> Self {
        Self {
            target: Target::new(id, commands),
        }
    }

    pub fn arg(mut self, name: &str, default: &str) -> Self {
        self.target.args.insert(name.to_string(), default.to_string());
        self
    }

    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.target.env.insert(name.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Target {
        self.target
    }
}

/// Builder for `Node`.
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new(id: &str, target_ref: &str) -> Self {
        Self {
            node: Node {
                id: id.to_string(),
                target_ref: target_ref.to_string(),
                triggers: Vec::new(),
                args: BTreeMap::new(),
                env: BTreeMap::new(),
            },
        }
    }

    pub fn once(mut self) -> Self {
        self.node.triggers.push(Trigger::Once);
        self
    }

    pub fn after(mut self, predecessors: &[&str]) -> Self {
        self.node.triggers.push(Trigger::After {
            predecessors: predecessors.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        });
        self
    }

    pub fn restart(mut self, delay: Duration) -> Self {
        self.node.triggers.push(Trigger::Restart { delay });
        self
    }

    pub fn watch(mut self, paths: &[&str], debounce: Duration) -> Self {
        self.node.triggers.push(Trigger::Watch {
            paths: paths.iter().map(|s| s.to_string()).collect(),
            debounce,
        });
        self
    }

    pub fn arg(mut self, name: &str, value: &str) -> Self {
        self.node.args.insert(name.to_string(), value.to_string());
        self
    }

    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.node.env.insert(name.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}

/// Builder for `Flow`, composing targets and nodes added one at a time.
pub struct FlowBuilder {
    flow: Flow,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self { flow: Flow::new() }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.flow.targets.insert(target.id.clone(), target);
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.flow.nodes.insert(node.id.clone(), node);
        self
    }

    /// Convenience: a target named `id` whose command is `commands`, and a
    /// node with the same id bound to it via `triggers`.
    pub fn with_simple_node(self, id: &str, commands: &str, triggers: Vec<Trigger>) -> Self {
        let target = TargetBuilder::new(id, commands).build();
        let mut node = NodeBuilder::new(id, id).build();
        node.triggers = triggers;
        self.with_target(target).with_node(node)
    }

    pub fn build(self) -> Flow {
        self.flow
    }
}

impl Default for FlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
