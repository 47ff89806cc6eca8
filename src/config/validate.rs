// src/config/validate.rs

use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{RawFlow, RawTrigger};
use crate::errors::SynthesizeError;
use crate::types::{Flow, Node, Target, Trigger};

impl TryFrom<RawFlow> for Flow {
    type Error = SynthesizeError;

    fn try_from(raw: RawFlow) -> Result<Self, Self::Error> {
        validate_raw_flow(&raw)?;

        let targets = raw
            .targets
            .into_iter()
            .map(|(id, raw_target)| {
                let target = Target {
                    id: id.clone(),
                    commands: raw_target.commands,
                    args: raw_target.args,
                    env: raw_target.env,
                };
                (id, target)
            })
            .collect();

        let nodes = raw
            .nodes
            .into_iter()
            .map(|(id, raw_node)| {
                let triggers = raw_node.triggers.into_iter().map(convert_trigger).collect();
                let node = Node {
                    id: id.clone(),
                    target_ref: raw_node.target,
                    triggers,
                    args: raw_node.args,
                    env: raw_node.env,
                };
                (id, node)
            })
            .collect();

        Ok(Flow { targets, nodes })
    }
}

fn convert_trigger(raw: RawTrigger) -> Trigger {
    match raw {
        RawTrigger::Once => Trigger::Once,
        RawTrigger::After { predecessors } => Trigger::After { predecessors },
        RawTrigger::Restart { delay_ms } => Trigger::Restart {
            delay: Duration::from_millis(delay_ms),
        },
        RawTrigger::Watch { paths, debounce_ms } => Trigger::Watch {
            paths,
            debounce: Duration::from_millis(debounce_ms),
        },
    }
}

fn validate_raw_flow(raw: &RawFlow) -> Result<(), SynthesizeError> {
    ensure_has_nodes(raw)?;
    validate_target_refs(raw)?;
    validate_nonempty_triggers(raw)?;
    validate_after_refs(raw)?;
    validate_after_dag(raw)?;
    Ok(())
}

fn ensure_has_nodes(raw: &RawFlow) -> Result<(), SynthesizeError> {
    if raw.nodes.is_empty() {
        return Err(SynthesizeError::ConfigError(
            "flow must declare at least one [node.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_target_refs(raw: &RawFlow) -> Result<(), SynthesizeError> {
    for (name, node) in raw.nodes.iter() {
        if !raw.targets.contains_key(&node.target) {
            return Err(SynthesizeError::ConfigError(format!(
                "node '{name}' references unknown target '{}'",
                node.target
            )));
        }
    }
    Ok(())
}

/// A node with no triggers would sit in `Waiting` forever (§3's "non-empty
/// list" requirement for `triggers`).
fn validate_nonempty_triggers(raw: &RawFlow) -> Result<(), SynthesizeError> {
    for (name, node) in raw.nodes.iter() {
        if node.triggers.is_empty() {
            return Err(SynthesizeError::ConfigError(format!(
                "node '{name}' must declare at least one trigger"
            )));
        }
    }
    Ok(())
}

fn validate_after_refs(raw: &RawFlow) -> Result<(), SynthesizeError> {
    for (name, node) in raw.nodes.iter() {
        for trigger in node.triggers.iter() {
            if let RawTrigger::After { predecessors } = trigger {
                for pred in predecessors {
                    if !raw.nodes.contains_key(pred) {
                        return Err(SynthesizeError::ConfigError(format!(
                            "node '{name}' has an `after` trigger referencing unknown node '{pred}'"
                        )));
                    }
                    if pred == name {
                        return Err(SynthesizeError::ConfigError(format!(
                            "node '{name}' cannot appear in its own `after` predecessors"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_after_dag(raw: &RawFlow) -> Result<(), SynthesizeError> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in raw.nodes.keys() {
        graph.add_node(name.as_str());
    }
    for (name, node) in raw.nodes.iter() {
        for trigger in node.triggers.iter() {
            if let RawTrigger::After { predecessors } = trigger {
                for pred in predecessors {
                    graph.add_edge(pred.as_str(), name.as_str(), ());
                }
            }
        }
    }
    match toposort(&graph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => Err(SynthesizeError::FlowCycle(format!(
            "cycle detected in `after` edges involving node '{}'",
            cycle.node_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Flow, SynthesizeError> {
        let raw: RawFlow = toml::from_str(toml_src).expect("valid toml");
        Flow::try_from(raw)
    }

    #[test]
    fn rejects_empty_flow() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, SynthesizeError::ConfigError(_)));
    }

    #[test]
    fn rejects_cycle() {
        let toml_src = r#"
            [target.t]
            commands = "true"

            [node.a]
            target = "t"
            [[node.a.triggers]]
            kind = "after"
            predecessors = ["b"]

            [node.b]
            target = "t"
            [[node.b.triggers]]
            kind = "after"
            predecessors = ["a"]
        "#;
        let err = parse(toml_src).unwrap_err();
        assert!(matches!(err, SynthesizeError::FlowCycle(_)));
    }

    #[test]
    fn rejects_node_with_no_triggers() {
        let toml_src = r#"
            [target.t]
            commands = "true"

            [node.a]
            target = "t"
        "#;
        let err = parse(toml_src).unwrap_err();
        assert!(matches!(err, SynthesizeError::ConfigError(_)));
    }

    #[test]
    fn accepts_linear_chain() {
        let toml_src = r#"
            [target.t]
            commands = "true"

            [node.a]
            target = "t"
            [[node.a.triggers]]
            kind = "once"

            [node.b]
            target = "t"
            [[node.b.triggers]]
            kind = "after"
            predecessors = ["a"]
        "#;
        let flow = parse(toml_src).unwrap();
        assert_eq!(flow.nodes.len(), 2);
        assert_eq!(flow.nodes["b"].after_predecessors().len(), 1);
    }
}
