// src/config/model.rs

//! On-disk TOML representation of a flow.
//!
//! This is a concrete stand-in for the YAML-plus-Jinja configuration format
//! described in §1/§6, which is explicitly an external collaborator the
//! engine itself does not implement. `RawFlow` exists so the crate has
//! something real to parse end to end; [`crate::config::validate`] turns it
//! into the engine's actual input type, [`crate::types::Flow`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

fn default_restart_delay_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    150
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawFlowSection {
    /// Reserved for flow-wide defaults; currently nodes only inherit from
    /// their target.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTarget {
    pub commands: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawTrigger {
    Once,
    After {
        predecessors: BTreeSet<String>,
    },
    Restart {
        #[serde(default = "default_restart_delay_ms")]
        delay_ms: u64,
    },
    Watch {
        paths: Vec<String>,
        #[serde(default = "default_debounce_ms")]
        debounce_ms: u64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    pub target: String,
    #[serde(default)]
    pub triggers: Vec<RawTrigger>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFlow {
    #[serde(default)]
    pub flow: RawFlowSection,
    #[serde(rename = "target", default)]
    pub targets: BTreeMap<String, RawTarget>,
    #[serde(rename = "node", default)]
    pub nodes: BTreeMap<String, RawNode>,
}
