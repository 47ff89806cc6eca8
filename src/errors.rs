// src/errors.rs

//! Crate-wide error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthesizeError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("cycle detected in flow: {0}")]
    FlowCycle(String),

    #[error("toml parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("failed to spawn process for node '{node}': {source}")]
    SpawnError {
        node: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render '{template}': {reason}")]
    RenderError { template: String, reason: String },

    #[error("supervisor error for node '{node}': {reason}")]
    SupervisorError { node: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SynthesizeError>;
