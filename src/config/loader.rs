// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::RawFlow;
use crate::errors::Result;
use crate::types::Flow;

/// Parse a flow file without semantic validation. Use [`load_and_validate`]
/// for the checked entry point.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawFlow> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let raw: RawFlow = toml::from_str(&contents)?;
    Ok(raw)
}

/// Parse and validate a flow file, producing the engine's `Flow` type.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Flow> {
    let raw = load_from_path(&path)?;
    let flow = Flow::try_from(raw)?;
    Ok(flow)
}

/// Default flow file name looked up in the current directory when `--config`
/// is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Synthesize.toml")
}
