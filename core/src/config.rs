//! config.rs
//! Engine configuration shared by encoder and decoder sessions.
//!
//! Design notes:
//! - Plain data only; collaborators (resolver, hooks, filter) live in
//!   `collab::Collaborators` so the config stays serde-loadable.
//! - `validate()` is called by both engine constructors.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_DEPTH, DEFAULT_VERSION, MAX_BLOCK_SIZE, MAX_VERSION, MIN_VERSION};
use crate::types::{Result, WireError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Version written by the encoder; highest version accepted by the decoder.
    pub version: u8,
    /// Hook-scope buffer flush threshold in bytes.
    pub block_size: usize,
    /// Recursion limit for one top-level call.
    pub max_depth: usize,
    /// Decoder: discard objects of unresolvable types (yielding `Null`)
    /// instead of failing the session.
    pub skip_unresolvable: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            block_size: DEFAULT_BLOCK_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            skip_unresolvable: false,
        }
    }
}

impl EngineConfig {
    /// Config pinned to a specific protocol version.
    pub fn with_version(version: u8) -> Self {
        Self { version, ..Default::default() }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: EngineConfig = serde_json::from_str(json)
            .map_err(|e| WireError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_VERSION..=MAX_VERSION).contains(&self.version) {
            return Err(WireError::InvalidConfig(format!(
                "version {} outside {}..={}",
                self.version, MIN_VERSION, MAX_VERSION
            )));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(WireError::InvalidConfig(format!(
                "block_size {} outside 1..={}",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }
        if self.max_depth == 0 {
            return Err(WireError::InvalidConfig("max_depth must be non-zero".into()));
        }
        Ok(())
    }
}
