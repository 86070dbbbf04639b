//! Engine configuration

use crate::error::SnapshotResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Tuning knobs for change detection. None of them affect the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Build unordered compare maps in parallel once both snapshots hold
    /// more entries than this
    pub parallel_compare_threshold: usize,

    /// Evaluate independent units of work concurrently
    pub parallel_units: bool,

    /// Keep at most this many deltas per property in reported results
    pub max_reported_deltas: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_compare_threshold: 4096,
            parallel_units: true,
            max_reported_deltas: None,
        }
    }
}

impl EngineConfig {
    /// Everything on the calling thread
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            parallel_compare_threshold: usize::MAX,
            parallel_units: false,
            ..Default::default()
        }
    }

    /// Parse a JSON document; missing fields keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::ConfigParse` if the document is not valid.
    pub fn from_json_str(json: &str) -> SnapshotResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::ConfigIo` if the file cannot be read and
    /// `SnapshotError::ConfigParse` if it is not valid.
    pub fn load(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        let path = path.as_ref();
        debug!("Loading engine config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
