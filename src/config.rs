//! Run-level I/O configuration.

use crate::heat_error::HeatIoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where fields are loaded from and written to, and how often.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Shared checkpoint file; a run resumes from it when it exists.
    pub checkpoint_path: PathBuf,
    /// Text initial condition used when no checkpoint is present.
    pub initial_condition: Option<PathBuf>,
    /// Snapshot images are named `<prefix>_<iteration:04>.png`.
    pub snapshot_prefix: String,
    pub snapshot_dir: PathBuf,
    /// Checkpoint every N iterations; 0 disables.
    pub checkpoint_interval: u32,
    /// Snapshot every N iterations; 0 disables.
    pub snapshot_interval: u32,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from("HEAT_RESTART.dat"),
            initial_condition: None,
            snapshot_prefix: "heat".into(),
            snapshot_dir: PathBuf::from("."),
            checkpoint_interval: 200,
            snapshot_interval: 1500,
        }
    }
}

impl IoConfig {
    pub fn from_json_str(text: &str) -> Result<Self, HeatIoError> {
        serde_json::from_str(text).map_err(|e| HeatIoError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, HeatIoError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| HeatIoError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn should_checkpoint(&self, iteration: u32) -> bool {
        self.checkpoint_interval != 0 && iteration % self.checkpoint_interval == 0
    }

    pub fn should_snapshot(&self, iteration: u32) -> bool {
        self.snapshot_interval != 0 && iteration % self.snapshot_interval == 0
    }

    /// Full path of the snapshot image for `iteration`.
    pub fn snapshot_path(&self, iteration: u32) -> PathBuf {
        self.snapshot_dir
            .join(crate::io::snapshot::snapshot_name(&self.snapshot_prefix, iteration))
    }
}
