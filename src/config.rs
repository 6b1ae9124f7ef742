//! Configuration for the synchronization engine.
//!
//! Holds exactly the options named by the external interface contract:
//! tick rate, prediction/rollback budget, input delay, partition
//! redundancy, snapshot cadence, and the hash/ack retention windows.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable parameters for a `SyncEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Target ticks per second.
    pub tick_rate: u32,
    /// Maximum frames the local simulation may run ahead of the last
    /// confirmed frame before `PredictionManager::advance` refuses to
    /// advance further.
    pub max_prediction_frames: u32,
    /// Frames of delay applied to locally queued input before it becomes
    /// eligible for confirmation.
    pub input_delay_frames: u32,
    /// Redundant senders assigned per entity partition.
    pub senders_per_partition: usize,
    /// Frames between mandatory snapshots saved into the ring.
    pub snapshot_interval: u32,
    /// Frames of state-hash history retained by `StateHashArbiter`.
    pub hash_window: u32,
    /// Frames to wait for hash majority before declaring `no_majority_hash`.
    pub ack_window: u32,
    /// Frames to wait for a resync snapshot before retrying the request
    /// (up to `MAX_RESYNC_ATTEMPTS`) or surfacing `Error::ResyncTimeout`.
    pub resync_timeout_frames: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            max_prediction_frames: 10,
            input_delay_frames: 2,
            senders_per_partition: 2,
            snapshot_interval: 1,
            hash_window: 32,
            ack_window: 3,
            // ~5 seconds at the default 20 tick_rate.
            resync_timeout_frames: 100,
        }
    }
}

impl SyncConfig {
    /// Parse configuration overrides from a TOML document. Fields absent
    /// from `s` keep their `Default` value.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("invalid config toml: {e}")))
    }

    /// Load configuration overrides from a TOML file on disk.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Validate internal consistency of the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate == 0 {
            return Err(Error::Config("tick_rate must be > 0".into()));
        }
        if self.max_prediction_frames == 0 {
            return Err(Error::Config("max_prediction_frames must be > 0".into()));
        }
        if self.senders_per_partition == 0 {
            return Err(Error::Config("senders_per_partition must be > 0".into()));
        }
        if self.snapshot_interval == 0 {
            return Err(Error::Config("snapshot_interval must be > 0".into()));
        }
        if self.ack_window == 0 {
            return Err(Error::Config("ack_window must be > 0".into()));
        }
        if self.resync_timeout_frames == 0 {
            return Err(Error::Config("resync_timeout_frames must be > 0".into()));
        }
        Ok(())
    }
}
