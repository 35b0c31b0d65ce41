// ============================================================
// Layer 6 — Checkpoint Directory
// ============================================================
// Bookkeeping files for one fine-tuning run, kept in the
// training output directory (default `checkpoints/`):
//
//   checkpoints/
//     run_config.json     ← the fully resolved FinetuneConfig
//     trainer_state.json  ← TrainingSummary with the loss history
//     training_log.csv    ← per-step metrics (see metrics.rs)
//
// run_config.json is written before training starts, so a run
// that dies halfway still records what it was asked to do.
//
// Reference: Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::config::FinetuneConfig;
use crate::ml::trainer::TrainingSummary;

pub const RUN_CONFIG_FILE: &str    = "run_config.json";
pub const TRAINER_STATE_FILE: &str = "trainer_state.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager and its directory (like `mkdir -p`).
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_config(&self, cfg: &FinetuneConfig) -> Result<()> {
        self.write_json(RUN_CONFIG_FILE, cfg)
    }

    pub fn save_state(&self, summary: &TrainingSummary) -> Result<()> {
        self.write_json(TRAINER_STATE_FILE, summary)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }
}

/// Read-back of the bookkeeping files, used to check what a run wrote.
#[cfg(test)]
impl CheckpointManager {
    pub fn load_config(&self) -> Result<FinetuneConfig> {
        self.read_json(RUN_CONFIG_FILE)
    }

    pub fn load_state(&self) -> Result<TrainingSummary> {
        self.read_json(TRAINER_STATE_FILE)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Invalid JSON in '{}'", path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_and_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("run")).unwrap();

        let cfg = FinetuneConfig::default();
        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap(), cfg);

        let summary = TrainingSummary {
            final_loss: 1.5,
            final_step: 2,
            last_loss:  1.0,
            losses:     vec![2.0, 1.0],
            epochs:     2.0,
        };
        ckpt.save_state(&summary).unwrap();
        assert_eq!(ckpt.load_state().unwrap(), summary);
    }
}
