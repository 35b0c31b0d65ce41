// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// Every knob of a fine-tuning run in one typed struct, grouped
// the way the pipeline uses them:
//
//   model     which base model, how long a sequence may be
//   adapter   rank, alpha, dropout, target layer groups
//   training  batch, accumulation, schedule, optimizer, seed
//   probe     the smoke-test prompt and how to decode it
//   paths     training data file and adapter output directory
//
// Defaults reproduce the reference run exactly. A JSON file may
// override any subset of fields; unknown keys are rejected in
// every section so a typo never silently falls back to a
// default. CLI flags are applied on top of the file.
//
// Reference: serde documentation (container attributes)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::record::RecordKind;
use crate::ml::inferencer::GenerationConfig;
use crate::ml::lora::LoraConfig;
use crate::ml::trainer::TrainingConfig;

pub const DEFAULT_MODEL_ID: &str = "propfit-base";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ModelSettings {
    pub model_id:       String,
    /// Second place a model id is looked up, after the id as a path
    pub models_root:    PathBuf,
    pub max_seq_length: usize,
    pub load_in_4bit:   bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_id:       DEFAULT_MODEL_ID.to_string(),
            models_root:    PathBuf::from("models"),
            max_seq_length: 4096,
            load_in_4bit:   false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProbeSettings {
    pub instruction: String,
    pub input:       String,
    pub generation:  GenerationConfig,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            instruction: RecordKind::Entity.instruction(),
            input: [
                "Entity Information:",
                "Name: John Smith",
                "Summary: Senior Data Scientist at AI Corp",
                "Long Summary: John has 5 years of experience in machine learning and data analysis.",
                "Research: Met at AI conference 2023",
                "Location: Boston, MA",
            ]
            .join("\n"),
            generation: GenerationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PathSettings {
    pub data_path:   PathBuf,
    pub adapter_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_path:   PathBuf::from("processed/unsloth_training_data.json"),
            adapter_dir: PathBuf::from("lora_model"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FinetuneConfig {
    pub model:    ModelSettings,
    pub adapter:  LoraConfig,
    pub training: TrainingConfig,
    pub probe:    ProbeSettings,
    pub paths:    PathSettings,
}

impl FinetuneConfig {
    /// Read a (possibly partial) config file. Missing fields take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config '{}'", path.display()))
    }

    /// Reject values no run could succeed with, before anything is loaded.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.model.model_id.trim().is_empty(), "model_id must not be empty");
        anyhow::ensure!(self.model.max_seq_length >= 2, "max_seq_length must be at least 2");
        self.adapter.validate()?;
        self.training.validate()?;
        anyhow::ensure!(
            self.probe.generation.max_new_tokens > 0,
            "probe.generation.max_new_tokens must be at least 1"
        );
        anyhow::ensure!(
            self.probe.generation.temperature.is_finite() && self.probe.generation.temperature >= 0.0,
            "probe.generation.temperature must be non-negative"
        );
        Ok(())
    }
}
