// ============================================================
// Layer 6 — Adapter Store
// ============================================================
// Persists the trained adapters separately from the base model
// and restores them onto a fresh copy of that base.
//
// Output directory (default `lora_model/`):
//
//   lora_model/
//     adapter_model.mpk.gz   ← adapter parameters only (A and B
//                              of every adapted projection)
//     adapter_config.json    ← AdapterManifest: rank, alpha,
//                              dropout, targets, base model id
//     tokenizer.json         ← tokenizer used for training
//     tokenizer_config.json
//
// Existing files are overwritten. Nothing is written atomically:
// a crash halfway through leaves a partial directory.
//
// Restoring attaches fresh adapters with the saved LoraConfig
// (which fixes the record's shape), then loads the saved values
// into them.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            HuggingFace PEFT save_pretrained layout

use anyhow::{Context, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::error::PersistError;
use crate::infra::model_store::WeightsRecorder;
use crate::infra::tokenizer_store::{ChatTokenizer, TokenizerStore, TOKENIZER_CONFIG_FILE, TOKENIZER_FILE};
use crate::ml::lora::LoraConfig;
use crate::ml::model::CausalLm;

pub const ADAPTER_WEIGHTS_STEM: &str = "adapter_model";
pub const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.mpk.gz";
pub const ADAPTER_CONFIG_FILE: &str  = "adapter_config.json";

/// Everything needed to put saved adapters back on a base model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterManifest {
    pub base_model_id:  String,
    pub max_seq_length: usize,
    pub num_layers:     usize,
    pub lora:           LoraConfig,
}

/// Files written by one save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifacts {
    pub dir:   PathBuf,
    pub files: Vec<PathBuf>,
}

pub struct AdapterStore {
    dir: PathBuf,
}

impl AdapterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write adapter weights, manifest and tokenizer.
    pub fn save<B: Backend>(
        &self,
        model:     &CausalLm<B>,
        manifest:  &AdapterManifest,
        tokenizer: &ChatTokenizer,
    ) -> Result<PersistedArtifacts, PersistError> {
        // ── Step 1: Directory ───────────────────────────────────────────────
        fs::create_dir_all(&self.dir)
            .map_err(|source| PersistError::Io { path: self.dir.clone(), source })?;

        // ── Step 2: Adapter parameters only ─────────────────────────────────
        let weights = model.adapter_weights();
        tracing::debug!("Saving {} adapters", weights.adapter_count());
        weights
            .save_file(self.dir.join(ADAPTER_WEIGHTS_STEM), &WeightsRecorder::new())
            .map_err(|e| PersistError::Record {
                path:   self.dir.join(ADAPTER_WEIGHTS_FILE),
                reason: e.to_string(),
            })?;

        // ── Step 3: Manifest ────────────────────────────────────────────────
        let manifest_path = self.dir.join(ADAPTER_CONFIG_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(manifest)?)
            .map_err(|source| PersistError::Io { path: manifest_path.clone(), source })?;

        // ── Step 4: Tokenizer ───────────────────────────────────────────────
        tokenizer.save(&self.dir).map_err(|e| PersistError::Tokenizer {
            path:   self.dir.clone(),
            reason: format!("{e:#}"),
        })?;

        let files = [ADAPTER_WEIGHTS_FILE, ADAPTER_CONFIG_FILE, TOKENIZER_FILE, TOKENIZER_CONFIG_FILE]
            .iter()
            .map(|name| self.dir.join(name))
            .collect();

        tracing::info!("Adapters saved to '{}'", self.dir.display());
        Ok(PersistedArtifacts { dir: self.dir.clone(), files })
    }

    pub fn load_manifest(&self) -> Result<AdapterManifest> {
        let path = self.dir.join(ADAPTER_CONFIG_FILE);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'. Has the model been fine-tuned?", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid adapter config '{}'", path.display()))
    }

    /// The tokenizer saved next to the adapters.
    pub fn load_tokenizer(&self) -> Result<ChatTokenizer> {
        TokenizerStore::new(&self.dir).load()
    }

    /// Attach the saved adapters to `base`.
    pub fn load_into<B: Backend>(&self, base: CausalLm<B>, device: &B::Device) -> Result<CausalLm<B>> {
        let manifest = self.load_manifest()?;
        anyhow::ensure!(
            manifest.num_layers == base.blocks.len(),
            "adapters in '{}' were trained for {} layers, base model has {}",
            self.dir.display(),
            manifest.num_layers,
            base.blocks.len()
        );

        let model = base.attach_adapters(&manifest.lora, device)?;
        let weights = model
            .adapter_weights()
            .load_file(self.dir.join(ADAPTER_WEIGHTS_STEM), &WeightsRecorder::new(), device)
            .with_context(|| format!("Cannot load adapter weights from '{}'", self.dir.display()))?;

        tracing::info!(
            "Restored {} adapters (rank {}) from '{}'",
            weights.adapter_count(),
            manifest.lora.rank,
            self.dir.display()
        );
        Ok(model.with_adapter_weights(weights)?)
    }
}
