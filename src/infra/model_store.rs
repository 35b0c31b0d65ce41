// ============================================================
// Layer 6 — Base Model Store
// ============================================================
// Resolves a model id to a directory and loads the frozen base
// model from it.
//
// A base model directory:
//
//   models/propfit-base/
//     config.json            ← DecoderConfig (architecture)
//     model.mpk.gz           ← full-precision weights
//     tokenizer.json         ← HuggingFace tokenizer
//     tokenizer_config.json  ← special-token roles (optional)
//
// Resolution order for a model id:
//   1. the id itself, as a path
//   2. <models_root>/<id>
//
// Loading checks, in order: quantization mode, directory,
// config, sequence budget, weights, tokenizer, vocabulary. The
// first failure is reported as a ModelLoadError; nothing is
// retried.
//
// Weights use Burn's NamedMpkGzFileRecorder at full precision.
// The recorder appends `.mpk.gz` to the path it is given.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder},
};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::domain::error::ModelLoadError;
use crate::infra::tokenizer_store::{ChatTokenizer, TokenizerStore, TOKENIZER_FILE};
use crate::ml::model::{CausalLm, DecoderConfig};

pub const MODEL_CONFIG_FILE: &str  = "config.json";
pub const MODEL_WEIGHTS_STEM: &str = "model";
pub const MODEL_WEIGHTS_FILE: &str = "model.mpk.gz";

pub type WeightsRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationMode {
    FullPrecision,
    FourBit,
}

impl QuantizationMode {
    pub fn from_load_in_4bit(load_in_4bit: bool) -> Self {
        if load_in_4bit { Self::FourBit } else { Self::FullPrecision }
    }
}

impl fmt::Display for QuantizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantizationMode::FullPrecision => f.write_str("full"),
            QuantizationMode::FourBit       => f.write_str("4bit"),
        }
    }
}

/// A base model together with everything needed to use it.
#[derive(Debug)]
pub struct LoadedModel<B: Backend> {
    pub model:     CausalLm<B>,
    pub tokenizer: ChatTokenizer,
    pub config:    DecoderConfig,
    pub dir:       PathBuf,
}

pub struct ModelStore {
    models_root: PathBuf,
}

impl ModelStore {
    pub fn new(models_root: impl Into<PathBuf>) -> Self {
        Self { models_root: models_root.into() }
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    /// Find the directory of `model_id`.
    pub fn resolve(&self, model_id: &str) -> Result<PathBuf, ModelLoadError> {
        let searched = vec![PathBuf::from(model_id), self.models_root.join(model_id)];
        searched
            .iter()
            .find(|candidate| candidate.is_dir())
            .cloned()
            .ok_or_else(|| ModelLoadError::NotFound { model_id: model_id.to_string(), searched })
    }

    /// Load a base model for fine-tuning or inference.
    pub fn load<B: Backend>(
        &self,
        model_id:       &str,
        max_seq_length: usize,
        quantization:   QuantizationMode,
        device:         &B::Device,
    ) -> Result<LoadedModel<B>, ModelLoadError> {
        if quantization != QuantizationMode::FullPrecision {
            return Err(ModelLoadError::UnsupportedQuantization { mode: quantization.to_string() });
        }

        let dir = self.resolve(model_id)?;

        // ── Architecture ──────────────────────────────────────────────────────
        let config_path = require(dir.join(MODEL_CONFIG_FILE))?;
        let config = DecoderConfig::load(&config_path).map_err(|e| ModelLoadError::InvalidConfig {
            path:   config_path.clone(),
            reason: e.to_string(),
        })?;
        config
            .validate()
            .map_err(|reason| ModelLoadError::InvalidConfig { path: config_path.clone(), reason })?;

        if max_seq_length > config.max_position_embeddings {
            return Err(ModelLoadError::SequenceTooLong {
                requested: max_seq_length,
                supported: config.max_position_embeddings,
            });
        }

        // ── Weights ───────────────────────────────────────────────────────────
        let weights_path = require(dir.join(MODEL_WEIGHTS_FILE))?;
        let model = config
            .init::<B>(device)
            .load_file(dir.join(MODEL_WEIGHTS_STEM), &WeightsRecorder::new(), device)
            .map_err(|e| ModelLoadError::Weights { path: weights_path, reason: e.to_string() })?;

        // ── Tokenizer ─────────────────────────────────────────────────────────
        let tokenizer_path = require(dir.join(TOKENIZER_FILE))?;
        let tokenizer = TokenizerStore::new(&dir)
            .load()
            .map_err(|e| ModelLoadError::Tokenizer { path: tokenizer_path, reason: format!("{e:#}") })?
            .with_model_max_length(max_seq_length);

        if tokenizer.vocab_size() > config.vocab_size {
            return Err(ModelLoadError::VocabMismatch {
                model:     config.vocab_size,
                tokenizer: tokenizer.vocab_size(),
            });
        }

        tracing::info!(
            "Loaded base model '{}' from '{}' ({} layers, d_model {}, vocab {})",
            model_id,
            dir.display(),
            config.num_layers,
            config.d_model,
            config.vocab_size,
        );
        tracing::debug!(
            "Special tokens: bos={:?} eos={} pad={}",
            tokenizer.bos_id(),
            tokenizer.eos_id(),
            tokenizer.pad_id(),
        );

        Ok(LoadedModel { model, tokenizer, config, dir })
    }

    /// Write a complete base model directory.
    pub fn save<B: Backend>(
        dir:       &Path,
        model:     &CausalLm<B>,
        config:    &DecoderConfig,
        tokenizer: &ChatTokenizer,
    ) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create model directory '{}'", dir.display()))?;

        let config_path = dir.join(MODEL_CONFIG_FILE);
        config
            .save(&config_path)
            .with_context(|| format!("Cannot write '{}'", config_path.display()))?;

        model
            .clone()
            .save_file(dir.join(MODEL_WEIGHTS_STEM), &WeightsRecorder::new())
            .with_context(|| format!("Cannot write model weights to '{}'", dir.display()))?;

        tokenizer.save(dir)?;

        tracing::debug!("Saved base model to '{}'", dir.display());
        Ok(())
    }
}

fn require(path: PathBuf) -> Result<PathBuf, ModelLoadError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelLoadError::MissingArtifact { path })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scaffold_base_model, TestBackend};

    #[test]
    fn test_load_scaffolded_model() {
        let dir = tempfile::tempdir().unwrap();
        let saved = scaffold_base_model(&dir.path().join("base"));

        let store = ModelStore::new(dir.path());
        let loaded = store
            .load::<TestBackend>("base", 64, QuantizationMode::FullPrecision, &Default::default())
            .unwrap();

        assert_eq!(loaded.config.num_layers, saved.num_layers);
        assert_eq!(loaded.tokenizer.config().model_max_length, 64);
        assert_eq!(loaded.model.blocks.len(), saved.num_layers);
    }

    #[test]
    fn test_weights_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        scaffold_base_model(&base);

        let store = ModelStore::new("unused-root");
        let device = Default::default();
        let a = store
            .load::<TestBackend>(base.to_str().unwrap(), 64, QuantizationMode::FullPrecision, &device)
            .unwrap();
        let b = store
            .load::<TestBackend>(base.to_str().unwrap(), 64, QuantizationMode::FullPrecision, &device)
            .unwrap();
        a.model
            .lm_head
            .weight
            .val()
            .into_data()
            .assert_eq(&b.model.lm_head.weight.val().into_data(), true);
    }

    #[test]
    fn test_unknown_model_lists_searched_paths() {
        let store = ModelStore::new("no-such-root");
        let err = store.resolve("ghost").unwrap_err();
        match err {
            ModelLoadError::NotFound { model_id, searched } => {
                assert_eq!(model_id, "ghost");
                assert_eq!(searched.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_four_bit_is_rejected() {
        let store = ModelStore::new("models");
        let res = store.load::<TestBackend>("x", 16, QuantizationMode::FourBit, &Default::default());
        assert!(matches!(res, Err(ModelLoadError::UnsupportedQuantization { .. })));
    }

    #[test]
    fn test_sequence_longer_than_positions_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let saved = scaffold_base_model(&dir.path().join("base"));

        let store = ModelStore::new(dir.path());
        let res = store.load::<TestBackend>(
            "base",
            saved.max_position_embeddings + 1,
            QuantizationMode::FullPrecision,
            &Default::default(),
        );
        assert!(matches!(res, Err(ModelLoadError::SequenceTooLong { .. })));
    }

    #[test]
    fn test_missing_weights_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        scaffold_base_model(&base);
        fs::remove_file(base.join(MODEL_WEIGHTS_FILE)).unwrap();

        let store = ModelStore::new(dir.path());
        let res = store.load::<TestBackend>("base", 16, QuantizationMode::FullPrecision, &Default::default());
        assert!(matches!(res, Err(ModelLoadError::MissingArtifact { .. })));
    }
}
