// ============================================================
// Layer 2 — InitBaseUseCase
// ============================================================
// Scaffolds a base model directory that `finetune` can load:
//
//   Step 1: Build the byte-level chat tokenizer  (Layer 6 - infra)
//   Step 2: Size the decoder to its vocabulary   (Layer 5 - ml)
//   Step 3: Initialise weights from the seed     (Layer 5 - ml)
//   Step 4: Write config, weights, tokenizer     (Layer 6 - infra)
//
// The weights are freshly initialised, not pretrained. This is
// what lets the whole pipeline run without downloading anything;
// a pretrained base exported in the same layout loads the same way.

use anyhow::Result;
use burn::prelude::*;
use std::path::PathBuf;

use crate::domain::template::ChatTemplate;
use crate::infra::{model_store::ModelStore, tokenizer_store::build_byte_level};
use crate::ml::model::DecoderConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct InitBaseConfig {
    pub out_dir:                 PathBuf,
    pub max_position_embeddings: usize,
    pub d_model:                 usize,
    pub num_heads:               usize,
    pub num_layers:              usize,
    pub d_ff:                    usize,
    pub seed:                    u64,
}

impl Default for InitBaseConfig {
    fn default() -> Self {
        Self {
            out_dir:                 PathBuf::from("models/propfit-base"),
            max_position_embeddings: 4096,
            d_model:                 256,
            num_heads:               8,
            num_layers:              6,
            d_ff:                    1024,
            seed:                    3407,
        }
    }
}

pub struct InitBaseUseCase {
    config: InitBaseConfig,
}

impl InitBaseUseCase {
    pub fn new(config: InitBaseConfig) -> Self {
        Self { config }
    }

    pub fn execute<B: Backend>(&self, device: &B::Device) -> Result<DecoderConfig> {
        let cfg = &self.config;

        // ── Step 1: Tokenizer ─────────────────────────────────────────────────
        let tokenizer = build_byte_level(&ChatTemplate::gemma(), cfg.max_position_embeddings)?;

        // ── Step 2: Architecture ──────────────────────────────────────────────
        let model_cfg = DecoderConfig::new(
            tokenizer.vocab_size(),
            cfg.max_position_embeddings,
            cfg.d_model,
            cfg.num_heads,
            cfg.num_layers,
            cfg.d_ff,
        );
        model_cfg.validate().map_err(anyhow::Error::msg)?;

        // ── Step 3: Weights ───────────────────────────────────────────────────
        B::seed(cfg.seed);
        let model = model_cfg.init::<B>(device);
        tracing::info!(
            "Initialised base model: {} layers, d_model={}, {} parameters",
            model_cfg.num_layers,
            model_cfg.d_model,
            model.num_params()
        );

        // ── Step 4: Write ─────────────────────────────────────────────────────
        ModelStore::save(&cfg.out_dir, &model, &model_cfg, &tokenizer)?;
        Ok(model_cfg)
    }
}
