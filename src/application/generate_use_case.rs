// ============================================================
// Layer 2 — GenerateUseCase
// ============================================================
// Reloads saved adapters onto their base model and runs the
// probe once:
//
//   Step 1: Read adapter_config.json         (Layer 6 - infra)
//   Step 2: Load the base model it names     (Layer 6 - infra)
//   Step 3: Attach the saved adapters        (Layer 6 - infra)
//   Step 4: Generate and extract the answer  (Layer 5 - ml)
//
// The tokenizer saved next to the adapters is used, not the one
// in the base model directory: it is the one the adapters were
// trained with.

use anyhow::{Context, Result};
use burn::prelude::*;
use std::path::PathBuf;

use crate::domain::template::ChatTemplate;
use crate::infra::{
    adapter_store::AdapterStore,
    model_store::{ModelStore, QuantizationMode},
};
use crate::ml::inferencer::{GenerationConfig, Inferencer, ProbeResult};

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub adapter_dir: PathBuf,
    /// Overrides the base model recorded with the adapters
    pub model_id:    Option<String>,
    pub models_root: PathBuf,
    pub instruction: String,
    pub input:       String,
    pub generation:  GenerationConfig,
}

pub struct GenerateUseCase {
    request: GenerateRequest,
}

impl GenerateUseCase {
    pub fn new(request: GenerateRequest) -> Self {
        Self { request }
    }

    pub fn execute<B: Backend>(&self, device: &B::Device) -> Result<ProbeResult> {
        let req = &self.request;

        // ── Step 1: Manifest ──────────────────────────────────────────────────
        let adapters = AdapterStore::new(&req.adapter_dir);
        let manifest = adapters.load_manifest()?;
        let model_id = req.model_id.clone().unwrap_or_else(|| manifest.base_model_id.clone());

        // ── Step 2: Base model ────────────────────────────────────────────────
        let loaded = ModelStore::new(&req.models_root).load::<B>(
            &model_id,
            manifest.max_seq_length,
            QuantizationMode::FullPrecision,
            device,
        )?;

        // ── Step 3: Adapters ──────────────────────────────────────────────────
        let model = adapters.load_into(loaded.model, device)?;
        let tokenizer = adapters
            .load_tokenizer()
            .with_context(|| format!("Cannot load tokenizer from '{}'", req.adapter_dir.display()))?;

        // ── Step 4: Probe ─────────────────────────────────────────────────────
        let result = Inferencer::new(&model, &tokenizer, device).probe(
            &ChatTemplate::gemma(),
            &req.instruction,
            &req.input,
            &req.generation,
        )?;
        tracing::info!("Generated {} tokens with adapters from '{}'", result.new_tokens, req.adapter_dir.display());
        Ok(result)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::adapter_store::AdapterManifest;
    use crate::ml::lora::LoraConfig;
    use crate::test_support::{scaffold_base_model, TestBackend};

    #[test]
    fn test_reload_and_generate_greedy_twice() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        scaffold_base_model(&root.join("base"));
        let device = Default::default();

        // Fresh adapters on the base, saved like a finished run would
        let loaded = ModelStore::new(root)
            .load::<TestBackend>("base", 64, QuantizationMode::FullPrecision, &device)
            .unwrap();
        let model = loaded.model.attach_adapters(&LoraConfig::default(), &device).unwrap();
        let manifest = AdapterManifest {
            base_model_id:  "base".into(),
            max_seq_length: 64,
            num_layers:     model.blocks.len(),
            lora:           LoraConfig::default(),
        };
        AdapterStore::new(root.join("lora_model"))
            .save(&model, &manifest, &loaded.tokenizer)
            .unwrap();

        let request = GenerateRequest {
            adapter_dir: root.join("lora_model"),
            model_id:    None,
            models_root: root.to_path_buf(),
            instruction: "Extract propositions.".into(),
            input:       "Name: Jane Doe".into(),
            generation:  GenerationConfig { max_new_tokens: 5, ..GenerationConfig::default() }.greedy(),
        };
        let use_case = GenerateUseCase::new(request);
        let a = use_case.execute::<TestBackend>(&device).unwrap();
        let b = use_case.execute::<TestBackend>(&device).unwrap();
        assert_eq!(a, b);
        assert!(a.new_tokens >= 1);
    }

    #[test]
    fn test_missing_adapters_are_reported() {
        let request = GenerateRequest {
            adapter_dir: PathBuf::from("no/such/lora_model"),
            model_id:    None,
            models_root: PathBuf::from("models"),
            instruction: String::new(),
            input:       String::new(),
            generation:  GenerationConfig::default(),
        };
        assert!(GenerateUseCase::new(request).execute::<TestBackend>(&Default::default()).is_err());
    }
}
