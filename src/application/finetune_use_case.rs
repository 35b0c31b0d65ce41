// ============================================================
// Layer 2 — FinetuneUseCase
// ============================================================
// Orchestrates one fine-tuning run from training file to saved
// adapters:
//
//   Step 1: Validate config, seed the backend  (Layer 2)
//   Step 2: Load training examples            (Layer 4 - data)
//   Step 3: Format the corpus                 (Layer 4 - data)
//   Step 4: Load the base model + tokenizer   (Layer 5/6)
//   Step 5: Attach adapters, freeze the base  (Layer 5 - ml)
//   Step 6: Save the resolved run config      (Layer 6 - infra)
//   Step 7: Run the training loop             (Layer 5 - ml)
//   Step 8: Probe the trained model           (Layer 5 - ml)
//   Step 9: Persist adapters + tokenizer      (Layer 6 - infra)
//
// Every step is fatal on failure. The probe runs before the
// adapters are written, and a failed probe means nothing is
// persisted and the run does not report success.
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};

use crate::application::config::FinetuneConfig;
use crate::data::{formatter::Formatter, loader::JsonExampleLoader};
use crate::domain::traits::ExampleSource;
use crate::infra::{
    adapter_store::{AdapterManifest, AdapterStore, PersistedArtifacts},
    checkpoint::CheckpointManager,
    model_store::{ModelStore, QuantizationMode},
};
use crate::ml::{
    inferencer::{Inferencer, ProbeResult},
    lora::ParameterCount,
    preparer::ModelPreparer,
    trainer::{run_finetuning, TrainingSummary},
};

/// What a finished run hands back to the CLI.
#[derive(Debug, Clone)]
pub struct FinetuneReport {
    pub examples:   usize,
    pub parameters: ParameterCount,
    pub summary:    TrainingSummary,
    pub probe:      ProbeResult,
    pub artifacts:  PersistedArtifacts,
}

pub struct FinetuneUseCase {
    config: FinetuneConfig,
}

impl FinetuneUseCase {
    pub fn new(config: FinetuneConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FinetuneConfig {
        &self.config
    }

    /// Train from the configured training file.
    pub fn execute<B: AutodiffBackend>(&self, device: &B::Device) -> Result<FinetuneReport> {
        let source = JsonExampleLoader::new(&self.config.paths.data_path);
        self.execute_from::<B>(&source, device)
    }

    /// Train from any example source.
    pub fn execute_from<B: AutodiffBackend>(
        &self,
        source: &dyn ExampleSource,
        device: &B::Device,
    ) -> Result<FinetuneReport> {
        let cfg = &self.config;

        // ── Step 1: Validate and seed ─────────────────────────────────────────
        cfg.validate()?;
        B::seed(cfg.training.seed);

        // ── Step 2: Load training examples ────────────────────────────────────
        let examples = source
            .load_all()
            .with_context(|| format!("Cannot load training data from {}", source.describe()))?;

        // ── Step 3: Format the corpus ─────────────────────────────────────────
        let formatter = Formatter::default();
        let corpus = formatter.build_corpus(&examples)?;
        tracing::info!("Formatted {} training examples", corpus.len());

        // ── Step 4: Load the base model ───────────────────────────────────────
        let preparer = ModelPreparer::new(ModelStore::new(&cfg.model.models_root));
        let loaded = preparer.load::<B>(
            &cfg.model.model_id,
            cfg.model.max_seq_length,
            QuantizationMode::from_load_in_4bit(cfg.model.load_in_4bit),
            device,
        )?;
        let tokenizer = loaded.tokenizer;

        // ── Step 5: Attach adapters ───────────────────────────────────────────
        let (model, parameters) = preparer.attach_adapters(loaded.model, &cfg.adapter, device)?;

        // ── Step 6: Record what this run was asked to do ──────────────────────
        CheckpointManager::new(&cfg.training.output_dir)?.save_config(cfg)?;

        // ── Step 7: Train ─────────────────────────────────────────────────────
        let (model, summary) = run_finetuning(
            model,
            &tokenizer,
            &corpus,
            &cfg.training,
            cfg.model.max_seq_length,
            device,
        )?;

        // ── Step 8: Probe ─────────────────────────────────────────────────────
        // Inference runs on the inner backend: no autodiff graph is built
        let model = model.valid();
        let probe = Inferencer::new(&model, &tokenizer, device)
            .probe(
                formatter.template(),
                &cfg.probe.instruction,
                &cfg.probe.input,
                &cfg.probe.generation,
            )
            .context("Smoke-test generation failed")?;

        // ── Step 9: Persist ───────────────────────────────────────────────────
        let manifest = AdapterManifest {
            base_model_id:  cfg.model.model_id.clone(),
            max_seq_length: cfg.model.max_seq_length,
            num_layers:     model.blocks.len(),
            lora:           cfg.adapter.clone(),
        };
        let artifacts = AdapterStore::new(&cfg.paths.adapter_dir)
            .save(&model, &manifest, &tokenizer)
            .context("Cannot save fine-tuned adapters")?;

        Ok(FinetuneReport {
            examples: corpus.len(),
            parameters,
            summary,
            probe,
            artifacts,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::compiler::write_training_file;
    use crate::domain::error::MalformedExampleError;
    use crate::domain::example::TrainingExample;
    use crate::infra::checkpoint::RUN_CONFIG_FILE;
    use crate::test_support::{scaffold_base_model, TestAutodiffBackend};
    use std::{fs, path::Path};

    fn config_in(root: &Path) -> FinetuneConfig {
        let mut cfg = FinetuneConfig::default();
        cfg.model.model_id          = "base".into();
        cfg.model.models_root       = root.to_path_buf();
        cfg.model.max_seq_length    = 96;
        cfg.training.max_steps      = 1;
        cfg.training.output_dir     = root.join("checkpoints");
        cfg.probe.generation.max_new_tokens = 8;
        cfg.paths.data_path         = root.join("processed").join("data.json");
        cfg.paths.adapter_dir       = root.join("lora_model");
        cfg
    }

    #[test]
    fn test_one_example_one_step_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        scaffold_base_model(&root.join("base"));

        let cfg = config_in(root);
        let example = TrainingExample::new("Extract propositions.", "Name: Jane Doe", "Jane Doe exists.");
        write_training_file(&cfg.paths.data_path, &[example]).unwrap();

        let report = FinetuneUseCase::new(cfg.clone())
            .execute::<TestAutodiffBackend>(&Default::default())
            .unwrap();

        assert_eq!(report.examples, 1);
        assert_eq!(report.summary.final_step, 1);
        assert!(report.summary.final_loss.is_finite());
        assert!(!report.probe.raw.is_empty());
        assert!(report.parameters.trainable > 0);

        assert!(!report.artifacts.files.is_empty());
        for file in &report.artifacts.files {
            assert!(fs::metadata(file).unwrap().len() > 0, "{} is empty", file.display());
        }
        assert!(cfg.training.output_dir.join(RUN_CONFIG_FILE).is_file());
    }

    #[test]
    fn test_malformed_example_stops_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        scaffold_base_model(&root.join("base"));

        let cfg = config_in(root);
        let broken = TrainingExample { output: None, ..TrainingExample::new("i", "x", "o") };
        write_training_file(&cfg.paths.data_path, &[broken]).unwrap();

        let err = FinetuneUseCase::new(cfg.clone())
            .execute::<TestAutodiffBackend>(&Default::default())
            .unwrap_err();
        assert!(err.downcast_ref::<MalformedExampleError>().is_some());
        assert!(!cfg.paths.adapter_dir.exists());
    }

    #[test]
    fn test_missing_base_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());
        write_training_file(&cfg.paths.data_path, &[TrainingExample::new("i", "x", "o")]).unwrap();

        let res = FinetuneUseCase::new(cfg).execute::<TestAutodiffBackend>(&Default::default());
        assert!(res.is_err());
    }
}
