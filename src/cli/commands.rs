// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands and their flags:
//
//   finetune   train adapters and save them
//   generate   reload saved adapters and run one probe
//   compile    raw export → training data file
//   init-base  scaffold a base model directory
//
// clap's derive macros generate help text, error messages for
// missing args, and string → number conversion.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::{
    compile_use_case::CompileConfig,
    config::{FinetuneConfig, ProbeSettings},
    generate_use_case::GenerateRequest,
    init_base_use_case::InitBaseConfig,
};
use crate::ml::inferencer::GenerationConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune low-rank adapters on the training data
    Finetune(FinetuneArgs),

    /// Reload saved adapters and generate for one prompt
    Generate(GenerateArgs),

    /// Compile raw exported records into the training data file
    Compile(CompileArgs),

    /// Create a freshly initialised base model directory
    InitBase(InitBaseArgs),
}

/// Where the model runs.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    /// ndarray CPU backend
    Cpu,
    /// WGPU backend (GPU when available)
    Wgpu,
}

// ─── finetune ─────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct FinetuneArgs {
    /// JSON run configuration; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Training data file (JSON array of instruction/input/output)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Base model id: a directory, or a name under --models-root
    #[arg(long)]
    pub model_id: Option<String>,

    #[arg(long)]
    pub models_root: Option<PathBuf>,

    /// Where adapters and tokenizer are saved
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Where run_config.json, trainer_state.json and the metrics CSV go
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Number of optimizer steps
    #[arg(long)]
    pub max_steps: Option<usize>,

    #[arg(long)]
    pub max_seq_length: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = DeviceKind::Cpu)]
    pub device: DeviceKind,
}

/// Config file (or defaults) first, then every flag that was given.
impl TryFrom<FinetuneArgs> for FinetuneConfig {
    type Error = anyhow::Error;

    fn try_from(a: FinetuneArgs) -> Result<Self> {
        let mut cfg = match &a.config {
            Some(path) => FinetuneConfig::from_file(path)?,
            None => FinetuneConfig::default(),
        };

        if let Some(data) = a.data                 { cfg.paths.data_path = data; }
        if let Some(id) = a.model_id               { cfg.model.model_id = id; }
        if let Some(root) = a.models_root          { cfg.model.models_root = root; }
        if let Some(dir) = a.output_dir            { cfg.paths.adapter_dir = dir; }
        if let Some(dir) = a.checkpoint_dir        { cfg.training.output_dir = dir; }
        if let Some(steps) = a.max_steps           { cfg.training.max_steps = steps; }
        if let Some(len) = a.max_seq_length        { cfg.model.max_seq_length = len; }
        if let Some(seed) = a.seed {
            cfg.training.seed = seed;
            cfg.probe.generation.seed = seed;
        }
        Ok(cfg)
    }
}

// ─── generate ─────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory written by `finetune`
    #[arg(long, default_value = "lora_model")]
    pub adapter_dir: PathBuf,

    /// Base model id; defaults to the one recorded with the adapters
    #[arg(long)]
    pub model_id: Option<String>,

    #[arg(long, default_value = "models")]
    pub models_root: PathBuf,

    /// Argmax decoding instead of sampling
    #[arg(long)]
    pub greedy: bool,

    /// Record text to extract from; defaults to the smoke-test entity
    #[arg(long)]
    pub input: Option<String>,

    /// Defaults to the entity extraction instruction
    #[arg(long)]
    pub instruction: Option<String>,

    #[arg(long, default_value_t = 256)]
    pub max_new_tokens: usize,

    #[arg(long, default_value_t = 0.7)]
    pub temperature: f64,

    #[arg(long, default_value_t = 3407)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = DeviceKind::Cpu)]
    pub device: DeviceKind,
}

impl From<GenerateArgs> for GenerateRequest {
    fn from(a: GenerateArgs) -> Self {
        let probe = ProbeSettings::default();
        GenerateRequest {
            adapter_dir: a.adapter_dir,
            model_id:    a.model_id,
            models_root: a.models_root,
            instruction: a.instruction.unwrap_or(probe.instruction),
            input:       a.input.unwrap_or(probe.input),
            generation:  GenerationConfig {
                max_new_tokens: a.max_new_tokens,
                temperature:    a.temperature,
                do_sample:      !a.greedy,
                seed:           a.seed,
                ..GenerationConfig::default()
            },
        }
    }
}

// ─── compile ──────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Root of the raw export (entities/, threads/, notes/, events/, orgs/)
    #[arg(long, default_value = "raw")]
    pub raw_dir: PathBuf,

    /// Training data file to write
    #[arg(long, default_value = "processed/unsloth_training_data.json")]
    pub out: PathBuf,
}

impl From<CompileArgs> for CompileConfig {
    fn from(a: CompileArgs) -> Self {
        CompileConfig { raw_dir: a.raw_dir, out_path: a.out }
    }
}

// ─── init-base ────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct InitBaseArgs {
    /// Directory to create
    #[arg(long, default_value = "models/propfit-base")]
    pub out: PathBuf,

    /// Longest sequence the model can attend over
    #[arg(long, default_value_t = 4096)]
    pub max_positions: usize,

    /// Hidden dimension; must be divisible by --num-heads
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 6)]
    pub layers: usize,

    /// Inner dimension of the gated feed-forward
    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 3407)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = DeviceKind::Cpu)]
    pub device: DeviceKind,
}

impl From<InitBaseArgs> for InitBaseConfig {
    fn from(a: InitBaseArgs) -> Self {
        InitBaseConfig {
            out_dir:                 a.out,
            max_position_embeddings: a.max_positions,
            d_model:                 a.d_model,
            num_heads:               a.num_heads,
            num_layers:              a.layers,
            d_ff:                    a.d_ff,
            seed:                    a.seed,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn finetune_args(argv: &[&str]) -> FinetuneArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Finetune(args) => args,
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn test_finetune_flags_override_defaults() {
        let args = finetune_args(&[
            "propfit", "finetune", "--max-steps", "3", "--model-id", "tiny", "--seed", "1",
        ]);
        let cfg = FinetuneConfig::try_from(args).unwrap();
        assert_eq!(cfg.training.max_steps, 3);
        assert_eq!(cfg.model.model_id, "tiny");
        assert_eq!(cfg.training.seed, 1);
        assert_eq!(cfg.training.warmup_steps, 5);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "training": { "max_steps": 9, "warmup_steps": 0 } }"#).unwrap();

        let args = finetune_args(&[
            "propfit", "finetune", "--config", path.to_str().unwrap(), "--max-steps", "2",
        ]);
        let cfg = FinetuneConfig::try_from(args).unwrap();
        assert_eq!(cfg.training.max_steps, 2);
        assert_eq!(cfg.training.warmup_steps, 0);
    }

    #[test]
    fn test_generate_greedy_flag() {
        let cli = Cli::try_parse_from(["propfit", "generate", "--greedy", "--device", "cpu"]).unwrap();
        let Commands::Generate(args) = cli.command else { panic!("expected generate") };
        let req = GenerateRequest::from(args);
        assert!(!req.generation.do_sample);
        assert_eq!(req.adapter_dir, PathBuf::from("lora_model"));
        assert!(req.input.contains("John Smith"));
    }

    #[test]
    fn test_init_base_subcommand_name() {
        let cli = Cli::try_parse_from(["propfit", "init-base", "--layers", "2", "--d-model", "32"]).unwrap();
        let Commands::InitBase(args) = cli.command else { panic!("expected init-base") };
        let cfg = InitBaseConfig::from(args);
        assert_eq!((cfg.num_layers, cfg.d_model), (2, 32));
    }
}
