// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Typed errors for each component seam of the pipeline.
//
//   MalformedExampleError → a training record lacks a field
//   DatasetError          → the training file cannot be used
//   ModelLoadError        → the base model cannot be loaded
//   AdapterError          → adapters cannot be attached/restored
//   TrainingError         → the fine-tuning loop must stop
//   ProbeError            → the generation probe failed
//   PersistError          → artifacts could not be written
//
// Every one of these is fatal. Nothing in the pipeline retries;
// the application layer wraps them with anyhow context and the
// process exits non-zero.
//
// Reference: Rust Book §9 (Recoverable Errors with Result)
//            thiserror crate documentation

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::example::ExampleField;

// ─── Data side ────────────────────────────────────────────────────────────────

/// A training example is missing one of its three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("training example {index} has no `{field}` field")]
pub struct MalformedExampleError {
    /// Position of the example in the input
    pub index: usize,
    /// The first absent field
    pub field: ExampleField,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot read training data '{}': {source}", path.display())]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("training data '{}' is not valid JSON: {source}", path.display())]
    Parse {
        path:   PathBuf,
        source: serde_json::Error,
    },

    #[error("training data '{}' must be an array of records or an object of columns", path.display())]
    UnexpectedShape { path: PathBuf },

    #[error("record {index} of '{}' is invalid: {source}", path.display())]
    InvalidRecord {
        path:   PathBuf,
        index:  usize,
        source: serde_json::Error,
    },

    #[error(
        "column lengths differ (instruction={instruction}, input={input}, output={output})"
    )]
    ColumnLengthMismatch {
        instruction: usize,
        input:       usize,
        output:      usize,
    },
}

// ─── Model side ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model '{model_id}' not found (searched {searched:?})")]
    NotFound {
        model_id: String,
        searched: Vec<PathBuf>,
    },

    #[error("model artifact missing: '{}'", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("invalid model config '{}': {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("cannot load model weights '{}': {reason}", path.display())]
    Weights { path: PathBuf, reason: String },

    #[error("cannot load tokenizer '{}': {reason}", path.display())]
    Tokenizer { path: PathBuf, reason: String },

    #[error("quantization mode '{mode}' is not supported by this runtime (full precision only)")]
    UnsupportedQuantization { mode: String },

    #[error("max sequence length {requested} exceeds the model's {supported} positions")]
    SequenceTooLong { requested: usize, supported: usize },

    #[error("tokenizer has {tokenizer} tokens but the model embeds {model}")]
    VocabMismatch { model: usize, tokenizer: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    #[error("adapter rank must be at least 1")]
    ZeroRank,

    #[error("adapter dropout must be in [0, 1), got {0}")]
    InvalidDropout(f64),

    #[error("no adapter target groups enabled")]
    NoTargets,

    #[error("vision adapters requested but the base model is text-only")]
    VisionUnsupported,

    #[error("adapters cover {found} decoder blocks but the model has {expected}")]
    LayerCountMismatch { expected: usize, found: usize },

    #[error("{trainable} trainable parameters after freezing, expected exactly the {adapter} adapter parameters")]
    FrozenBaseViolated { trainable: usize, adapter: usize },
}

// ─── Run side ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("training corpus is empty")]
    EmptyCorpus,

    #[error("optimizer '{0}' is not supported by this runtime")]
    UnsupportedOptimizer(String),

    #[error("loss became non-finite ({loss}) at step {step}")]
    NonFiniteLoss { step: usize, loss: f64 },

    #[error("cannot tokenize training example {index}: {reason}")]
    Tokenization { index: usize, reason: String },

    #[error("cannot record training progress: {0}")]
    Progress(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot tokenize probe prompt: {0}")]
    Tokenization(String),

    #[error("cannot read model output: {0}")]
    Logits(String),

    #[error("cannot sample next token: {0}")]
    Sampling(String),

    #[error("cannot decode generation: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cannot write '{}': {source}", path.display())]
    Io {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("cannot record adapter weights to '{}': {reason}", path.display())]
    Record { path: PathBuf, reason: String },

    #[error("cannot save tokenizer to '{}': {reason}", path.display())]
    Tokenizer { path: PathBuf, reason: String },

    #[error("cannot serialise adapter config: {0}")]
    Serialize(#[from] serde_json::Error),
}
