// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw exported records to tensor batches.
//
//   raw/ export (entities, threads, notes, events, orgs)
//       │
//       ▼
//   RecordCompiler    → record + response pairs → TrainingExample
//       │               (Preprocessor normalises the input text)
//       ▼
//   training JSON file
//       │
//       ▼
//   JsonExampleLoader → reads the file, row- or column-wise
//       │
//       ▼
//   Formatter         → chat-template rendering → Corpus
//       │
//       ▼
//   SftDataset        → tokenized sequences (Burn Dataset)
//       │
//       ▼
//   StepSampler       → endless shuffled index stream
//       │
//       ▼
//   CausalLmBatcher   → padded input / target tensors
//
// Each module is responsible for exactly one step.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Compiles raw exported records into training examples
pub mod compiler;

/// Normalises rendered record text
pub mod preprocessor;

/// Loads the training data file
pub mod loader;

/// Renders examples with the chat template
pub mod formatter;

/// Implements Burn's Dataset trait for tokenized sequences
pub mod dataset;

/// Shuffled, wrap-around example order for step-bounded training
pub mod sampler;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
