// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The pipeline only sees these traits at its input seam, so a
// different storage format for training records can be added
// without touching the formatter or the training loop:
//   - JsonExampleLoader implements ExampleSource
//   - RecordCompiler also implements ExampleSource, producing
//     examples straight from raw exported records
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::example::TrainingExample;

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can produce training examples.
pub trait ExampleSource {
    /// Load every example, in source order.
    fn load_all(&self) -> Result<Vec<TrainingExample>>;

    /// Short human-readable name of where the examples come from
    fn describe(&self) -> String;
}
