// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits that define what the
// pipeline works on: training records, the chat template that
// frames them, and the error taxonomy of every stage.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Training records, formatted examples and the corpus
pub mod example;

// Turn delimiters and prompt framing
pub mod template;

// Raw exported records consumed by the record compiler
pub mod record;

// Typed errors for each pipeline stage
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
