// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that reads or writes files on behalf of the other
// layers:
//
//   model_store.rs     — Base model directories
//                        Resolves a model id, loads config,
//                        weights and tokenizer, and writes new
//                        base model directories.
//
//   adapter_store.rs   — Adapter persistence
//                        Saves adapter weights, adapter config
//                        and tokenizer; restores adapters onto
//                        a base model.
//
//   tokenizer_store.rs — Tokenizer persistence
//                        Builds the byte-level chat tokenizer,
//                        saves and loads it together with its
//                        special-token roles.
//
//   checkpoint.rs      — Run bookkeeping
//                        run_config.json and trainer_state.json
//                        in the training output directory.
//
//   metrics.rs         — Training metrics logging
//                        One CSV row per logged optimizer step.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Base model loading and saving
pub mod model_store;

/// Adapter saving and restoring
pub mod adapter_store;

/// Run config and trainer state files
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;
