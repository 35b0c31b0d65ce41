// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal per use case.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - No direct file access (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Typed run configuration with defaults and file loading
pub mod config;

/// The full fine-tuning workflow
pub mod finetune_use_case;

/// Reload adapters and generate
pub mod generate_use_case;

/// Raw export → training data file
pub mod compile_use_case;

/// Scaffold a base model directory
pub mod init_base_use_case;
