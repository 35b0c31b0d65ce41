// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that touches model weights lives here.
//
//   model.rs      — Decoder-only causal language model
//                   • Token + learned position embeddings
//                   • Causal multi-head self-attention
//                   • Gated GELU feed-forward
//                   • RMS normalisation, residual connections
//                   • Tied-free LM head over the vocabulary
//
//   lora.rs       — Low-rank adapters beside the attention and
//                   feed-forward projections, base freezing,
//                   adapter extraction/restoration
//
//   preparer.rs   — Loads the base model and attaches adapters,
//                   checking that only adapters are trainable
//
//   schedule.rs   — Warmup + linear decay learning rate
//
//   clip.rs       — Global gradient-norm clipping
//
//   trainer.rs    — Step-bounded training loop with gradient
//                   accumulation and AdamW
//
//   inferencer.rs — Autoregressive generation and the probe
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

/// Decoder-only transformer
pub mod model;

/// Low-rank adapters
pub mod lora;

/// Base model loading and adapter attachment
pub mod preparer;

/// Learning rate schedule
pub mod schedule;

/// Global gradient-norm clipping
pub mod clip;

/// Step-bounded fine-tuning loop
pub mod trainer;

/// Text generation and the post-training probe
pub mod inferencer;
