// ============================================================
// Layer 5 — Low-Rank Adapters
// ============================================================
// A frozen projection W (d_in × d_out) is augmented with two
// small trainable matrices:
//
//   y = x·W + (alpha / r) · dropout(x)·A·B
//
//   A : d_in × r   Kaiming-uniform
//   B : r × d_out  zeros
//
// Because B starts at zero the adapted model computes exactly
// what the base model computes until the first optimizer step.
//
// Adapters are attached to the attention projections (q, k, v,
// o) and the gated MLP projections (gate, up, down) of every
// decoder block. Everything else (embeddings, norms, LM head and
// the base projection weights) is frozen with Module::no_grad,
// so only adapter parameters receive gradients.
//
// Adapter weights can be pulled out of a model (AdapterWeights)
// and put back into another copy of the same base model, which
// is how they are saved and restored independently of the base.
//
// Reference: Hu et al. (2021) LoRA: Low-Rank Adaptation of LLMs
//            Burn Book §3 (Modules, Param, Initializer)

use burn::{
    module::Param,
    nn::{Dropout, DropoutConfig, Initializer, Linear},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::AdapterError;
use crate::ml::model::{CausalLm, DecoderBlock};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Which groups of layers receive adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterTargets {
    /// q, k, v, o projections
    pub attention: bool,
    /// gate, up, down projections
    pub mlp: bool,
    /// vision tower layers (multimodal bases only)
    pub vision: bool,
}

impl Default for AdapterTargets {
    fn default() -> Self {
        Self { attention: true, mlp: true, vision: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoraConfig {
    pub rank:    usize,
    pub alpha:   f64,
    pub dropout: f64,
    pub targets: AdapterTargets,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            rank:    8,
            alpha:   8.0,
            dropout: 0.0,
            targets: AdapterTargets::default(),
        }
    }
}

impl LoraConfig {
    /// alpha / rank
    pub fn scaling(&self) -> f64 {
        self.alpha / self.rank as f64
    }

    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.rank == 0 {
            return Err(AdapterError::ZeroRank);
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(AdapterError::InvalidDropout(self.dropout));
        }
        if self.targets.vision {
            // Every base model this runtime loads is text-only
            return Err(AdapterError::VisionUnsupported);
        }
        if !self.targets.attention && !self.targets.mlp {
            return Err(AdapterError::NoTargets);
        }
        Ok(())
    }
}

// ─── LoraAdapter ──────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct LoraAdapter<B: Backend> {
    /// [d_in, rank]
    pub lora_a:  Param<Tensor<B, 2>>,
    /// [rank, d_out]
    pub lora_b:  Param<Tensor<B, 2>>,
    pub dropout: Dropout,
    pub scaling: f64,
}

impl<B: Backend> LoraAdapter<B> {
    pub fn new(d_in: usize, d_out: usize, config: &LoraConfig, device: &B::Device) -> Self {
        let rank = config.rank;
        let lora_a = Initializer::KaimingUniform { gain: 1.0 / 3.0_f64.sqrt(), fan_out_only: false }
            .init_with([d_in, rank], Some(d_in), Some(rank), device);
        let lora_b = Initializer::Zeros.init([rank, d_out], device);

        Self {
            lora_a,
            lora_b,
            dropout: DropoutConfig::new(config.dropout).init(),
            scaling: config.scaling(),
        }
    }

    /// x: [batch, seq_len, d_in] → delta: [batch, seq_len, d_out]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.dropout
            .forward(x)
            .matmul(self.lora_a.val().unsqueeze())
            .matmul(self.lora_b.val().unsqueeze())
            .mul_scalar(self.scaling)
    }
}

// ─── LoraLinear ───────────────────────────────────────────────────────────────

/// A base projection with an optional adapter beside it.
#[derive(Module, Debug)]
pub struct LoraLinear<B: Backend> {
    pub base:    Linear<B>,
    pub adapter: Option<LoraAdapter<B>>,
}

impl<B: Backend> LoraLinear<B> {
    pub fn new(base: Linear<B>) -> Self {
        Self { base, adapter: None }
    }

    /// [d_in, d_out] of the base weight
    pub fn dims(&self) -> [usize; 2] {
        self.base.weight.val().dims()
    }

    pub fn attach(self, config: &LoraConfig, device: &B::Device) -> Self {
        let [d_in, d_out] = self.dims();
        Self {
            base:    self.base,
            adapter: Some(LoraAdapter::new(d_in, d_out, config, device)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match &self.adapter {
            Some(adapter) => self.base.forward(x.clone()) + adapter.forward(x),
            None => self.base.forward(x),
        }
    }
}

// ─── AdapterWeights ───────────────────────────────────────────────────────────

/// The adapters of one decoder block, by projection name.
#[derive(Module, Debug)]
pub struct BlockAdapters<B: Backend> {
    pub q_proj:    Option<LoraAdapter<B>>,
    pub k_proj:    Option<LoraAdapter<B>>,
    pub v_proj:    Option<LoraAdapter<B>>,
    pub o_proj:    Option<LoraAdapter<B>>,
    pub gate_proj: Option<LoraAdapter<B>>,
    pub up_proj:   Option<LoraAdapter<B>>,
    pub down_proj: Option<LoraAdapter<B>>,
}

/// Every adapter of a model, detached from the base weights.
/// This is the unit that gets saved and restored.
#[derive(Module, Debug)]
pub struct AdapterWeights<B: Backend> {
    pub blocks: Vec<BlockAdapters<B>>,
}

impl<B: Backend> AdapterWeights<B> {
    pub fn adapter_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| {
                [&b.q_proj, &b.k_proj, &b.v_proj, &b.o_proj, &b.gate_proj, &b.up_proj, &b.down_proj]
                    .iter()
                    .filter(|a| a.is_some())
                    .count()
            })
            .sum()
    }
}

// ─── Parameter counting ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParameterCount {
    pub trainable: usize,
    pub total:     usize,
}

impl ParameterCount {
    fn add<B: Backend, const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        let tensor = param.val();
        let n = tensor.shape().num_elements();
        self.total += n;
        if tensor.is_require_grad() {
            self.trainable += n;
        }
    }

    fn add_linear<B: Backend>(&mut self, linear: &LoraLinear<B>) {
        self.add(&linear.base.weight);
        if let Some(bias) = &linear.base.bias {
            self.add(bias);
        }
        if let Some(adapter) = &linear.adapter {
            self.add(&adapter.lora_a);
            self.add(&adapter.lora_b);
        }
    }

    pub fn trainable_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.trainable as f64 / self.total as f64
        }
    }
}

impl fmt::Display for ParameterCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trainable params: {} || all params: {} || trainable%: {:.4}",
            self.trainable,
            self.total,
            100.0 * self.trainable_fraction()
        )
    }
}

// ─── Model-level operations ───────────────────────────────────────────────────

impl<B: Backend> CausalLm<B> {
    /// Freeze every base parameter and attach fresh adapters to the
    /// configured projection groups.
    pub fn attach_adapters(self, config: &LoraConfig, device: &B::Device) -> Result<Self, AdapterError> {
        config.validate()?;

        let frozen = self.no_grad();
        let targets = config.targets;
        let attach = |layer: LoraLinear<B>, enabled: bool| {
            if enabled { layer.attach(config, device) } else { layer }
        };

        let blocks = frozen
            .blocks
            .into_iter()
            .map(|block| {
                let DecoderBlock { input_norm, mut attention, post_attention_norm, mut mlp } = block;

                attention.q_proj = attach(attention.q_proj, targets.attention);
                attention.k_proj = attach(attention.k_proj, targets.attention);
                attention.v_proj = attach(attention.v_proj, targets.attention);
                attention.o_proj = attach(attention.o_proj, targets.attention);

                mlp.gate_proj = attach(mlp.gate_proj, targets.mlp);
                mlp.up_proj   = attach(mlp.up_proj, targets.mlp);
                mlp.down_proj = attach(mlp.down_proj, targets.mlp);

                DecoderBlock { input_norm, attention, post_attention_norm, mlp }
            })
            .collect();

        Ok(Self { blocks, ..frozen })
    }

    /// Copy out every adapter of the model.
    pub fn adapter_weights(&self) -> AdapterWeights<B> {
        let blocks = self
            .blocks
            .iter()
            .map(|block| BlockAdapters {
                q_proj:    block.attention.q_proj.adapter.clone(),
                k_proj:    block.attention.k_proj.adapter.clone(),
                v_proj:    block.attention.v_proj.adapter.clone(),
                o_proj:    block.attention.o_proj.adapter.clone(),
                gate_proj: block.mlp.gate_proj.adapter.clone(),
                up_proj:   block.mlp.up_proj.adapter.clone(),
                down_proj: block.mlp.down_proj.adapter.clone(),
            })
            .collect();
        AdapterWeights { blocks }
    }

    /// Replace the model's adapters with `weights`.
    pub fn with_adapter_weights(self, weights: AdapterWeights<B>) -> Result<Self, AdapterError> {
        if weights.blocks.len() != self.blocks.len() {
            return Err(AdapterError::LayerCountMismatch {
                expected: self.blocks.len(),
                found:    weights.blocks.len(),
            });
        }

        let blocks = self
            .blocks
            .into_iter()
            .zip(weights.blocks)
            .map(|(mut block, adapters)| {
                block.attention.q_proj.adapter = adapters.q_proj;
                block.attention.k_proj.adapter = adapters.k_proj;
                block.attention.v_proj.adapter = adapters.v_proj;
                block.attention.o_proj.adapter = adapters.o_proj;
                block.mlp.gate_proj.adapter    = adapters.gate_proj;
                block.mlp.up_proj.adapter      = adapters.up_proj;
                block.mlp.down_proj.adapter    = adapters.down_proj;
                block
            })
            .collect();

        Ok(Self { blocks, ..self })
    }

    /// Count trainable and total parameters by walking every Param.
    pub fn parameter_count(&self) -> ParameterCount {
        let mut count = ParameterCount::default();

        count.add(&self.token_embedding.weight);
        count.add(&self.position_embedding.weight);
        for block in &self.blocks {
            count.add(&block.input_norm.gamma);
            count.add(&block.post_attention_norm.gamma);
            for linear in [
                &block.attention.q_proj,
                &block.attention.k_proj,
                &block.attention.v_proj,
                &block.attention.o_proj,
                &block.mlp.gate_proj,
                &block.mlp.up_proj,
                &block.mlp.down_proj,
            ] {
                count.add_linear(linear);
            }
        }
        count.add(&self.final_norm.gamma);
        count.add(&self.lm_head.weight);
        if let Some(bias) = &self.lm_head.bias {
            count.add(bias);
        }

        count
    }
}
