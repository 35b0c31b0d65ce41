// ============================================================
// Layer 5 — Model Preparer
// ============================================================
// Turns a model id into a frozen base model with fresh
// adapters, ready for the fine-tuning loop.
//
//   load(model_id, max_seq_length, quantization)
//       → LoadedModel { model, tokenizer, config }
//   attach_adapters(model, lora)
//       → model with A (Kaiming) / B (zeros) beside every
//         targeted projection, all base parameters frozen
//
// After attaching, the trainable parameter count must equal the
// adapter parameter count exactly. On an autodiff backend this is
// checked before the model is handed to the trainer; on a plain
// inference backend nothing is trainable and the check is skipped.
//
// Reference: Hu et al. (2021) LoRA: Low-Rank Adaptation of LLMs

use burn::prelude::*;

use crate::domain::error::{AdapterError, ModelLoadError};
use crate::infra::model_store::{LoadedModel, ModelStore, QuantizationMode};
use crate::ml::lora::{LoraConfig, ParameterCount};
use crate::ml::model::CausalLm;

pub struct ModelPreparer {
    store: ModelStore,
}

impl ModelPreparer {
    pub fn new(store: ModelStore) -> Self {
        Self { store }
    }

    pub fn load<B: Backend>(
        &self,
        model_id:       &str,
        max_seq_length: usize,
        quantization:   QuantizationMode,
        device:         &B::Device,
    ) -> Result<LoadedModel<B>, ModelLoadError> {
        tracing::debug!("Resolving '{}' (models root '{}')", model_id, self.store.models_root().display());
        self.store.load(model_id, max_seq_length, quantization, device)
    }

    /// Freeze the base and attach adapters. Returns the model and
    /// its parameter count.
    pub fn attach_adapters<B: Backend>(
        &self,
        model:  CausalLm<B>,
        lora:   &LoraConfig,
        device: &B::Device,
    ) -> Result<(CausalLm<B>, ParameterCount), AdapterError> {
        let model = model.attach_adapters(lora, device)?;
        let count = model.parameter_count();

        if B::ad_enabled() {
            let adapter = model.adapter_weights().num_params();
            if count.trainable != adapter {
                return Err(AdapterError::FrozenBaseViolated { trainable: count.trainable, adapter });
            }
        }

        tracing::info!(
            "Attached adapters (rank {}, alpha {}, dropout {}): {}",
            lora.rank,
            lora.alpha,
            lora.dropout,
            count
        );
        Ok((model, count))
    }
}
