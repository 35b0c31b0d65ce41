// ============================================================
// Layer 5 — Fine-Tuning Loop
// ============================================================
// Step-bounded supervised fine-tuning of the adapter weights.
//
// One optimizer step:
//
//   for each of `gradient_accumulation_steps` micro-batches:
//       pick `per_device_train_batch_size` examples (StepSampler)
//       forward → loss → (loss / accum).backward()
//       accumulate gradients
//   clip the summed gradient to max_grad_norm (global L2 norm)
//   AdamW step with lr = schedule(step)     ← one update
//
// The run stops after exactly `max_steps` updates, wrapping
// around (and reshuffling) the corpus as often as needed. There
// are no epochs, no validation split and no early stopping.
//
// Only adapter parameters require gradients (see lora.rs), so
// GradientsParams only ever carries adapter gradients and the
// frozen base weights are never touched by AdamW.
//
// A NaN or infinite loss stops the run immediately.
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

use crate::data::{
    batcher::{CausalLmBatch, CausalLmBatcher},
    dataset::{SftDataset, TokenizedExample},
    sampler::StepSampler,
};
use crate::domain::error::TrainingError;
use crate::domain::example::Corpus;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, StepMetrics},
    tokenizer_store::ChatTokenizer,
};
use crate::ml::clip::clip_grad_norm;
use crate::ml::model::CausalLm;
use crate::ml::schedule::{LrSchedule, ScheduleKind};

// ─── Training Configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    #[serde(rename = "adamw")]
    AdamW,
    /// Accepted in config files for compatibility, rejected at run time
    #[serde(rename = "adamw_8bit")]
    AdamW8bit,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::AdamW     => f.write_str("adamw"),
            OptimizerKind::AdamW8bit => f.write_str("adamw_8bit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrainingConfig {
    pub per_device_train_batch_size: usize,
    pub gradient_accumulation_steps: usize,
    pub warmup_steps:                usize,
    pub max_steps:                   usize,
    pub learning_rate:               f64,
    pub logging_steps:               usize,
    pub optim:                       OptimizerKind,
    pub weight_decay:                f64,
    pub lr_scheduler_type:           ScheduleKind,
    pub seed:                        u64,
    /// Upper bound on the global L2 norm of each step's gradient
    pub max_grad_norm:               f64,
    pub output_dir:                  PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            per_device_train_batch_size: 2,
            gradient_accumulation_steps: 4,
            warmup_steps:                5,
            max_steps:                   30,
            learning_rate:               2e-4,
            logging_steps:               1,
            optim:                       OptimizerKind::AdamW,
            weight_decay:                0.01,
            lr_scheduler_type:           ScheduleKind::Linear,
            seed:                        3407,
            max_grad_norm:               1.0,
            output_dir:                  PathBuf::from("checkpoints"),
        }
    }
}

impl TrainingConfig {
    pub fn effective_batch_size(&self) -> usize {
        self.per_device_train_batch_size * self.gradient_accumulation_steps
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        let invalid = |msg: &str| Err(TrainingError::InvalidConfig(msg.to_string()));

        if self.per_device_train_batch_size == 0 {
            return invalid("per_device_train_batch_size must be at least 1");
        }
        if self.gradient_accumulation_steps == 0 {
            return invalid("gradient_accumulation_steps must be at least 1");
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be at least 1");
        }
        if self.logging_steps == 0 {
            return invalid("logging_steps must be at least 1");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid("learning_rate must be a positive number");
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return invalid("weight_decay must be non-negative");
        }
        if !(self.max_grad_norm.is_finite() && self.max_grad_norm > 0.0) {
            return invalid("max_grad_norm must be a positive number");
        }
        Ok(())
    }

    fn optimizer(&self) -> Result<AdamWConfig, TrainingError> {
        match self.optim {
            OptimizerKind::AdamW => Ok(AdamWConfig::new()
                .with_epsilon(1e-8)
                .with_weight_decay(self.weight_decay as f32)),
            other => Err(TrainingError::UnsupportedOptimizer(other.to_string())),
        }
    }
}

// ─── Training Summary ─────────────────────────────────────────────────────────

/// What leaves the training loop besides the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Mean loss over all optimizer steps
    pub final_loss: f64,
    /// Number of optimizer steps taken
    pub final_step: usize,
    /// Loss of the last optimizer step
    pub last_loss:  f64,
    /// Loss of every optimizer step, in order
    pub losses:     Vec<f64>,
    /// Fractional passes over the corpus
    pub epochs:     f64,
}

/// Loop-local state: step counter and loss history.
#[derive(Default)]
struct RunState {
    losses:        Vec<f64>,
    since_last_log: Vec<f64>,
}

impl RunState {
    fn record(&mut self, loss: f64) {
        self.losses.push(loss);
        self.since_last_log.push(loss);
    }

    fn step(&self) -> usize {
        self.losses.len()
    }

    /// Mean loss since the previous log line
    fn take_logged_loss(&mut self) -> f64 {
        let mean = mean(&self.since_last_log);
        self.since_last_log.clear();
        mean
    }

    fn into_summary(self, epochs: f64) -> TrainingSummary {
        TrainingSummary {
            final_loss: mean(&self.losses),
            final_step: self.losses.len(),
            last_loss:  self.losses.last().copied().unwrap_or(f64::NAN),
            losses:     self.losses,
            epochs,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn ensure_finite(step: usize, loss: f64) -> Result<(), TrainingError> {
    if loss.is_finite() {
        Ok(())
    } else {
        Err(TrainingError::NonFiniteLoss { step, loss })
    }
}

// ─── Gradient Accumulation ────────────────────────────────────────────────────

/// Forward and backward over one step's micro-batches. Each loss is
/// divided by the number of micro-batches, so the returned gradient is
/// their mean; the returned loss is the mean micro-batch loss.
fn accumulate_gradients<B: AutodiffBackend>(
    model:   &CausalLm<B>,
    batches: Vec<CausalLmBatch<B>>,
    pad_id:  u32,
    step:    usize,
) -> Result<(GradientsParams, f64), TrainingError> {
    let accum = batches.len() as f64;
    let mut accumulator = GradientsAccumulator::<CausalLm<B>>::new();
    let mut step_loss   = 0.0f64;

    for batch in batches {
        let loss = model.forward_loss(batch.inputs, batch.targets, pad_id);
        let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();
        ensure_finite(step, loss_value)?;
        step_loss += loss_value / accum;

        let grads = loss.div_scalar(accum).backward();
        accumulator.accumulate(model, GradientsParams::from_grads(grads, model));
    }
    Ok((accumulator.grads(), step_loss))
}

// ─── Training Loop ────────────────────────────────────────────────────────────

/// Train the adapters of `model` on `corpus` for `cfg.max_steps`
/// optimizer steps.
pub fn run_finetuning<B: AutodiffBackend>(
    model:          CausalLm<B>,
    tokenizer:      &ChatTokenizer,
    corpus:         &Corpus,
    cfg:            &TrainingConfig,
    max_seq_length: usize,
    device:         &B::Device,
) -> Result<(CausalLm<B>, TrainingSummary), TrainingError> {
    // ── Refuse to start on anything the loop cannot finish ──────────────────
    cfg.validate()?;
    if corpus.is_empty() {
        return Err(TrainingError::EmptyCorpus);
    }
    let mut optim = cfg.optimizer()?.init::<B, CausalLm<B>>();

    let dataset  = SftDataset::from_corpus(corpus, tokenizer, max_seq_length)?;
    let batcher  = CausalLmBatcher::<B>::new(device.clone(), tokenizer.pad_id());
    let schedule = LrSchedule::new(
        cfg.lr_scheduler_type,
        cfg.learning_rate,
        cfg.warmup_steps,
        cfg.max_steps,
    );
    let mut sampler = StepSampler::new(dataset.len(), cfg.seed);

    let checkpoints = CheckpointManager::new(&cfg.output_dir)?;
    let metrics     = MetricsLogger::new(checkpoints.dir())?;

    tracing::info!(
        "Fine-tuning on {} examples: {} steps, effective batch {} ({} x {}), lr={:e}",
        dataset.len(),
        cfg.max_steps,
        cfg.effective_batch_size(),
        cfg.per_device_train_batch_size,
        cfg.gradient_accumulation_steps,
        cfg.learning_rate,
    );
    tracing::debug!("Step metrics go to '{}'", metrics.csv_path().display());

    let accum     = cfg.gradient_accumulation_steps;
    let mut model = model;
    let mut state = RunState::default();

    for step in 0..cfg.max_steps {
        let lr = schedule.lr_at(step);

        // ── Micro-batches ─────────────────────────────────────────────────────
        let batches: Vec<CausalLmBatch<B>> = (0..accum)
            .map(|_| {
                let items: Vec<TokenizedExample> = sampler
                    .next_batch(cfg.per_device_train_batch_size)
                    .into_iter()
                    .filter_map(|index| dataset.get(index))
                    .collect();
                batcher.batch(items)
            })
            .collect();
        let (mut grads, step_loss) =
            accumulate_gradients(&model, batches, tokenizer.pad_id(), step + 1)?;

        // ── One optimizer update ──────────────────────────────────────────────
        let grad_norm = clip_grad_norm::<B, _>(&model, &mut grads, cfg.max_grad_norm);
        model = optim.step(lr, model, grads);
        state.record(step_loss);

        let done = state.step();
        if done % cfg.logging_steps == 0 || done == cfg.max_steps {
            let logged = StepMetrics {
                step:          done,
                loss:          state.take_logged_loss(),
                learning_rate: lr,
                epoch:         sampler.epoch(),
            };
            println!(
                "Step {:>4}/{} | loss={:.4} | lr={:.3e} | epoch={:.2}",
                logged.step, cfg.max_steps, logged.loss, logged.learning_rate, logged.epoch,
            );
            tracing::debug!(
                step = logged.step,
                loss = logged.loss,
                lr = logged.learning_rate,
                grad_norm,
                "training progress"
            );
            metrics.log(&logged)?;
        }
    }

    let summary = state.into_summary(sampler.epoch());
    checkpoints.save_state(&summary)?;
    tracing::info!(
        "Training complete: {} steps over {} corpus passes, mean loss {:.4}, last loss {:.4}",
        summary.final_step,
        sampler.passes(),
        summary.final_loss,
        summary.last_loss,
    );

    Ok((model, summary))
}
