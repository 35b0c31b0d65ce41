// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Autoregressive generation and the post-training probe.
//
// Generation loop:
//
//   ids = prompt
//   repeat up to max_new_tokens:
//       logits = model(last max_position_embeddings ids)[-1]
//       next   = sample(softmax(logits / T))   or argmax(logits)
//       stop if next == EOS   (EOS is masked out until
//                              min_new_tokens have been produced)
//       ids.push(next)
//
// The probe renders one prompt with the chat template, leaves the
// model turn open, generates, decodes WITH special tokens and then
// cuts the model's answer out of the decoded text (see
// ChatTemplate::extract_response).
//
// Sampling uses its own StdRng seeded from the generation config,
// so a sampled probe is repeatable too.
//
// Reference: Holtzman et al. (2020) The Curious Case of Neural Text Degeneration

use burn::prelude::*;
use rand::{distributions::WeightedIndex, prelude::Distribution, rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::error::ProbeError;
use crate::domain::template::ChatTemplate;
use crate::infra::tokenizer_store::ChatTokenizer;
use crate::ml::model::CausalLm;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub min_new_tokens: usize,
    pub temperature:    f64,
    /// false → greedy (argmax) decoding
    pub do_sample:      bool,
    pub seed:           u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            min_new_tokens: 1,
            temperature:    0.7,
            do_sample:      true,
            seed:           3407,
        }
    }
}

impl GenerationConfig {
    pub fn greedy(self) -> Self {
        Self { do_sample: false, ..self }
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// The model's answer, cut out of the decoded text
    pub text:           String,
    /// Everything after the prompt, decoded with special tokens
    pub raw:            String,
    pub new_tokens:     usize,
    pub stopped_on_eos: bool,
}

pub struct Inferencer<'a, B: Backend> {
    model:     &'a CausalLm<B>,
    tokenizer: &'a ChatTokenizer,
    device:    B::Device,
}

impl<'a, B: Backend> Inferencer<'a, B> {
    pub fn new(model: &'a CausalLm<B>, tokenizer: &'a ChatTokenizer, device: &B::Device) -> Self {
        Self { model, tokenizer, device: device.clone() }
    }

    /// Generate continuation ids for `prompt_ids`. EOS is not included.
    /// Returns the new ids and whether generation ended on EOS.
    pub fn generate(&self, prompt_ids: &[u32], cfg: &GenerationConfig) -> Result<(Vec<u32>, bool), ProbeError> {
        if prompt_ids.is_empty() {
            return Err(ProbeError::Tokenization("prompt is empty".into()));
        }

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let sampling = cfg.do_sample && cfg.temperature > 0.0;
        let window = self.model.max_position_embeddings;

        let mut ids: Vec<u32> = prompt_ids.to_vec();
        let mut generated = Vec::new();

        for _ in 0..cfg.max_new_tokens {
            let context = &ids[ids.len().saturating_sub(window)..];
            let mut logits = to_vec(self.next_token_logits(context)?)?;
            if generated.len() < cfg.min_new_tokens {
                if let Some(eos) = logits.get_mut(self.tokenizer.eos_id() as usize) {
                    *eos = f32::NEG_INFINITY;
                }
            }

            let next = if sampling {
                sample(&logits, cfg.temperature, &mut rng)?
            } else {
                argmax(&logits)
            };

            if next == self.tokenizer.eos_id() {
                return Ok((generated, true));
            }
            ids.push(next);
            generated.push(next);
        }

        tracing::debug!("Generation stopped at the {} token budget", cfg.max_new_tokens);
        Ok((generated, false))
    }

    /// Run the probe: one templated prompt, one generation, answer extraction.
    pub fn probe(
        &self,
        template:    &ChatTemplate,
        instruction: &str,
        input:       &str,
        cfg:         &GenerationConfig,
    ) -> Result<ProbeResult, ProbeError> {
        let prompt = template.render_prompt(instruction, input);
        let prompt_ids = self
            .tokenizer
            .encode(&prompt)
            .map_err(|e| ProbeError::Tokenization(e.to_string()))?;

        let (generated, stopped_on_eos) = self.generate(&prompt_ids, cfg)?;

        let mut all_ids = prompt_ids;
        all_ids.extend_from_slice(&generated);
        let decoded = self
            .tokenizer
            .decode(&all_ids)
            .map_err(|e| ProbeError::Decode(e.to_string()))?;
        let raw = self
            .tokenizer
            .decode(&generated)
            .map_err(|e| ProbeError::Decode(e.to_string()))?;

        let text = template.extract_response(&decoded);
        tracing::debug!(
            "Probe generated {} tokens (eos: {}), answer {} chars",
            generated.len(),
            stopped_on_eos,
            text.len()
        );

        Ok(ProbeResult { text, raw, new_tokens: generated.len(), stopped_on_eos })
    }

    /// Logits of the last position, shape [vocab]
    fn next_token_logits(&self, context: &[u32]) -> Result<Tensor<B, 1>, ProbeError> {
        let flat: Vec<i32> = context.iter().map(|&t| t as i32).collect();
        let input = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).unsqueeze::<2>();

        let logits = self.model.forward(input);
        let [_, seq_len, vocab_size] = logits.dims();
        if seq_len == 0 {
            return Err(ProbeError::Logits("model returned no positions".into()));
        }
        Ok(logits
            .slice([0..1, seq_len - 1..seq_len, 0..vocab_size])
            .reshape([vocab_size]))
    }
}

/// Draw from softmax(logits / temperature).
fn sample(logits: &[f32], temperature: f64, rng: &mut StdRng) -> Result<u32, ProbeError> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let weights: Vec<f64> = logits
        .iter()
        .map(|&l| ((l as f64 - max) / temperature).exp())
        .collect();
    let dist = WeightedIndex::new(&weights).map_err(|e| ProbeError::Sampling(e.to_string()))?;
    Ok(dist.sample(rng) as u32)
}

fn to_vec<B: Backend>(t: Tensor<B, 1>) -> Result<Vec<f32>, ProbeError> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ProbeError::Logits(format!("{e:?}")))
}

fn argmax(values: &[f32]) -> u32 {
    let mut best = 0usize;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best as u32
}
