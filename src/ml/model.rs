use burn::{
    nn::{
        attention::generate_autoregressive_mask,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
        RmsNorm, RmsNormConfig,
    },
    prelude::*,
    tensor::activation::{gelu, log_softmax, softmax},
};

use crate::ml::lora::LoraLinear;

// #[derive(Config)] brings Clone and Serialize/Deserialize with it;
// deriving them again conflicts.
#[derive(Config, Debug)]
pub struct DecoderConfig {
    pub vocab_size:              usize,
    pub max_position_embeddings: usize,
    pub d_model:                 usize,
    pub num_heads:               usize,
    pub num_layers:              usize,
    pub d_ff:                    usize,
    #[config(default = 1e-6)]
    pub rms_norm_eps:            f64,
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            return Err(format!(
                "d_model ({}) must be a positive multiple of num_heads ({})",
                self.d_model, self.num_heads
            ));
        }
        if self.vocab_size == 0 || self.max_position_embeddings == 0 || self.num_layers == 0 {
            return Err("vocab_size, max_position_embeddings and num_layers must be positive".into());
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> CausalLm<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_position_embeddings, self.d_model).init(device);
        let blocks: Vec<DecoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_decoder_block(device))
            .collect();
        let final_norm = self.build_norm(device);
        let lm_head    = LinearConfig::new(self.d_model, self.vocab_size).with_bias(false).init(device);
        CausalLm {
            token_embedding, position_embedding, blocks,
            final_norm, lm_head,
            max_position_embeddings: self.max_position_embeddings,
        }
    }

    fn build_norm<B: Backend>(&self, device: &B::Device) -> RmsNorm<B> {
        RmsNormConfig::new(self.d_model).with_epsilon(self.rms_norm_eps).init(device)
    }

    fn projection<B: Backend>(&self, d_in: usize, d_out: usize, device: &B::Device) -> LoraLinear<B> {
        LoraLinear::new(LinearConfig::new(d_in, d_out).with_bias(false).init(device))
    }

    fn build_decoder_block<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        let attention = SelfAttention {
            q_proj:    self.projection(self.d_model, self.d_model, device),
            k_proj:    self.projection(self.d_model, self.d_model, device),
            v_proj:    self.projection(self.d_model, self.d_model, device),
            o_proj:    self.projection(self.d_model, self.d_model, device),
            num_heads: self.num_heads,
        };
        let mlp = GatedMlp {
            gate_proj: self.projection(self.d_model, self.d_ff, device),
            up_proj:   self.projection(self.d_model, self.d_ff, device),
            down_proj: self.projection(self.d_ff, self.d_model, device),
        };
        DecoderBlock {
            input_norm: self.build_norm(device),
            attention,
            post_attention_norm: self.build_norm(device),
            mlp,
        }
    }
}

#[derive(Module, Debug)]
pub struct SelfAttention<B: Backend> {
    pub q_proj:    LoraLinear<B>,
    pub k_proj:    LoraLinear<B>,
    pub v_proj:    LoraLinear<B>,
    pub o_proj:    LoraLinear<B>,
    pub num_heads: usize,
}

impl<B: Backend> SelfAttention<B> {
    /// x: [batch, seq_len, d_model] → [batch, seq_len, d_model], causally masked
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, seq_len, d_model] = x.dims();
        let head_dim = d_model / self.num_heads;
        let device = x.device();

        let split_heads = |t: Tensor<B, 3>| {
            t.reshape([batch_size, seq_len, self.num_heads, head_dim]).swap_dims(1, 2)
        };
        let q = split_heads(self.q_proj.forward(x.clone()));
        let k = split_heads(self.k_proj.forward(x.clone()));
        let v = split_heads(self.v_proj.forward(x));

        let scores = q
            .matmul(k.swap_dims(2, 3))
            .div_scalar((head_dim as f64).sqrt()); // [batch, heads, seq, seq]

        // A token may only attend to itself and earlier tokens.
        let mask = generate_autoregressive_mask::<B>(batch_size, seq_len, &device)
            .unsqueeze_dim::<4>(1)
            .expand([batch_size, self.num_heads, seq_len, seq_len]);
        let weights = softmax(scores.mask_fill(mask, -1.0e9), 3);

        let context = weights
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch_size, seq_len, d_model]);
        self.o_proj.forward(context)
    }
}

#[derive(Module, Debug)]
pub struct GatedMlp<B: Backend> {
    pub gate_proj: LoraLinear<B>,
    pub up_proj:   LoraLinear<B>,
    pub down_proj: LoraLinear<B>,
}

impl<B: Backend> GatedMlp<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let gate = gelu(self.gate_proj.forward(x.clone()));
        self.down_proj.forward(gate * self.up_proj.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub input_norm:          RmsNorm<B>,
    pub attention:           SelfAttention<B>,
    pub post_attention_norm: RmsNorm<B>,
    pub mlp:                 GatedMlp<B>,
}

impl<B: Backend> DecoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = x.clone() + self.attention.forward(self.input_norm.forward(x));
        x.clone() + self.mlp.forward(self.post_attention_norm.forward(x))
    }
}

/// Decoder-only causal language model with learned absolute positions.
#[derive(Module, Debug)]
pub struct CausalLm<B: Backend> {
    pub token_embedding:         Embedding<B>,
    pub position_embedding:      Embedding<B>,
    pub blocks:                  Vec<DecoderBlock<B>>,
    pub final_norm:              RmsNorm<B>,
    pub lm_head:                 Linear<B>,
    pub max_position_embeddings: usize,
}

impl<B: Backend> CausalLm<B> {
    /// input_ids: [batch, seq_len] → next-token logits: [batch, seq_len, vocab]
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();

        let tok_emb = self.token_embedding.forward(input_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = tok_emb + pos_emb;
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.lm_head.forward(self.final_norm.forward(x))
    }

    /// Mean next-token cross-entropy over all non-padding targets.
    ///
    /// Padded positions contribute nothing and are not counted, so a
    /// right-padded sequence has the same loss as the unpadded one.
    pub fn forward_loss(
        &self,
        input_ids: Tensor<B, 2, Int>,
        targets:   Tensor<B, 2, Int>,
        pad_id:    u32,
    ) -> Tensor<B, 1> {
        let logits = self.forward(input_ids);
        let [batch_size, seq_len, vocab_size] = logits.dims();
        let n = batch_size * seq_len;

        let targets   = targets.reshape([n, 1]);
        let log_probs = log_softmax(logits.reshape([n, vocab_size]), 1);
        let nll       = log_probs.gather(1, targets.clone()).reshape([n]).neg();

        let mask    = targets.reshape([n]).not_equal_elem(pad_id as i32).float();
        let counted = mask.clone().sum().clamp_min(1.0);
        (nll * mask).sum().div(counted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tiny_decoder_config, TestBackend};

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = tiny_decoder_config(40).init::<TestBackend>(&device);
        let ids = Tensor::<TestBackend, 1, Int>::from_ints([1, 2, 3, 4, 5, 6].as_slice(), &device)
            .reshape([2, 3]);
        assert_eq!(model.forward(ids).dims(), [2, 3, 40]);
    }

    #[test]
    fn test_earlier_logits_ignore_later_tokens() {
        let device = Default::default();
        let model = tiny_decoder_config(40).init::<TestBackend>(&device);

        let a = Tensor::<TestBackend, 1, Int>::from_ints([7, 8, 9].as_slice(), &device).unsqueeze::<2>();
        let b = Tensor::<TestBackend, 1, Int>::from_ints([7, 8, 30].as_slice(), &device).unsqueeze::<2>();

        let first_two = |t: Tensor<TestBackend, 3>| {
            t.slice([0..1, 0..2, 0..40]).into_data().to_vec::<f32>().unwrap()
        };
        let la = first_two(model.forward(a));
        let lb = first_two(model.forward(b));
        for (x, y) in la.iter().zip(&lb) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_loss_is_finite() {
        let device = Default::default();
        let model = tiny_decoder_config(40).init::<TestBackend>(&device);
        let inputs  = Tensor::<TestBackend, 1, Int>::from_ints([5, 6, 7].as_slice(), &device).unsqueeze::<2>();
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([6, 7, 0].as_slice(), &device).unsqueeze::<2>();
        let loss: f32 = model.forward_loss(inputs, targets, 0).into_scalar();
        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }

    fn ids(values: &[i32]) -> Tensor<TestBackend, 2, Int> {
        Tensor::<TestBackend, 1, Int>::from_ints(values, &Default::default()).unsqueeze::<2>()
    }

    #[test]
    fn test_right_padding_leaves_loss_unchanged() {
        let device = Default::default();
        let model = tiny_decoder_config(40).init::<TestBackend>(&device);

        let plain: f32  = model.forward_loss(ids(&[5, 6]), ids(&[6, 7]), 0).into_scalar();
        let padded: f32 = model.forward_loss(ids(&[5, 6, 0, 0]), ids(&[6, 7, 0, 0]), 0).into_scalar();
        assert!((plain - padded).abs() < 1e-5, "plain={plain} padded={padded}");
    }

    #[test]
    fn test_mixed_lengths_weight_every_target_token_equally() {
        use crate::data::batcher::CausalLmBatcher;
        use crate::data::dataset::TokenizedExample;
        use burn::data::dataloader::batcher::Batcher;

        let device = Default::default();
        let model = tiny_decoder_config(40).init::<TestBackend>(&device);
        let batcher = CausalLmBatcher::<TestBackend>::new(device, 0);
        let long  = TokenizedExample { token_ids: vec![3, 4, 5, 6, 7] };
        let short = TokenizedExample { token_ids: vec![8, 9] };

        let loss_of = |items: Vec<TokenizedExample>| -> f32 {
            let batch = batcher.batch(items);
            model.forward_loss(batch.inputs, batch.targets, 0).into_scalar()
        };
        let long_loss  = loss_of(vec![long.clone()]);
        let short_loss = loss_of(vec![short.clone()]);
        let mixed      = loss_of(vec![long, short]);

        // 4 targets from the long sequence, 1 from the short one
        let expected = (4.0 * long_loss + short_loss) / 5.0;
        assert!((mixed - expected).abs() < 1e-5, "mixed={mixed} expected={expected}");
    }

    #[test]
    fn test_validate_rejects_uneven_heads() {
        let cfg = DecoderConfig::new(10, 8, 10, 3, 1, 8);
        assert!(cfg.validate().is_err());
        assert!(tiny_decoder_config(10).validate().is_ok());
    }
}
