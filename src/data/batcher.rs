// ============================================================
// Layer 4 — Causal LM Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a handful of tokenized
// sequences into next-token-prediction tensors.
//
// For a sequence  t0 t1 t2 t3  the model reads  t0 t1 t2  and is
// asked to predict  t1 t2 t3  (targets are inputs shifted left).
//
// Sequences in a batch differ in length, so they are right
// padded to the longest one:
//
//   inputs  = [ t0 t1 t2 | PAD PAD ]
//   targets = [ t1 t2 t3 | PAD PAD ]
//
// The loss ignores every PAD target. Positions are absolute and
// start at 0 for every row, so right padding never shifts a
// real token's position.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::TokenizedExample;

// ─── CausalLmBatch ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct CausalLmBatch<B: Backend> {
    /// Model inputs — shape: [batch_size, seq_len]
    pub inputs: Tensor<B, 2, Int>,

    /// Next-token targets — shape: [batch_size, seq_len]
    pub targets: Tensor<B, 2, Int>,
}

// ─── CausalLmBatcher ──────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct CausalLmBatcher<B: Backend> {
    device: B::Device,
    pad_id: u32,
}

impl<B: Backend> CausalLmBatcher<B> {
    pub fn new(device: B::Device, pad_id: u32) -> Self {
        Self { device, pad_id }
    }
}

impl<B: Backend> Batcher<TokenizedExample, CausalLmBatch<B>> for CausalLmBatcher<B> {
    fn batch(&self, items: Vec<TokenizedExample>) -> CausalLmBatch<B> {
        let batch_size = items.len();
        // One token of every sequence is consumed by the shift
        let seq_len = items
            .iter()
            .map(|s| s.token_ids.len().saturating_sub(1))
            .max()
            .unwrap_or(0)
            .max(1);

        let pad = self.pad_id as i32;
        let mut input_flat  = Vec::with_capacity(batch_size * seq_len);
        let mut target_flat = Vec::with_capacity(batch_size * seq_len);

        for item in &items {
            let ids = &item.token_ids;
            let shifted = ids.len().saturating_sub(1);

            // ── Real tokens ───────────────────────────────────────────────────
            input_flat.extend(ids[..shifted].iter().map(|&t| t as i32));
            target_flat.extend(ids[1.min(ids.len())..].iter().map(|&t| t as i32));

            // ── Right padding ─────────────────────────────────────────────────
            let padding = seq_len - shifted;
            input_flat.extend(std::iter::repeat(pad).take(padding));
            target_flat.extend(std::iter::repeat(pad).take(padding));
        }

        let inputs = Tensor::<B, 1, Int>::from_ints(input_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);
        let targets = Tensor::<B, 1, Int>::from_ints(target_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        CausalLmBatch { inputs, targets }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestBackend;

    fn ints(t: Tensor<TestBackend, 2, Int>) -> Vec<i64> {
        t.into_data().convert::<i64>().to_vec::<i64>().unwrap()
    }

    #[test]
    fn test_targets_are_shifted_inputs_with_right_padding() {
        let batcher = CausalLmBatcher::<TestBackend>::new(Default::default(), 0);
        let batch = batcher.batch(vec![
            TokenizedExample { token_ids: vec![10, 11, 12, 13] },
            TokenizedExample { token_ids: vec![20, 21] },
        ]);

        assert_eq!(batch.inputs.dims(), [2, 3]);
        assert_eq!(ints(batch.inputs),  vec![10, 11, 12, 20, 0, 0]);
        assert_eq!(ints(batch.targets), vec![11, 12, 13, 21, 0, 0]);
    }

    #[test]
    fn test_single_sequence_has_no_padding() {
        let batcher = CausalLmBatcher::<TestBackend>::new(Default::default(), 0);
        let batch = batcher.batch(vec![TokenizedExample { token_ids: vec![5, 6, 7] }]);
        assert_eq!(ints(batch.inputs), vec![5, 6]);
        assert_eq!(ints(batch.targets), vec![6, 7]);
    }
}
