// ============================================================
// Layer 4 — Step Sampler
// ============================================================
// Decides which corpus examples go into each micro-batch.
//
// Training is bounded by optimizer steps, not epochs, so the
// sampler is an endless stream of example indices:
//
//   pass 1: shuffle(0..n) ──→ 3 0 4 1 2
//   pass 2: shuffle(0..n) ──→ 1 4 2 0 3   ← reshuffled
//   ...
//
// A micro-batch takes the next `batch_size` indices and may
// straddle two passes. Every example is seen exactly once per
// pass before any example is seen again.
//
// The RNG is a StdRng seeded from the run seed and used for
// nothing else, so the index stream depends only on (seed, n).
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: rand crate documentation (SeedableRng, SliceRandom)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

pub struct StepSampler {
    order:  Vec<usize>,
    cursor: usize,
    passes: usize,
    rng:    StdRng,
}

impl StepSampler {
    /// Sampler over `len` examples. The first pass is shuffled
    /// immediately.
    pub fn new(len: usize, seed: u64) -> Self {
        let mut sampler = Self {
            order:  (0..len).collect(),
            cursor: 0,
            passes: 0,
            rng:    StdRng::seed_from_u64(seed),
        };
        sampler.reshuffle();
        sampler
    }

    fn reshuffle(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
        self.passes += 1;
    }

    /// Indices for the next micro-batch. Empty only when the
    /// corpus is empty.
    pub fn next_batch(&mut self, batch_size: usize) -> Vec<usize> {
        if self.order.is_empty() {
            return Vec::new();
        }

        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            if self.cursor == self.order.len() {
                tracing::debug!("Corpus exhausted, starting pass {}", self.passes + 1);
                self.reshuffle();
            }
            batch.push(self.order[self.cursor]);
            self.cursor += 1;
        }
        batch
    }

    /// Number of passes started so far (1 after construction)
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Fractional epoch reached, as reported in progress logs
    pub fn epoch(&self) -> f64 {
        if self.order.is_empty() {
            return 0.0;
        }
        (self.passes - 1) as f64 + self.cursor as f64 / self.order.len() as f64
    }
}
