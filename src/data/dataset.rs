// ============================================================
// Layer 4 — Supervised Fine-Tuning Dataset
// ============================================================
// Tokenizes the formatted corpus once, up front, and exposes it
// through Burn's Dataset trait.
//
// Each formatted example becomes:
//
//   <bos> <start_of_turn> u s e r \n ... <end_of_turn> <eos>
//   └─────────── at most max_seq_length - 1 ──────────┘  └ appended
//
// The whole sequence is supervised (instruction, input and
// output alike), exactly like plain causal-LM training on the
// text field. Sequences longer than the budget are truncated
// on the right; EOS is always the last token so the model learns
// to stop after closing its turn.
//
// Reference: Burn Book §4 (Datasets)

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::error::TrainingError;
use crate::domain::example::Corpus;
use crate::infra::tokenizer_store::ChatTokenizer;

/// One tokenized training sequence (unpadded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedExample {
    pub token_ids: Vec<u32>,
}

impl TokenizedExample {
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

pub struct SftDataset {
    samples: Vec<TokenizedExample>,
}

impl SftDataset {
    pub fn new(samples: Vec<TokenizedExample>) -> Self {
        Self { samples }
    }

    /// Tokenize every formatted example of the corpus.
    pub fn from_corpus(
        corpus:         &Corpus,
        tokenizer:      &ChatTokenizer,
        max_seq_length: usize,
    ) -> Result<Self, TrainingError> {
        let mut samples   = Vec::with_capacity(corpus.len());
        let mut truncated = 0usize;

        for (index, example) in corpus.iter().enumerate() {
            let (token_ids, was_truncated) = tokenizer
                .encode_for_training(example.text(), max_seq_length)
                .map_err(|e| TrainingError::Tokenization { index, reason: e.to_string() })?;

            if was_truncated {
                truncated += 1;
            }
            samples.push(TokenizedExample { token_ids });
        }

        if truncated > 0 {
            tracing::warn!(
                "{} of {} examples truncated to {} tokens",
                truncated,
                samples.len(),
                max_seq_length
            );
        }

        let total_tokens: usize = samples.iter().map(TokenizedExample::len).sum();
        tracing::info!(
            "Tokenized {} examples ({} tokens, longest {})",
            samples.len(),
            total_tokens,
            samples.iter().map(TokenizedExample::len).max().unwrap_or(0),
        );

        Ok(Self { samples })
    }
}

impl Dataset<TokenizedExample> for SftDataset {
    fn get(&self, index: usize) -> Option<TokenizedExample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::FormattedExample;
    use crate::test_support::tokenizer;

    #[test]
    fn test_sequences_start_with_bos_and_end_with_eos() {
        let tok = tokenizer();
        let corpus = Corpus::new(vec![FormattedExample::new("ab")]);
        let ds = SftDataset::from_corpus(&corpus, &tok, 64).unwrap();

        let ids = ds.get(0).unwrap().token_ids;
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], tok.bos_id().unwrap());
        assert_eq!(*ids.last().unwrap(), tok.eos_id());
    }

    #[test]
    fn test_long_sequences_are_truncated_but_keep_eos() {
        let tok = tokenizer();
        let corpus = Corpus::new(vec![FormattedExample::new("x".repeat(100))]);
        let ds = SftDataset::from_corpus(&corpus, &tok, 16).unwrap();

        let ids = ds.get(0).unwrap().token_ids;
        assert_eq!(ids.len(), 16);
        assert_eq!(*ids.last().unwrap(), tok.eos_id());
    }

    #[test]
    fn test_dataset_len_matches_corpus() {
        let tok = tokenizer();
        let corpus = Corpus::new(vec![FormattedExample::new("a"), FormattedExample::new("b")]);
        let ds = SftDataset::from_corpus(&corpus, &tok, 32).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(ds.get(2).is_none());
    }
}
