// Shared fixtures for unit tests: CPU backends, the chat
// tokenizer and a tiny decoder that trains in milliseconds.

use std::path::Path;

use crate::domain::template::ChatTemplate;
use crate::infra::model_store::ModelStore;
use crate::infra::tokenizer_store::{build_byte_level, ChatTokenizer};
use crate::ml::model::DecoderConfig;

pub type TestBackend = burn::backend::NdArray;
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;

pub fn tokenizer() -> ChatTokenizer {
    build_byte_level(&ChatTemplate::gemma(), 256).unwrap()
}

pub fn tiny_decoder_config(vocab_size: usize) -> DecoderConfig {
    DecoderConfig::new(vocab_size, 128, 16, 2, 2, 32)
}

/// Write a tiny base model directory (config, weights, tokenizer) to `dir`.
pub fn scaffold_base_model(dir: &Path) -> DecoderConfig {
    let tok = tokenizer();
    let config = tiny_decoder_config(tok.vocab_size());
    let model = config.init::<TestBackend>(&Default::default());
    ModelStore::save(dir, &model, &config, &tok).unwrap();
    config
}
