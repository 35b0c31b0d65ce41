// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and loads the tokenizer that goes with a base
// model, plus its tokenizer_config.json (which special tokens
// play the BOS / EOS / PAD roles, and the context length).
//
// The tokenizer written by `propfit init-base` is byte-level
// BPE with no merges:
//
//   ids 0..5   → <pad> <eos> <bos> <start_of_turn> <end_of_turn>
//   ids 5..261 → the 256 byte symbols of the ByteLevel alphabet
//
// Byte-level decoding is lossless, so a decoded generation keeps
// its newlines and turn markers exactly. The probe depends on
// that when it splits the answer out of the generated text.
//
// In tokenizers 0.15 there is no convenient builder for this,
// so the tokenizer JSON is written directly and loaded back
// with Tokenizer::from_str, the same format Tokenizer::from_file
// reads.
//
// Reference: Sennrich et al. (2016) BPE paper
//            Radford et al. (2019) byte-level BPE (GPT-2)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokenizers::{pre_tokenizers::byte_level::ByteLevel, Tokenizer};

use crate::domain::template::ChatTemplate;

pub const TOKENIZER_FILE: &str        = "tokenizer.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

pub const PAD_TOKEN: &str = "<pad>";
pub const EOS_TOKEN: &str = "<eos>";
pub const BOS_TOKEN: &str = "<bos>";

// ─── TokenizerConfig ──────────────────────────────────────────────────────────
/// Contents of tokenizer_config.json. Unknown keys are tolerated
/// because the file is shared with other tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub bos_token: Option<String>,
    pub eos_token: String,
    pub pad_token: String,
    #[serde(default = "default_add_bos")]
    pub add_bos_token: bool,
    pub model_max_length: usize,
    #[serde(default = "default_padding_side")]
    pub padding_side: String,
}

fn default_add_bos() -> bool {
    true
}

fn default_padding_side() -> String {
    "right".to_string()
}

impl TokenizerConfig {
    pub fn new(model_max_length: usize) -> Self {
        Self {
            bos_token:     Some(BOS_TOKEN.to_string()),
            eos_token:     EOS_TOKEN.to_string(),
            pad_token:     PAD_TOKEN.to_string(),
            add_bos_token: true,
            model_max_length,
            padding_side:  default_padding_side(),
        }
    }
}

// ─── ChatTokenizer ────────────────────────────────────────────────────────────
/// A `tokenizers::Tokenizer` with its special-token roles resolved.
#[derive(Clone)]
pub struct ChatTokenizer {
    inner:  Tokenizer,
    config: TokenizerConfig,
    bos_id: Option<u32>,
    eos_id: u32,
    pad_id: u32,
}

impl ChatTokenizer {
    /// Resolve the special tokens named in `config` against the vocabulary.
    pub fn new(inner: Tokenizer, config: TokenizerConfig) -> Result<Self> {
        let lookup = |token: &str| {
            inner
                .token_to_id(token)
                .ok_or_else(|| anyhow::anyhow!("special token '{token}' is not in the vocabulary"))
        };

        let eos_id = lookup(&config.eos_token)?;
        let pad_id = lookup(&config.pad_token)?;
        let bos_id = config.bos_token.as_deref().map(lookup).transpose()?;

        Ok(Self { inner, config, bos_id, eos_id, pad_id })
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn eos_id(&self) -> u32 {
        self.eos_id
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn bos_id(&self) -> Option<u32> {
        self.bos_id
    }

    /// Vocabulary size including added special tokens
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Tokenize a prompt: BOS (when configured) followed by the text.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {e}"))?;

        let mut ids = Vec::with_capacity(encoding.len() + 1);
        if self.config.add_bos_token {
            ids.extend(self.bos_id);
        }
        ids.extend_from_slice(encoding.get_ids());
        Ok(ids)
    }

    /// Tokenize a training sequence: like `encode`, cut to
    /// `max_len - 1` tokens, then EOS. Also reports whether the
    /// text had to be truncated.
    pub fn encode_for_training(&self, text: &str, max_len: usize) -> Result<(Vec<u32>, bool)> {
        anyhow::ensure!(max_len >= 2, "max sequence length must be at least 2, got {max_len}");

        let mut ids = self.encode(text)?;
        let truncated = ids.len() > max_len - 1;
        ids.truncate(max_len - 1);
        ids.push(self.eos_id);
        Ok((ids, truncated))
    }

    /// Decode ids back to text, keeping special tokens.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {e}"))
    }

    /// Same tokenizer with a different context length recorded.
    pub fn with_model_max_length(mut self, model_max_length: usize) -> Self {
        self.config.model_max_length = model_max_length;
        self
    }

    /// Write tokenizer.json and tokenizer_config.json into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let tok_path = dir.join(TOKENIZER_FILE);
        self.inner
            .save(&tok_path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write '{}': {e}", tok_path.display()))?;

        let cfg_path = dir.join(TOKENIZER_CONFIG_FILE);
        fs::write(&cfg_path, serde_json::to_string_pretty(&self.config)?)
            .with_context(|| format!("Cannot write '{}'", cfg_path.display()))?;

        tracing::debug!("Saved tokenizer to '{}'", dir.display());
        Ok(())
    }
}

impl std::fmt::Debug for ChatTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTokenizer")
            .field("vocab_size", &self.vocab_size())
            .field("config", &self.config)
            .finish()
    }
}

// ─── TokenizerStore ───────────────────────────────────────────────────────────
pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load tokenizer.json and, when present, tokenizer_config.json.
    /// Without a config file the default special tokens are assumed.
    pub fn load(&self) -> Result<ChatTokenizer> {
        let path = self.tokenizer_path();
        let inner = Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))?;

        let cfg_path = self.dir.join(TOKENIZER_CONFIG_FILE);
        let config = if cfg_path.exists() {
            let text = fs::read_to_string(&cfg_path)
                .with_context(|| format!("Cannot read '{}'", cfg_path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid tokenizer config '{}'", cfg_path.display()))?
        } else {
            tracing::warn!(
                "No {} in '{}', using default special tokens",
                TOKENIZER_CONFIG_FILE,
                self.dir.display()
            );
            TokenizerConfig::new(usize::MAX)
        };

        ChatTokenizer::new(inner, config)
    }
}

/// Byte-level BPE tokenizer whose special tokens are the three
/// sequence roles plus the template's turn delimiters.
pub fn build_byte_level(template: &ChatTemplate, model_max_length: usize) -> Result<ChatTokenizer> {
    // ── Step 1: Special tokens take the lowest ids ───────────────────────────
    let specials = [
        PAD_TOKEN,
        EOS_TOKEN,
        BOS_TOKEN,
        template.turn_start.as_str(),
        template.turn_end.as_str(),
    ];

    let mut vocab = Map::new();
    let mut added_tokens = Vec::with_capacity(specials.len());
    for (id, token) in specials.iter().enumerate() {
        vocab.insert(token.to_string(), json!(id));
        added_tokens.push(json!({
            "id": id,
            "content": token,
            "single_word": false,
            "lstrip": false,
            "rstrip": false,
            "normalized": false,
            "special": true
        }));
    }

    // ── Step 2: One token per byte symbol, sorted for stable ids ─────────────
    let mut alphabet: Vec<char> = ByteLevel::alphabet().into_iter().collect();
    alphabet.sort_unstable();
    for symbol in alphabet {
        let id = vocab.len();
        vocab.insert(symbol.to_string(), json!(id));
    }

    // ── Step 3: Tokenizer JSON in HuggingFace format ─────────────────────────
    let byte_level = json!({
        "type": "ByteLevel",
        "add_prefix_space": false,
        "trim_offsets": true,
        "use_regex": true
    });

    let tokenizer_json = json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": null,
        "pre_tokenizer": byte_level,
        "post_processor": null,
        "decoder": byte_level,
        "model": {
            "type": "BPE",
            "dropout": null,
            "unk_token": null,
            "continuing_subword_prefix": null,
            "end_of_word_suffix": null,
            "fuse_unk": false,
            "byte_fallback": false,
            "vocab": Value::Object(vocab),
            "merges": []
        }
    });

    let inner = Tokenizer::from_str(&tokenizer_json.to_string())
        .map_err(|e| anyhow::anyhow!("Cannot build byte-level tokenizer: {e}"))?;

    ChatTokenizer::new(inner, TokenizerConfig::new(model_max_length))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn tok() -> ChatTokenizer {
        build_byte_level(&ChatTemplate::gemma(), 512).unwrap()
    }

    #[test]
    fn test_vocabulary_layout() {
        let t = tok();
        assert_eq!(t.vocab_size(), 5 + 256);
        assert_eq!(t.pad_id(), 0);
        assert_eq!(t.eos_id(), 1);
        assert_eq!(t.bos_id(), Some(2));
    }

    #[test]
    fn test_turn_markers_are_single_tokens() {
        let t = tok();
        let ids = t.encode("<start_of_turn>model\n<end_of_turn>").unwrap();
        assert_eq!(ids[0], 2); // bos
        assert_eq!(ids[1], 3);
        assert_eq!(*ids.last().unwrap(), 4);
        // "model\n" is six byte tokens
        assert_eq!(ids.len(), 1 + 1 + 6 + 1);
    }

    #[test]
    fn test_decode_is_lossless() {
        let t = tok();
        let text = "<start_of_turn>user\nJohn Smith — Boston, MA\n\nÜber<end_of_turn>\n";
        let ids = t.encode(text).unwrap();
        assert_eq!(t.decode(&ids).unwrap(), format!("<bos>{text}"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let built = build_byte_level(&ChatTemplate::gemma(), 128).unwrap();
        built.save(dir.path()).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.config(), built.config());
        assert_eq!(loaded.config().model_max_length, 128);
        assert_eq!(
            loaded.encode("hello <end_of_turn>").unwrap(),
            built.encode("hello <end_of_turn>").unwrap()
        );
    }

    #[test]
    fn test_training_encoding_rejects_tiny_budget() {
        assert!(tok().encode_for_training("abc", 1).is_err());
    }
}
