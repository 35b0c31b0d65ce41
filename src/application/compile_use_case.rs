// ============================================================
// Layer 2 — CompileUseCase
// ============================================================
// Turns a raw CRM export into the training data file:
//
//   Step 1: Compile record/response pairs  (Layer 4 - data)
//   Step 2: Write the JSON array           (Layer 4 - data)

use anyhow::Result;
use std::path::PathBuf;

use crate::data::compiler::{write_training_file, CompileReport, RecordCompiler};

#[derive(Debug, Clone, PartialEq)]
pub struct CompileConfig {
    pub raw_dir:  PathBuf,
    pub out_path: PathBuf,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            raw_dir:  PathBuf::from("raw"),
            out_path: PathBuf::from("processed/unsloth_training_data.json"),
        }
    }
}

pub struct CompileUseCase {
    config: CompileConfig,
}

impl CompileUseCase {
    pub fn new(config: CompileConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<CompileReport> {
        let report = RecordCompiler::new(&self.config.raw_dir).compile()?;
        if report.examples.is_empty() {
            tracing::warn!("No record/response pairs found under '{}'", self.config.raw_dir.display());
        }
        if report.skipped() > 0 {
            tracing::warn!("{} record pairs were skipped", report.skipped());
        }
        write_training_file(&self.config.out_path, &report.examples)?;
        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::formatter::Formatter;
    use crate::data::loader::JsonExampleLoader;
    use crate::domain::traits::ExampleSource;
    use std::fs;

    #[test]
    fn test_compiled_file_feeds_the_formatter() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        fs::create_dir_all(raw.join("notes")).unwrap();
        fs::write(raw.join("notes/note_1.json"), r#"{"title":"Standup","content":"Ship it"}"#).unwrap();
        fs::write(raw.join("notes/note_1_response.json"), r#"{"data":["Standup decided to ship."]}"#).unwrap();

        let out = dir.path().join("processed/data.json");
        let report = CompileUseCase::new(CompileConfig { raw_dir: raw, out_path: out.clone() })
            .execute()
            .unwrap();
        assert_eq!(report.examples.len(), 1);

        let examples = JsonExampleLoader::new(&out).load_all().unwrap();
        let corpus = Formatter::default().build_corpus(&examples).unwrap();
        let text = corpus.get(0).unwrap().text();
        assert!(text.starts_with("<start_of_turn>user\nExtract meaningful"));
        assert!(text.contains("Note Information:\nTitle: Standup\nContent: Ship it<end_of_turn>\n"));
        assert!(text.ends_with("<start_of_turn>model\nStandup decided to ship.<end_of_turn>"));
    }
}
