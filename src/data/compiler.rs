// ============================================================
// Layer 4 — Record Compiler
// ============================================================
// Compiles the raw CRM export into the training data file.
//
//   raw/
//     entities/entity_1.json   entity_1_response.json
//     threads/thread_1.json    thread_1_response.json
//     notes/  events/  orgs/   (same pattern)
//        │
//        ▼   for each kind, in numeric file order:
//   record + response ──→ TrainingExample {
//                            instruction: kind's fixed instruction
//                            input:       rendered, normalised record
//                            output:      response lines joined by \n
//                          }
//        │
//        ▼
//   processed/unsloth_training_data.json  (pretty JSON array)
//
// A record without a response file is not a training pair and is
// ignored. A pair that cannot be read or parsed is skipped with a
// warning; it never aborts the whole compile. A missing kind
// folder simply contributes nothing.
//
// Reference: Rust Book §12 (I/O), serde_json documentation

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::data::preprocessor::Preprocessor;
use crate::domain::example::TrainingExample;
use crate::domain::record::{
    RawEntity, RawEvent, RawNote, RawOrg, RawRecord, RawThread, RecordKind, ResponseData,
};
use crate::domain::traits::ExampleSource;

/// Per-kind outcome of one compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindCount {
    pub kind:     RecordKind,
    pub compiled: usize,
    pub skipped:  usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileReport {
    pub examples:  Vec<TrainingExample>,
    pub breakdown: Vec<KindCount>,
}

impl CompileReport {
    pub fn skipped(&self) -> usize {
        self.breakdown.iter().map(|k| k.skipped).sum()
    }
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total training examples: {}", self.examples.len())?;
        writeln!(f, "Breakdown:")?;
        for count in &self.breakdown {
            write!(f, "  {}: {}", count.kind, count.compiled)?;
            if count.skipped > 0 {
                write!(f, " ({} skipped)", count.skipped)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub struct RecordCompiler {
    raw_root:     PathBuf,
    preprocessor: Preprocessor,
}

impl RecordCompiler {
    pub fn new(raw_root: impl Into<PathBuf>) -> Self {
        Self { raw_root: raw_root.into(), preprocessor: Preprocessor::new() }
    }

    pub fn compile(&self) -> Result<CompileReport> {
        anyhow::ensure!(
            self.raw_root.is_dir(),
            "raw export directory '{}' does not exist",
            self.raw_root.display()
        );

        let mut examples  = Vec::new();
        let mut breakdown = Vec::with_capacity(RecordKind::ALL.len());

        for kind in RecordKind::ALL {
            let folder = self.raw_root.join(kind.folder());
            let mut count = KindCount { kind, compiled: 0, skipped: 0 };

            for number in numbered_records(&folder, kind.file_prefix()) {
                let record_path   = folder.join(format!("{}_{number}.json", kind.file_prefix()));
                let response_path = folder.join(format!("{}_{number}_response.json", kind.file_prefix()));
                if !response_path.is_file() {
                    continue;
                }

                match self.compile_pair(kind, &record_path, &response_path) {
                    Ok(example) => {
                        examples.push(example);
                        count.compiled += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping '{}': {:#}", record_path.display(), e);
                        count.skipped += 1;
                    }
                }
            }

            tracing::info!("{}: {} compiled, {} skipped", kind, count.compiled, count.skipped);
            breakdown.push(count);
        }

        Ok(CompileReport { examples, breakdown })
    }

    fn compile_pair(&self, kind: RecordKind, record_path: &Path, response_path: &Path) -> Result<TrainingExample> {
        let input = match kind {
            RecordKind::Entity       => read_json::<RawEntity>(record_path)?.render_input(),
            RecordKind::Thread       => read_json::<RawThread>(record_path)?.render_input(),
            RecordKind::Note         => read_json::<RawNote>(record_path)?.render_input(),
            RecordKind::Event        => read_json::<RawEvent>(record_path)?.render_input(),
            RecordKind::Organization => read_json::<RawOrg>(record_path)?.render_input(),
        };
        let response: ResponseData = read_json(response_path)?;

        Ok(TrainingExample::new(
            kind.instruction(),
            self.preprocessor.normalize(&input),
            response.to_output(),
        ))
    }
}

impl ExampleSource for RecordCompiler {
    fn load_all(&self) -> Result<Vec<TrainingExample>> {
        Ok(self.compile()?.examples)
    }

    fn describe(&self) -> String {
        format!("raw export '{}'", self.raw_root.display())
    }
}

/// Write examples as a pretty-printed JSON array, creating parent directories.
pub fn write_training_file(path: &Path, examples: &[TrainingExample]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(examples)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::info!("Wrote {} examples to '{}'", examples.len(), path.display());
    Ok(())
}

/// `<prefix>_<n>.json` numbers in `folder`, ascending. Response
/// files and anything else are ignored; a missing folder is empty.
fn numbered_records(folder: &Path, prefix: &str) -> Vec<u64> {
    let Ok(entries) = fs::read_dir(folder) else {
        return Vec::new();
    };

    let mut numbers: Vec<u64> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let stem = name.to_str()?.strip_suffix(".json")?;
            let digits = stem.strip_prefix(prefix)?.strip_prefix('_')?;
            digits.parse::<u64>().ok()
        })
        .collect();
    numbers.sort_unstable();
    numbers
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn put(dir: &Path, rel: &str, value: serde_json::Value) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, value.to_string()).unwrap();
    }

    fn response(lines: &[&str]) -> serde_json::Value {
        json!({ "data": lines })
    }

    #[test]
    fn test_compiles_pairs_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        put(root, "entities/entity_10.json", json!({ "name": "Zed" }));
        put(root, "entities/entity_10_response.json", response(&["Zed exists."]));
        put(root, "entities/entity_2.json", json!({ "name": "Amy", "location": "Boston" }));
        put(root, "entities/entity_2_response.json", response(&["Amy is in Boston.", "Amy exists."]));

        let report = RecordCompiler::new(root).compile().unwrap();
        assert_eq!(report.examples.len(), 2);

        let first = &report.examples[0];
        assert_eq!(first.input.as_deref(), Some("Entity Information:\nName: Amy\nLocation: Boston"));
        assert_eq!(first.output.as_deref(), Some("Amy is in Boston.\nAmy exists."));
        assert_eq!(first.instruction, Some(RecordKind::Entity.instruction()));
        assert_eq!(report.examples[1].input.as_deref(), Some("Entity Information:\nName: Zed"));
    }

    #[test]
    fn test_records_without_response_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "notes/note_1.json", json!({ "title": "Standup" }));

        let report = RecordCompiler::new(dir.path()).compile().unwrap();
        assert!(report.examples.is_empty());
        assert_eq!(report.skipped(), 0);
    }

    #[test]
    fn test_broken_pair_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        put(root, "orgs/org_1.json", json!({ "name": "Acme", "type": "Vendor" }));
        put(root, "orgs/org_1_response.json", response(&["Acme is a vendor."]));
        fs::write(root.join("orgs/org_2.json"), "{ not json").unwrap();
        put(root, "orgs/org_2_response.json", response(&["x"]));

        let report = RecordCompiler::new(root).compile().unwrap();
        assert_eq!(report.examples.len(), 1);

        let orgs = report.breakdown.iter().find(|k| k.kind == RecordKind::Organization).unwrap();
        assert_eq!((orgs.compiled, orgs.skipped), (1, 1));
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn test_kinds_are_compiled_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        put(root, "events/event_1.json", json!({ "title": "Launch" }));
        put(root, "events/event_1_response.json", response(&["Launch happened."]));
        put(root, "threads/thread_1.json", json!({ "subject": "Hello", "content": { "emails": { "body": "Hi\tthere" } } }));
        put(root, "threads/thread_1_response.json", response(&["Hello was sent."]));

        let report = RecordCompiler::new(root).compile().unwrap();
        assert_eq!(report.examples.len(), 2);
        assert_eq!(
            report.examples[0].input.as_deref(),
            Some("Email Thread Information:\nSubject: Hello\nContent: Hi there")
        );
        assert!(report.examples[1].input.as_deref().unwrap().starts_with("Event Information:"));
        assert_eq!(report.breakdown.len(), 5);
    }

    #[test]
    fn test_numbered_records_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["entity_3.json", "entity_3_response.json", "entity_x.json", "entity_1.json", "notes.txt"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        assert_eq!(numbered_records(dir.path(), "entity"), vec![1, 3]);
        assert!(numbered_records(&dir.path().join("missing"), "entity").is_empty());
    }

    #[test]
    fn test_written_file_loads_back() {
        use crate::data::loader::JsonExampleLoader;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed").join("data.json");
        let examples = vec![TrainingExample::new("i", "x", "o")];
        write_training_file(&path, &examples).unwrap();

        assert!(fs::read_to_string(&path).unwrap().contains("\n  {"));
        assert_eq!(JsonExampleLoader::new(&path).load_all().unwrap(), examples);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        assert!(RecordCompiler::new("does/not/exist").compile().is_err());
    }
}
