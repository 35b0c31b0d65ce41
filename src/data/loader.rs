// ============================================================
// Layer 4 — Training Data Loader
// ============================================================
// Reads the training data file produced by `propfit compile`
// (or written by hand) into TrainingExample records.
//
// Two layouts are accepted:
//
//   Row-wise (what `compile` writes):
//     [ {"instruction": "...", "input": "...", "output": "..."}, ... ]
//
//   Column-wise (dataset-library style):
//     { "instruction": ["...", ...],
//       "input":       ["...", ...],
//       "output":      ["...", ...] }
//
// Column-wise data is zipped strictly: if the three columns do
// not have the same length the file is rejected, never silently
// truncated to the shortest column.
//
// Null or missing fields are kept as None so that the formatter
// can report them with the example index.
//
// Reference: serde_json documentation (Value, from_value)
//            Rust Book §9 (Error Handling)

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::error::DatasetError;
use crate::domain::example::TrainingExample;
use crate::domain::traits::ExampleSource;

/// Loads training examples from one JSON file.
/// Implements the ExampleSource trait from Layer 3.
pub struct JsonExampleLoader {
    path: PathBuf,
}

impl JsonExampleLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExampleSource for JsonExampleLoader {
    fn load_all(&self) -> Result<Vec<TrainingExample>> {
        let text = fs::read_to_string(&self.path).map_err(|source| DatasetError::Read {
            path: self.path.clone(),
            source,
        })?;

        let examples = parse_examples(&self.path, &text)?;
        tracing::info!(
            "Loaded {} training examples from '{}'",
            examples.len(),
            self.path.display()
        );
        Ok(examples)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Column-wise layout. Each column may hold nulls.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExampleColumns {
    instruction: Vec<Option<String>>,
    input:       Vec<Option<String>>,
    output:      Vec<Option<String>>,
}

/// Parse the contents of a training data file.
/// `path` is only used for error messages.
pub fn parse_examples(path: &Path, text: &str) -> Result<Vec<TrainingExample>, DatasetError> {
    let value: Value = serde_json::from_str(text).map_err(|source| DatasetError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        // ── Row-wise: parse record by record so errors carry an index ────────
        Value::Array(rows) => rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                serde_json::from_value::<TrainingExample>(row).map_err(|source| {
                    DatasetError::InvalidRecord {
                        path: path.to_path_buf(),
                        index,
                        source,
                    }
                })
            })
            .collect(),

        // ── Column-wise: strict zip ───────────────────────────────────────────
        Value::Object(_) => {
            let columns: ExampleColumns =
                serde_json::from_value(value).map_err(|source| DatasetError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            zip_columns(columns)
        }

        _ => Err(DatasetError::UnexpectedShape { path: path.to_path_buf() }),
    }
}

fn zip_columns(columns: ExampleColumns) -> Result<Vec<TrainingExample>, DatasetError> {
    let ExampleColumns { instruction, input, output } = columns;

    if instruction.len() != input.len() || input.len() != output.len() {
        return Err(DatasetError::ColumnLengthMismatch {
            instruction: instruction.len(),
            input:       input.len(),
            output:      output.len(),
        });
    }

    Ok(instruction
        .into_iter()
        .zip(input)
        .zip(output)
        .map(|((instruction, input), output)| TrainingExample { instruction, input, output })
        .collect())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(text: &str) -> Result<Vec<TrainingExample>, DatasetError> {
        parse_examples(Path::new("data.json"), text)
    }

    #[test]
    fn test_row_wise_file() {
        let examples = parse(
            r#"[{"instruction":"i1","input":"x1","output":"o1"},
                {"instruction":"i2","input":"x2","output":"o2"}]"#,
        )
        .unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1], TrainingExample::new("i2", "x2", "o2"));
    }

    #[test]
    fn test_column_wise_file() {
        let examples = parse(
            r#"{"instruction":["i1","i2"],"input":["x1","x2"],"output":["o1",null]}"#,
        )
        .unwrap();
        assert_eq!(examples[0], TrainingExample::new("i1", "x1", "o1"));
        assert_eq!(examples[1].output, None);
    }

    #[test]
    fn test_column_length_mismatch_is_fatal() {
        let err = parse(r#"{"instruction":["i1","i2"],"input":["x1","x2"],"output":["o1"]}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            DatasetError::ColumnLengthMismatch { instruction: 2, input: 2, output: 1 }
        ));
    }

    #[test]
    fn test_missing_field_survives_loading() {
        let examples = parse(r#"[{"instruction":"i","output":"o"}]"#).unwrap();
        assert_eq!(examples[0].input, None);
    }

    #[test]
    fn test_invalid_record_reports_index() {
        let err = parse(r#"[{"instruction":"i","input":"x","output":"o"},{"instruction":5}]"#)
            .unwrap_err();
        assert!(matches!(err, DatasetError::InvalidRecord { index: 1, .. }));
    }

    #[test]
    fn test_malformed_json_and_wrong_shape() {
        assert!(matches!(parse("[{"), Err(DatasetError::Parse { .. })));
        assert!(matches!(parse("42"), Err(DatasetError::UnexpectedShape { .. })));
    }

    #[test]
    fn test_load_all_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"instruction":"i","input":"x","output":"o"}}]"#).unwrap();

        let loader = JsonExampleLoader::new(file.path());
        let examples = loader.load_all().unwrap();
        assert_eq!(examples, vec![TrainingExample::new("i", "x", "o")]);
    }

    #[test]
    fn test_missing_file_is_a_dataset_error() {
        let loader = JsonExampleLoader::new("/nonexistent/propfit/data.json");
        let err = loader.load_all().unwrap_err();
        assert!(matches!(err.downcast_ref::<DatasetError>(), Some(DatasetError::Read { .. })));
    }
}
