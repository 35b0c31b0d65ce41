// ============================================================
// Layer 3 — Training Example Domain Types
// ============================================================
// Three types flow through the data side of the pipeline:
//
//   TrainingExample  → one instruction / input / output record,
//                      exactly as read from the training file
//   FormattedExample → the same record rendered into a single
//                      chat-formatted string
//   Corpus           → the ordered collection of formatted
//                      examples handed to the training loop
//
// The record fields are Option<String>: a null or missing field
// must survive loading so the formatter can report WHICH example
// and WHICH field is bad.
//
// Reference: Rust Book §5 (Structs), §6 (Enums and Option)

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::MalformedExampleError;

// ─── ExampleField ─────────────────────────────────────────────────────────────
/// Names one of the three fields of a training example.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExampleField {
    Instruction,
    Input,
    Output,
}

impl fmt::Display for ExampleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExampleField::Instruction => "instruction",
            ExampleField::Input       => "input",
            ExampleField::Output      => "output",
        };
        f.write_str(name)
    }
}

// ─── TrainingExample ──────────────────────────────────────────────────────────
/// One supervised record: what to do, what to do it on, the expected answer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingExample {
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

impl TrainingExample {
    /// Build a complete example (all three fields present).
    pub fn new(
        instruction: impl Into<String>,
        input:       impl Into<String>,
        output:      impl Into<String>,
    ) -> Self {
        Self {
            instruction: Some(instruction.into()),
            input:       Some(input.into()),
            output:      Some(output.into()),
        }
    }

    /// Borrow the three fields, failing on the first absent one.
    /// `index` is the example's position in its source and only
    /// used for the error report.
    pub fn fields(&self, index: usize) -> Result<(&str, &str, &str), MalformedExampleError> {
        let missing = |field| MalformedExampleError { index, field };

        let instruction = self.instruction.as_deref().ok_or_else(|| missing(ExampleField::Instruction))?;
        let input       = self.input.as_deref().ok_or_else(|| missing(ExampleField::Input))?;
        let output      = self.output.as_deref().ok_or_else(|| missing(ExampleField::Output))?;

        Ok((instruction, input, output))
    }
}

// ─── FormattedExample ─────────────────────────────────────────────────────────
/// A training example rendered into one chat-formatted text block.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedExample {
    text: String,
}

impl FormattedExample {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

// ─── Corpus ───────────────────────────────────────────────────────────────────
/// Ordered, immutable collection of formatted examples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    examples: Vec<FormattedExample>,
}

impl Corpus {
    pub fn new(examples: Vec<FormattedExample>) -> Self {
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FormattedExample> {
        self.examples.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormattedExample> {
        self.examples.iter()
    }
}
