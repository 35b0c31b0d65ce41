// ============================================================
// Layer 4 — Data Formatter
// ============================================================
// Turns instruction / input / output triples into the single
// chat-formatted text blocks the causal LM is trained on.
//
//   TrainingExample ─┐
//                    ├─ ChatTemplate::render ─→ FormattedExample
//   ChatTemplate  ───┘
//
// Contract:
//   - one formatted example per input example, same order
//   - every field must be present; the first absent field
//     fails the whole call with MalformedExampleError and
//     no partial corpus is produced
//   - the text itself is never inspected or altered
//
// Reference: Rust Book §13 (Iterators), collecting into Result

use crate::domain::error::MalformedExampleError;
use crate::domain::example::{Corpus, FormattedExample, TrainingExample};
use crate::domain::template::ChatTemplate;

pub struct Formatter {
    template: ChatTemplate,
}

impl Formatter {
    pub fn new(template: ChatTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &ChatTemplate {
        &self.template
    }

    /// Format every example, failing on the first malformed one.
    pub fn format(
        &self,
        examples: &[TrainingExample],
    ) -> Result<Vec<FormattedExample>, MalformedExampleError> {
        // collect() into Result stops at the first Err
        examples
            .iter()
            .enumerate()
            .map(|(index, example)| {
                let (instruction, input, output) = example.fields(index)?;
                Ok(FormattedExample::new(self.template.render(instruction, input, output)))
            })
            .collect()
    }

    /// Format every example into the training corpus.
    pub fn build_corpus(&self, examples: &[TrainingExample]) -> Result<Corpus, MalformedExampleError> {
        let formatted = self.format(examples)?;
        tracing::info!("Built corpus of {} formatted examples", formatted.len());
        Ok(Corpus::new(formatted))
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(ChatTemplate::gemma())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::ExampleField;

    #[test]
    fn test_delimiter_exactness() {
        let f = Formatter::default();
        let out = f.format(&[TrainingExample::new("I", "X", "O")]).unwrap();
        assert_eq!(
            out[0].text(),
            "<start_of_turn>user\nI\n\nX<end_of_turn>\n<start_of_turn>model\nO<end_of_turn>"
        );
    }

    #[test]
    fn test_shape_and_order_preserved() {
        let f = Formatter::default();
        let examples: Vec<_> = (0..5)
            .map(|i| TrainingExample::new(format!("i{i}"), format!("x{i}"), format!("o{i}")))
            .collect();

        let corpus = f.build_corpus(&examples).unwrap();
        assert_eq!(corpus.len(), 5);
        for (i, formatted) in corpus.iter().enumerate() {
            assert!(formatted.text().contains(&format!("\ni{i}\n\nx{i}<end_of_turn>")));
            assert!(formatted.text().ends_with(&format!("o{i}<end_of_turn>")));
        }
    }

    #[test]
    fn test_missing_field_fails_without_partial_output() {
        let f = Formatter::default();
        let examples = vec![
            TrainingExample::new("i0", "x0", "o0"),
            TrainingExample { output: None, ..TrainingExample::new("i1", "x1", "") },
            TrainingExample::new("i2", "x2", "o2"),
        ];

        let err = f.build_corpus(&examples).unwrap_err();
        assert_eq!(err, MalformedExampleError { index: 1, field: ExampleField::Output });
    }

    #[test]
    fn test_empty_strings_are_present_fields() {
        let f = Formatter::default();
        let out = f.format(&[TrainingExample::new("", "", "")]).unwrap();
        assert_eq!(
            out[0].text(),
            "<start_of_turn>user\n\n\n<end_of_turn>\n<start_of_turn>model\n<end_of_turn>"
        );
    }

    #[test]
    fn test_empty_input_gives_empty_corpus() {
        let corpus = Formatter::default().build_corpus(&[]).unwrap();
        assert!(corpus.is_empty());
    }
}
