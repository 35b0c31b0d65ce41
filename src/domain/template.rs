// ============================================================
// Layer 3 — Chat Template
// ============================================================
// The conversational framing shared by training and probing.
//
// A formatted training example looks like this (Gemma turn
// delimiters, byte for byte):
//
//   <start_of_turn>user\n
//   {instruction}\n
//   \n
//   {input}<end_of_turn>\n
//   <start_of_turn>model\n
//   {output}<end_of_turn>
//
// The probe prompt is the same text cut off right after the
// model-turn header, so the model continues with the output.
//
// The template is four delimiter strings and nothing else.
// Rendering is a pure function of those four strings and the
// example text: no validation, no escaping.
//
// Reference: Gemma prompt format (turn-based chat template)
//            Rust Book §5 (Method Syntax)

use serde::{Deserialize, Serialize};

/// The four delimiters that frame a user turn and a model turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTemplate {
    /// Opens a turn, e.g. `<start_of_turn>`
    pub turn_start: String,
    /// Closes a turn, e.g. `<end_of_turn>`
    pub turn_end: String,
    /// Role marker written right after `turn_start` for the user
    pub user_role: String,
    /// Role marker written right after `turn_start` for the model
    pub model_role: String,
}

impl ChatTemplate {
    pub fn new(
        turn_start: impl Into<String>,
        turn_end:   impl Into<String>,
        user_role:  impl Into<String>,
        model_role: impl Into<String>,
    ) -> Self {
        Self {
            turn_start: turn_start.into(),
            turn_end:   turn_end.into(),
            user_role:  user_role.into(),
            model_role: model_role.into(),
        }
    }

    /// Delimiters of the Gemma instruction-tuned family.
    pub fn gemma() -> Self {
        Self::new("<start_of_turn>", "<end_of_turn>", "user", "model")
    }

    /// Header that opens the model turn: `<start_of_turn>model\n`.
    pub fn model_turn_header(&self) -> String {
        format!("{}{}\n", self.turn_start, self.model_role)
    }

    /// Render a complete training example (user turn + closed model turn).
    pub fn render(&self, instruction: &str, input: &str, output: &str) -> String {
        let mut text = self.render_prompt(instruction, input);
        text.push_str(output);
        text.push_str(&self.turn_end);
        text
    }

    /// Render the user turn and leave the model turn open for generation.
    pub fn render_prompt(&self, instruction: &str, input: &str) -> String {
        format!(
            "{start}{user}\n{instruction}\n\n{input}{end}\n{header}",
            start  = self.turn_start,
            user   = self.user_role,
            end    = self.turn_end,
            header = self.model_turn_header(),
        )
    }

    /// Pull the model's answer out of a decoded generation.
    ///
    /// Takes the text after the LAST model-turn header, cuts it at the
    /// first turn-end marker and trims whitespace. A generation that ran
    /// out of budget before closing its turn is returned as-is (trimmed).
    pub fn extract_response(&self, decoded: &str) -> String {
        let header = self.model_turn_header();

        // rsplit always yields at least one item: the whole string
        // when the header is absent
        let after_header = decoded.rsplit(header.as_str()).next().unwrap_or(decoded);

        let answer = after_header
            .split(self.turn_end.as_str())
            .next()
            .unwrap_or(after_header);

        answer.trim().to_string()
    }
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self::gemma()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_byte_exact() {
        let t = ChatTemplate::gemma();
        assert_eq!(
            t.render("I", "X", "O"),
            "<start_of_turn>user\nI\n\nX<end_of_turn>\n<start_of_turn>model\nO<end_of_turn>"
        );
    }

    #[test]
    fn test_prompt_leaves_model_turn_open() {
        let t = ChatTemplate::gemma();
        assert_eq!(
            t.render_prompt("I", "X"),
            "<start_of_turn>user\nI\n\nX<end_of_turn>\n<start_of_turn>model\n"
        );
    }

    #[test]
    fn test_custom_delimiters_are_used_verbatim() {
        let t = ChatTemplate::new("[S]", "[E]", "human", "bot");
        assert_eq!(t.render("a", "b", "c"), "[S]human\na\n\nb[E]\n[S]bot\nc[E]");
    }

    #[test]
    fn test_no_escaping_of_free_text() {
        // Delimiter-looking text inside a field is passed through untouched
        let t = ChatTemplate::gemma();
        let out = t.render("say <end_of_turn>", "", "");
        assert!(out.starts_with("<start_of_turn>user\nsay <end_of_turn>\n\n"));
    }

    #[test]
    fn test_extract_response_from_full_generation() {
        let t = ChatTemplate::gemma();
        let decoded = "<bos><start_of_turn>user\nI\n\nX<end_of_turn>\n\
                       <start_of_turn>model\n  John Smith works at AI Corp.\n<end_of_turn>\n<eos>";
        assert_eq!(t.extract_response(decoded), "John Smith works at AI Corp.");
    }

    #[test]
    fn test_extract_response_without_turn_end() {
        // Generation budget ran out before the model closed its turn
        let t = ChatTemplate::gemma();
        let decoded = "<start_of_turn>user\nI\n\nX<end_of_turn>\n<start_of_turn>model\nJohn Smith is";
        assert_eq!(t.extract_response(decoded), "John Smith is");
    }

    #[test]
    fn test_extract_response_uses_last_model_header() {
        let t = ChatTemplate::gemma();
        let decoded = "<start_of_turn>model\nfirst<end_of_turn>\n<start_of_turn>model\nsecond<end_of_turn>";
        assert_eq!(t.extract_response(decoded), "second");
    }

    #[test]
    fn test_extract_response_without_header_returns_trimmed_text() {
        let t = ChatTemplate::gemma();
        assert_eq!(t.extract_response("  plain text<end_of_turn>tail"), "plain text");
    }
}
