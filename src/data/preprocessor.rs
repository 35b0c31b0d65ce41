// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Normalises rendered record text before it becomes the `input`
// of a training example.
//
// Exported CRM records are pasted from mail clients, web forms
// and office documents. They carry:
//   - Non-breaking and zero-width spaces
//   - Byte order marks in the middle of text
//   - Windows line endings (\r\n)
//   - Tabs and runs of spaces from indentation
//   - Stray control characters
//
// The model sees every byte, so these would be learned as if
// they meant something.
//
// Normalisation steps (applied in order):
//   1. \r\n and lone \r become \n
//   2. Unicode space variants and tabs become a plain space
//   3. Zero-width characters and BOMs are dropped
//   4. Other control characters become a space
//   5. Runs of spaces collapse to one, trailing spaces go
//   6. At most one blank line in a row
//
// Leading spaces of a line are kept as a single space: indented
// quoted replies stay visibly indented.
//
// Reference: Rust Book §8 (Strings in Rust)
//            Rust Book §13 (Iterators)

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, text: &str) -> String {
        // ── Step 1–4: Character level ────────────────────────────────────────
        let unified = text.replace("\r\n", "\n");
        let chars: String = unified
            .chars()
            .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}'))
            .map(|c| match c {
                '\r' => '\n',
                '\t' | '\u{00A0}' | '\u{2007}' | '\u{202F}' => ' ',
                c if c.is_control() && c != '\n' => ' ',
                c => c,
            })
            .collect();

        // ── Step 5: Line level ───────────────────────────────────────────────
        let lines: Vec<String> = chars
            .split('\n')
            .map(|line| {
                let mut out = String::with_capacity(line.len());
                let mut last_space = false;
                for c in line.chars() {
                    if c == ' ' {
                        if !last_space {
                            out.push(' ');
                        }
                        last_space = true;
                    } else {
                        out.push(c);
                        last_space = false;
                    }
                }
                out.trim_end().to_string()
            })
            .collect();

        // ── Step 6: Blank lines ──────────────────────────────────────────────
        let mut result = Vec::with_capacity(lines.len());
        let mut blank_run = 0usize;
        for line in lines {
            if line.is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            result.push(line);
        }

        result.join("\n").trim().to_string()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
