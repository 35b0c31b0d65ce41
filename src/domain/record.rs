// ============================================================
// Layer 3 — Raw Exported Records
// ============================================================
// The CRM export that training data is compiled from holds five
// kinds of record, one JSON file each, next to a response file
// with the target propositions:
//
//   raw/entities/entity_12.json          ← the record
//   raw/entities/entity_12_response.json ← {"data": ["...", ...]}
//
// Each kind knows:
//   - which folder and file prefix it lives under
//   - the fixed extraction instruction used for it
//   - how to render itself into the `input` text block
//
// Rendering writes a header line, the mandatory name/title line,
// then one "Label: value" line per optional field that is
// present and non-blank. Absent fields produce no line at all.
//
// Export files carry many more fields than are rendered here;
// unknown fields are ignored when deserialising.
//
// Reference: Rust Book §6 (Enums), §10 (Traits)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ─── RecordKind ───────────────────────────────────────────────────────────────
/// The five kinds of exported record, in compilation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Entity,
    Thread,
    Note,
    Event,
    Organization,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Entity,
        RecordKind::Thread,
        RecordKind::Note,
        RecordKind::Event,
        RecordKind::Organization,
    ];

    /// Sub-folder of the raw export root
    pub fn folder(self) -> &'static str {
        match self {
            RecordKind::Entity       => "entities",
            RecordKind::Thread       => "threads",
            RecordKind::Note         => "notes",
            RecordKind::Event        => "events",
            RecordKind::Organization => "orgs",
        }
    }

    /// File name prefix: `<prefix>_<n>.json`
    pub fn file_prefix(self) -> &'static str {
        match self {
            RecordKind::Entity       => "entity",
            RecordKind::Thread       => "thread",
            RecordKind::Note         => "note",
            RecordKind::Event        => "event",
            RecordKind::Organization => "org",
        }
    }

    /// Noun used in the instruction ("from this {noun} data")
    fn data_noun(self) -> &'static str {
        match self {
            RecordKind::Entity       => "entity",
            RecordKind::Thread       => "email thread",
            RecordKind::Note         => "note",
            RecordKind::Event        => "event",
            RecordKind::Organization => "organization",
        }
    }

    /// What every proposition has to mention
    fn anchor(self) -> &'static str {
        match self {
            RecordKind::Entity       => "the person's name",
            RecordKind::Thread       => "the thread subject",
            RecordKind::Note         => "the note title",
            RecordKind::Event        => "the event title",
            RecordKind::Organization => "the organization name",
        }
    }

    /// The fixed extraction instruction for this kind of record.
    pub fn instruction(self) -> String {
        format!(
            "Extract meaningful, de-contextualized propositions from this {} data. \
             Focus only on the semantic meaning and business context. \
             Use full nouns, never pronouns. \
             Every proposition must include {}.",
            self.data_noun(),
            self.anchor(),
        )
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordKind::Entity       => "Entities",
            RecordKind::Thread       => "Threads",
            RecordKind::Note         => "Notes",
            RecordKind::Event        => "Events",
            RecordKind::Organization => "Organizations",
        };
        f.write_str(label)
    }
}

// ─── RawRecord ────────────────────────────────────────────────────────────────
/// A raw exported record that can be rendered into an `input` block.
pub trait RawRecord {
    fn render_input(&self) -> String;
}

/// Target propositions stored next to each record.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseData {
    pub data: Vec<String>,
}

impl ResponseData {
    /// The training `output`: one proposition per line
    pub fn to_output(&self) -> String {
        self.data.join("\n")
    }
}

// ─── Record types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RawEntity {
    pub name:         String,
    pub summary:      Option<String>,
    pub long_summary: Option<String>,
    pub research:     Option<String>,
    pub location:     Option<String>,
    pub state:        Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawThread {
    pub subject: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub summary: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNote {
    pub title:   String,
    pub content: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub title:   String,
    pub content: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrg {
    pub name:        String,
    pub description: Option<String>,
    pub industry:    Option<String>,
    pub location:    Option<String>,
    #[serde(rename = "type")]
    pub org_type:    Option<String>,
}

/// Builds a rendered block line by line, skipping blank optional fields.
struct Block(String);

impl Block {
    fn new(header: &str, label: &str, value: &str) -> Self {
        Self(format!("{header}\n{label}: {value}"))
    }

    fn field(mut self, label: &str, value: Option<&str>) -> Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.0.push('\n');
            self.0.push_str(label);
            self.0.push_str(": ");
            self.0.push_str(value);
        }
        self
    }

    fn finish(self) -> String {
        self.0.trim().to_string()
    }
}

impl RawRecord for RawEntity {
    fn render_input(&self) -> String {
        Block::new("Entity Information:", "Name", &self.name)
            .field("Summary", self.summary.as_deref())
            .field("Long Summary", self.long_summary.as_deref())
            .field("Research", self.research.as_deref())
            .field("Location", self.location.as_deref())
            .field("State", self.state.as_deref())
            .field("Country", self.country_code.as_deref())
            .finish()
    }
}

impl RawThread {
    /// Email bodies joined by newlines. `content.emails` is either a
    /// list of emails or a single email object.
    pub fn email_content(&self) -> String {
        let body = |email: &Value| {
            email.get("body").and_then(Value::as_str).unwrap_or_default().to_string()
        };

        match self.content.get("emails") {
            Some(Value::Array(emails)) => emails.iter().map(body).collect::<Vec<_>>().join("\n"),
            Some(email @ Value::Object(_)) => body(email),
            _ => String::new(),
        }
    }

    /// The thread summary as compact JSON, if it carries anything.
    pub fn summary_json(&self) -> Option<String> {
        let empty = match &self.summary {
            Value::Null          => true,
            Value::Object(map)   => map.is_empty(),
            Value::Array(items)  => items.is_empty(),
            Value::String(text)  => text.is_empty(),
            _                    => false,
        };
        if empty {
            None
        } else {
            serde_json::to_string(&self.summary).ok()
        }
    }
}

impl RawRecord for RawThread {
    fn render_input(&self) -> String {
        let content = self.email_content();
        let summary = self.summary_json();
        Block::new("Email Thread Information:", "Subject", &self.subject)
            .field("Content", Some(content.as_str()))
            .field("Summary", summary.as_deref())
            .finish()
    }
}

impl RawRecord for RawNote {
    fn render_input(&self) -> String {
        Block::new("Note Information:", "Title", &self.title)
            .field("Content", self.content.as_deref())
            .field("Summary", self.summary.as_deref())
            .finish()
    }
}

impl RawRecord for RawEvent {
    fn render_input(&self) -> String {
        Block::new("Event Information:", "Title", &self.title)
            .field("Content", self.content.as_deref())
            .field("Summary", self.summary.as_deref())
            .finish()
    }
}

impl RawRecord for RawOrg {
    fn render_input(&self) -> String {
        Block::new("Organization Information:", "Name", &self.name)
            .field("Description", self.description.as_deref())
            .field("Industry", self.industry.as_deref())
            .field("Location", self.location.as_deref())
            .field("Type", self.org_type.as_deref())
            .finish()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_renders_only_present_fields() {
        let entity: RawEntity = serde_json::from_value(json!({
            "id": "e1",
            "name": "John Smith",
            "summary": "Senior Data Scientist at AI Corp",
            "research": "",
            "location": "Boston, MA",
            "org_id": "o1"
        }))
        .unwrap();

        assert_eq!(
            entity.render_input(),
            "Entity Information:\nName: John Smith\n\
             Summary: Senior Data Scientist at AI Corp\nLocation: Boston, MA"
        );
    }

    #[test]
    fn test_thread_joins_email_bodies_and_summary() {
        let thread: RawThread = serde_json::from_value(json!({
            "subject": "Q3 budget",
            "content": { "emails": [ { "body": "First" }, { "body": "Second" }, {} ] },
            "summary": { "topic": "budget" }
        }))
        .unwrap();

        assert_eq!(thread.email_content(), "First\nSecond\n");
        assert_eq!(
            thread.render_input(),
            "Email Thread Information:\nSubject: Q3 budget\nContent: First\nSecond\n\n\
             Summary: {\"topic\":\"budget\"}"
        );
    }

    #[test]
    fn test_thread_with_single_email_object_and_empty_summary() {
        let thread: RawThread = serde_json::from_value(json!({
            "subject": "Hello",
            "content": { "emails": { "body": "Only one" } },
            "summary": {}
        }))
        .unwrap();

        assert_eq!(thread.summary_json(), None);
        assert_eq!(
            thread.render_input(),
            "Email Thread Information:\nSubject: Hello\nContent: Only one"
        );
    }

    #[test]
    fn test_org_type_field_is_renamed() {
        let org: RawOrg = serde_json::from_value(json!({
            "name": "AI Corp", "industry": "Software", "type": "customer"
        }))
        .unwrap();
        assert_eq!(
            org.render_input(),
            "Organization Information:\nName: AI Corp\nIndustry: Software\nType: customer"
        );
    }

    #[test]
    fn test_instruction_is_kind_specific() {
        let text = RecordKind::Thread.instruction();
        assert!(text.starts_with(
            "Extract meaningful, de-contextualized propositions from this email thread data."
        ));
        assert!(text.ends_with("Every proposition must include the thread subject."));
        assert!(RecordKind::Entity.instruction().contains("Use full nouns, never pronouns."));
    }

    #[test]
    fn test_response_output_is_newline_joined() {
        let r = ResponseData { data: vec!["A is B.".into(), "C is D.".into()] };
        assert_eq!(r.to_output(), "A is B.\nC is D.");
    }
}
