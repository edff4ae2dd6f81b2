//! Typed entity records and their header decode/encode.
//!
//! Each kind declares its fields in file order. Decoding ignores unknown keys
//! and collects every missing or invalid field into one `ValidationError`.
//! `decode(encode(r)) == r` holds for every record that passes validation.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_yaml::Value;
use strum::{Display, EnumIter};

use super::error::ValidationError;
use super::frontmatter::Header;

/// Longest accepted title, in characters
pub const MAX_TITLE_CHARS: usize = 200;
/// Longest accepted free-text field (owner, story parts, descriptions)
pub const MAX_TEXT_CHARS: usize = 4000;
/// Name of the board-view bucket for tasks in undeclared columns; boards may
/// not declare it themselves
pub const FALLBACK_COLUMN: &str = "Unassigned";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Board,
    Task,
    Project,
    Epic,
}

/// A record stored as one vault file
pub trait Entity: Sized + Clone {
    const KIND: EntityKind;
    /// Header keys this kind owns, in file order
    const FIELDS: &'static [&'static str];

    fn id(&self) -> &str;
    fn title(&self) -> &str;
    fn decode(header: &Header, body: &str) -> Result<Self, ValidationError>;
    fn encode(&self) -> Header;

    /// Free text written after the header
    fn body(&self) -> &str {
        ""
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    pub id: String,
    pub title: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub board: String,
    pub column: String,
    pub tags: BTreeSet<String>,
    pub due: Option<String>,
    pub created: String,
    pub updated: Option<String>,
    pub project_id: Option<String>,
    pub epic_id: Option<String>,
    pub owner: Option<String>,
    pub as_a: Option<String>,
    pub i_want: Option<String>,
    pub so_that: Option<String>,
    pub acceptance_criteria: Vec<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Epic {
    pub id: String,
    pub title: String,
    pub project_id: Option<String>,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

impl Entity for Board {
    const KIND: EntityKind = EntityKind::Board;
    const FIELDS: &'static [&'static str] = &["id", "title", "columns"];

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn decode(header: &Header, _body: &str) -> Result<Self, ValidationError> {
        let mut r = FieldReader::new(header);
        let board = Board {
            id: r.required_text("id"),
            title: r.required_text("title"),
            columns: r.columns("columns"),
        };
        r.finish(board)
    }

    fn encode(&self) -> Header {
        let mut w = HeaderWriter::default();
        w.text("id", &self.id);
        w.text("title", &self.title);
        w.list("columns", &self.columns);
        w.into_header()
    }
}

impl Entity for Task {
    const KIND: EntityKind = EntityKind::Task;
    const FIELDS: &'static [&'static str] = &[
        "id",
        "title",
        "board",
        "column",
        "tags",
        "due",
        "created",
        "updated",
        "project_id",
        "epic_id",
        "owner",
        "as_a",
        "i_want",
        "so_that",
        "acceptance_criteria",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn decode(header: &Header, body: &str) -> Result<Self, ValidationError> {
        let mut r = FieldReader::new(header);
        let task = Task {
            id: r.required_text("id"),
            title: r.required_text("title"),
            board: r.required_text("board"),
            column: r.required_text("column"),
            tags: r.string_list("tags").unwrap_or_default().into_iter().collect(),
            due: r.optional_date("due"),
            created: r.required_date("created"),
            updated: r.optional_date("updated"),
            project_id: r.optional_text("project_id"),
            epic_id: r.optional_text("epic_id"),
            owner: r.optional_text("owner"),
            as_a: r.optional_text("as_a"),
            i_want: r.optional_text("i_want"),
            so_that: r.optional_text("so_that"),
            acceptance_criteria: r.string_list("acceptance_criteria").unwrap_or_default(),
            body: body.to_string(),
        };
        r.finish(task)
    }

    fn encode(&self) -> Header {
        let mut w = HeaderWriter::default();
        w.text("id", &self.id);
        w.text("title", &self.title);
        w.text("board", &self.board);
        w.text("column", &self.column);
        w.list("tags", self.tags.iter());
        w.opt("due", &self.due);
        w.text("created", &self.created);
        w.opt("updated", &self.updated);
        w.opt("project_id", &self.project_id);
        w.opt("epic_id", &self.epic_id);
        w.opt("owner", &self.owner);
        w.opt("as_a", &self.as_a);
        w.opt("i_want", &self.i_want);
        w.opt("so_that", &self.so_that);
        if !self.acceptance_criteria.is_empty() {
            w.list("acceptance_criteria", &self.acceptance_criteria);
        }
        w.into_header()
    }

    fn body(&self) -> &str {
        &self.body
    }
}

impl Entity for Project {
    const KIND: EntityKind = EntityKind::Project;
    const FIELDS: &'static [&'static str] =
        &["id", "title", "owner", "description", "created", "updated"];

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn decode(header: &Header, _body: &str) -> Result<Self, ValidationError> {
        let mut r = FieldReader::new(header);
        let project = Project {
            id: r.required_text("id"),
            title: r.required_text("title"),
            owner: r.optional_text("owner"),
            description: r.optional_text("description"),
            created: r.optional_date("created"),
            updated: r.optional_date("updated"),
        };
        r.finish(project)
    }

    fn encode(&self) -> Header {
        let mut w = HeaderWriter::default();
        w.text("id", &self.id);
        w.text("title", &self.title);
        w.opt("owner", &self.owner);
        w.opt("description", &self.description);
        w.opt("created", &self.created);
        w.opt("updated", &self.updated);
        w.into_header()
    }
}

impl Entity for Epic {
    const KIND: EntityKind = EntityKind::Epic;
    const FIELDS: &'static [&'static str] = &[
        "id",
        "title",
        "project_id",
        "owner",
        "description",
        "created",
        "updated",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn decode(header: &Header, _body: &str) -> Result<Self, ValidationError> {
        let mut r = FieldReader::new(header);
        let epic = Epic {
            id: r.required_text("id"),
            title: r.required_text("title"),
            project_id: r.optional_text("project_id"),
            owner: r.optional_text("owner"),
            description: r.optional_text("description"),
            created: r.optional_date("created"),
            updated: r.optional_date("updated"),
        };
        r.finish(epic)
    }

    fn encode(&self) -> Header {
        let mut w = HeaderWriter::default();
        w.text("id", &self.id);
        w.text("title", &self.title);
        w.opt("project_id", &self.project_id);
        w.opt("owner", &self.owner);
        w.opt("description", &self.description);
        w.opt("created", &self.created);
        w.opt("updated", &self.updated);
        w.into_header()
    }
}

// =====================================================
// Field decoding
// =====================================================

/// Reads typed fields out of a header, recording failures as it goes
struct FieldReader<'a> {
    header: &'a Header,
    errors: ValidationError,
}

impl<'a> FieldReader<'a> {
    fn new(header: &'a Header) -> Self {
        Self {
            header,
            errors: ValidationError::default(),
        }
    }

    /// Present and non-null value for `key`
    fn value(&self, key: &str) -> Option<&'a Value> {
        self.header.get(key).filter(|v| !v.is_null())
    }

    fn text(&mut self, key: &str) -> Option<String> {
        let value = self.value(key)?;
        match scalar_text(value) {
            Some(s) if s.trim().is_empty() => None,
            Some(s) => Some(s),
            None => {
                self.errors.invalid(key, "expected text");
                None
            }
        }
    }

    fn required_text(&mut self, key: &str) -> String {
        if self.value(key).is_none() {
            self.errors.missing(key);
            return String::new();
        }
        let invalid_before = self.errors.invalid_fields.len();
        match self.text(key) {
            Some(s) => s,
            None => {
                // blank counts as missing, a wrong type was already recorded
                if self.errors.invalid_fields.len() == invalid_before {
                    self.errors.missing(key);
                }
                String::new()
            }
        }
    }

    fn optional_text(&mut self, key: &str) -> Option<String> {
        self.text(key)
    }

    fn required_date(&mut self, key: &str) -> String {
        let value = self.required_text(key);
        if !value.is_empty() && !is_recognizable_date(&value) {
            self.errors.invalid(key, "not a recognizable date");
        }
        value
    }

    fn optional_date(&mut self, key: &str) -> Option<String> {
        let value = self.optional_text(key)?;
        if !is_recognizable_date(&value) {
            self.errors.invalid(key, "not a recognizable date");
            return None;
        }
        Some(value)
    }

    /// A sequence of text items, or a single text value as a one-item list
    fn string_list(&mut self, key: &str) -> Option<Vec<String>> {
        let value = self.value(key)?;
        match value {
            Value::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match scalar_text(item) {
                        Some(s) if !s.trim().is_empty() => out.push(s),
                        Some(_) => {}
                        None => {
                            self.errors.invalid(key, "list items must be text");
                            return None;
                        }
                    }
                }
                Some(out)
            }
            other => match scalar_text(other) {
                Some(s) if s.trim().is_empty() => Some(Vec::new()),
                Some(s) => Some(vec![s]),
                None => {
                    self.errors.invalid(key, "expected a list");
                    None
                }
            },
        }
    }

    fn columns(&mut self, key: &str) -> Vec<String> {
        let Some(value) = self.value(key) else {
            self.errors.missing(key);
            return Vec::new();
        };
        let Value::Sequence(items) = value else {
            self.errors.invalid(key, "expected a list");
            return Vec::new();
        };

        let mut columns: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            match scalar_text(item) {
                Some(name) if !name.trim().is_empty() => {
                    if name == FALLBACK_COLUMN {
                        self.errors.invalid(
                            key,
                            format!("`{}` is reserved for unplaced tasks", FALLBACK_COLUMN),
                        );
                        return Vec::new();
                    }
                    if columns.contains(&name) {
                        self.errors.invalid(key, format!("duplicate column `{}`", name));
                        return Vec::new();
                    }
                    columns.push(name);
                }
                _ => {
                    self.errors.invalid(key, "column names must be non-empty text");
                    return Vec::new();
                }
            }
        }
        if columns.is_empty() {
            self.errors.invalid(key, "at least one column is required");
        }
        columns
    }

    fn finish<T>(self, record: T) -> Result<T, ValidationError> {
        self.errors.into_result().map(|_| record)
    }
}

/// Strings pass through, numbers become their text form
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =====================================================
// Field encoding
// =====================================================

#[derive(Default)]
struct HeaderWriter {
    header: Header,
}

impl HeaderWriter {
    fn text(&mut self, key: &str, value: &str) {
        self.header.insert(Value::from(key), Value::from(value));
    }

    fn opt(&mut self, key: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.text(key, v);
        }
    }

    fn list<I, S>(&mut self, key: &str, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seq = items
            .into_iter()
            .map(|s| Value::from(s.as_ref()))
            .collect::<Vec<_>>();
        self.header.insert(Value::from(key), Value::Sequence(seq));
    }

    fn into_header(self) -> Header {
        self.header
    }
}

// =====================================================
// Dates and user text
// =====================================================

/// Parse a date string in any of the accepted forms, as UTC.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`, RFC 3339 and Unix epoch
/// seconds written as digits.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if !value.is_empty() && value.len() <= 12 && value.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = value.parse().ok()?;
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn is_recognizable_date(value: &str) -> bool {
    parse_timestamp(value).is_some()
}

/// Current time in the form the store writes (`2026-10-19T08:30:00Z`)
pub fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Check and normalize one user-supplied text field.
///
/// Returns the trimmed value, or the reason it was rejected. Titles must be a
/// single line. Used for both user input and suggestion-service output.
pub fn clean_text_field(field: &str, value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("must not be empty".to_string());
    }

    let is_title = field == "title";
    let limit = if is_title { MAX_TITLE_CHARS } else { MAX_TEXT_CHARS };
    if trimmed.chars().count() > limit {
        return Err(format!("longer than {} characters", limit));
    }
    if is_title && trimmed.contains(['\n', '\r']) {
        return Err("must be a single line".to_string());
    }
    if trimmed
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
    {
        return Err("contains control characters".to_string());
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::frontmatter;

    fn header_from(yaml: &str) -> Header {
        frontmatter::parse(&format!("---\n{}---\n", yaml)).unwrap().header
    }

    fn sample_task() -> Task {
        Task {
            id: "write-docs".to_string(),
            title: "Write docs".to_string(),
            board: "default".to_string(),
            column: "In Progress".to_string(),
            tags: ["docs".to_string(), "story".to_string()].into_iter().collect(),
            due: Some("2026-11-01".to_string()),
            created: "2026-10-19T08:30:00Z".to_string(),
            updated: None,
            project_id: Some("handbook".to_string()),
            epic_id: None,
            owner: Some("sam".to_string()),
            as_a: Some("new contributor".to_string()),
            i_want: Some("setup docs".to_string()),
            so_that: None,
            acceptance_criteria: vec!["covers install".to_string()],
            body: "Long form description.\n".to_string(),
        }
    }

    #[test]
    fn test_records_survive_encode_decode() {
        let task = sample_task();
        assert_eq!(Task::decode(&task.encode(), task.body()).unwrap(), task);

        let mut bare = sample_task();
        bare.tags.clear();
        bare.due = None;
        bare.project_id = None;
        bare.owner = None;
        bare.as_a = None;
        bare.i_want = None;
        bare.acceptance_criteria.clear();
        bare.body.clear();
        bare.updated = Some("1700000000".to_string());
        assert_eq!(Task::decode(&bare.encode(), "").unwrap(), bare);

        let board = Board {
            id: "default".to_string(),
            title: "Default Board".to_string(),
            columns: vec!["Inbox".to_string(), "Done".to_string()],
        };
        assert_eq!(Board::decode(&board.encode(), "").unwrap(), board);

        let project = Project {
            id: "p".to_string(),
            title: "P".to_string(),
            owner: None,
            description: Some("multi\nline".to_string()),
            created: Some("2026-01-01".to_string()),
            updated: None,
        };
        assert_eq!(Project::decode(&project.encode(), "").unwrap(), project);

        let epic = Epic {
            id: "e".to_string(),
            title: "E".to_string(),
            project_id: Some("p".to_string()),
            owner: Some("kim".to_string()),
            description: None,
            created: None,
            updated: None,
        };
        assert_eq!(Epic::decode(&epic.encode(), "").unwrap(), epic);
    }

    #[test]
    fn test_encode_uses_declared_field_order() {
        let header = sample_task().encode();
        let keys: Vec<&str> = header.keys().filter_map(Value::as_str).collect();
        let declared: Vec<&str> = Task::FIELDS
            .iter()
            .copied()
            .filter(|f| keys.contains(f))
            .collect();
        assert_eq!(keys, declared);
        assert_eq!(
            keys,
            vec![
                "id", "title", "board", "column", "tags", "due", "created", "project_id",
                "owner", "as_a", "i_want", "acceptance_criteria"
            ]
        );
    }

    #[test]
    fn test_board_cannot_declare_fallback_column() {
        let err = Board::decode(
            &header_from("id: triage\ntitle: Triage\ncolumns: [Unassigned, Done]\n"),
            "",
        )
        .unwrap_err();
        assert!(err.missing_fields.is_empty());
        assert_eq!(err.invalid_fields.len(), 1);
        assert_eq!(err.invalid_fields[0].field, "columns");
        assert!(err.invalid_fields[0].reason.contains("reserved"));
    }

    #[test]
    fn test_decode_reports_every_missing_field() {
        let err = Task::decode(&header_from("title: Only a title\n"), "").unwrap_err();
        assert_eq!(err.missing_fields, vec!["id", "board", "column", "created"]);
        assert!(err.invalid_fields.is_empty());
    }

    #[test]
    fn test_decode_type_checks() {
        let err = Board::decode(&header_from("id: b\ntitle: B\ncolumns: Todo\n"), "").unwrap_err();
        assert_eq!(err.invalid_fields[0].field, "columns");

        let err = Board::decode(&header_from("id: b\ntitle: B\ncolumns: []\n"), "").unwrap_err();
        assert_eq!(err.invalid_fields[0].field, "columns");

        let err =
            Board::decode(&header_from("id: b\ntitle: B\ncolumns: [A, A]\n"), "").unwrap_err();
        assert!(err.invalid_fields[0].reason.contains("duplicate"));

        let err = Task::decode(
            &header_from("id: t\ntitle: T\nboard: b\ncolumn: c\ncreated: 2026-01-01\ndue: someday\n"),
            "",
        )
        .unwrap_err();
        assert_eq!(err.invalid_fields[0].field, "due");

        let err = Project::decode(&header_from("id: p\ntitle: [not, text]\n"), "").unwrap_err();
        assert_eq!(err.invalid_fields[0].field, "title");
        assert!(err.missing_fields.is_empty());
    }

    #[test]
    fn test_decode_ignores_unknown_fields_and_coerces_numbers() {
        let project =
            Project::decode(&header_from("id: 42\ntitle: 2026\ncolor: red\nowner: ~\n"), "")
                .unwrap();
        assert_eq!(project.id, "42");
        assert_eq!(project.title, "2026");
        assert!(project.owner.is_none());
    }

    #[test]
    fn test_blank_required_field_is_missing() {
        let err = Epic::decode(&header_from("id: e\ntitle: \"  \"\n"), "").unwrap_err();
        assert_eq!(err.missing_fields, vec!["title"]);
    }

    #[test]
    fn test_tags_accept_single_string() {
        let task = Task::decode(
            &header_from("id: t\ntitle: T\nboard: b\ncolumn: c\ncreated: 2026-01-01\ntags: urgent\n"),
            "body",
        )
        .unwrap();
        assert!(task.tags.contains("urgent"));
        assert_eq!(task.body, "body");
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let day = parse_timestamp("2026-10-19").unwrap();
        let exact = parse_timestamp("2026-10-19T08:30:00Z").unwrap();
        let local = parse_timestamp("2026-10-19T08:30:00").unwrap();
        assert!(day < exact);
        assert_eq!(exact, local);
        assert_eq!(
            parse_timestamp("0").unwrap(),
            parse_timestamp("1970-01-01").unwrap()
        );
        assert!(parse_timestamp("next tuesday").is_none());
        assert!(is_recognizable_date(&now_timestamp()));
    }

    #[test]
    fn test_clean_text_field() {
        assert_eq!(clean_text_field("title", "  Ship it ").unwrap(), "Ship it");
        assert!(clean_text_field("title", "   ").is_err());
        assert!(clean_text_field("title", "two\nlines").is_err());
        assert!(clean_text_field("as_a", "two\nlines").is_ok());
        assert!(clean_text_field("title", &"x".repeat(MAX_TITLE_CHARS + 1)).is_err());
        assert!(clean_text_field("owner", "bell\u{7}").is_err());
    }
}
