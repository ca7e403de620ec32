//! Table definitions for the five record tables.
//!
//! Every table carries `row_id`, `created_at` and `updated_at` in addition to
//! the columns listed here. Those three are managed by the store and cannot be
//! set by callers.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::store::StoreError;

/// A record is a flat JSON object keyed by column name.
pub type Record = Map<String, Value>;

pub const ROW_ID: &str = "row_id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Columns maintained by the store.
pub const SYSTEM_COLUMNS: [&str; 3] = [ROW_ID, CREATED_AT, UPDATED_AT];

/// The five record tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Memories,
    Bookmarks,
    Chats,
    Projects,
    Documents,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Memories,
        Table::Bookmarks,
        Table::Chats,
        Table::Projects,
        Table::Documents,
    ];

    /// Fully qualified name, e.g. `memory.memories`.
    pub fn qualified_name(&self) -> &'static str {
        match self {
            Table::Memories => "memory.memories",
            Table::Bookmarks => "memory.bookmarks",
            Table::Chats => "memory.chats",
            Table::Projects => "memory.projects",
            Table::Documents => "memory.documents",
        }
    }

    /// Short name used for snapshot files.
    pub fn short_name(&self) -> &'static str {
        match self {
            Table::Memories => "memories",
            Table::Bookmarks => "bookmarks",
            Table::Chats => "chats",
            Table::Projects => "projects",
            Table::Documents => "documents",
        }
    }

    /// Singular prefix used in tool names, e.g. `memory` in `memory_search`.
    pub fn tool_prefix(&self) -> &'static str {
        match self {
            Table::Memories => "memory",
            Table::Bookmarks => "bookmark",
            Table::Chats => "chat",
            Table::Projects => "project",
            Table::Documents => "document",
        }
    }

    pub fn from_tool_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tool_prefix() == prefix)
    }

    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Table::Memories => &MEMORIES,
            Table::Bookmarks => &BOOKMARKS,
            Table::Chats => &CHATS,
            Table::Projects => &PROJECTS,
            Table::Documents => &DOCUMENTS,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualified_name())
    }
}

impl FromStr for Table {
    type Err = StoreError;

    /// Accepts `memory.memories` or `memories`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.qualified_name() == s || t.short_name() == s)
            .ok_or_else(|| StoreError::UnknownTable(s.to_string()))
    }
}

/// Column value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// A string.
    Text,
    /// An array of strings.
    List,
}

impl ColumnKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnKind::Text => "String",
            ColumnKind::List => "Json",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Must be supplied on insert.
    pub required: bool,
    /// Text default applied on insert when absent. Lists default to `[]`,
    /// text without a default to `""`.
    pub default: Option<&'static str>,
    pub description: &'static str,
}

const fn text(name: &'static str, description: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Text,
        required: false,
        default: None,
        description,
    }
}

const fn required(name: &'static str, description: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Text,
        required: true,
        default: None,
        description,
    }
}

const fn with_default(name: &'static str, default: &'static str, description: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Text,
        required: false,
        default: Some(default),
        description,
    }
}

const fn list(name: &'static str, description: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::List,
        required: false,
        default: None,
        description,
    }
}

/// How a list filter matches its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Text column equals the argument.
    Equals,
    /// List column contains the argument.
    Contains,
}

/// An optional `*_list` argument.
#[derive(Debug, Clone, Copy)]
pub struct Filter {
    pub param: &'static str,
    pub column: &'static str,
    pub mode: FilterMode,
}

const fn equals(param: &'static str) -> Filter {
    Filter {
        param,
        column: param,
        mode: FilterMode::Equals,
    }
}

const fn contains(param: &'static str, column: &'static str) -> Filter {
    Filter {
        param,
        column,
        mode: FilterMode::Contains,
    }
}

#[derive(Debug)]
pub struct TableSchema {
    pub columns: &'static [Column],
    /// Columns scanned by `*_search`.
    pub search: &'static [&'static str],
    pub filters: &'static [Filter],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn filter(&self, param: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.param == param)
    }

    /// Build a new record from caller-supplied fields, applying defaults.
    ///
    /// System columns are not set here.
    pub fn build_record(&self, mut fields: Record) -> Result<Record, StoreError> {
        self.reject_unknown(&fields)?;

        let mut record = Record::new();
        for column in self.columns {
            let value = match fields.remove(column.name) {
                Some(Value::Null) | None if column.required => {
                    return Err(StoreError::MissingField(column.name));
                }
                Some(value) if !value.is_null() => check_kind(column, value)?,
                _ => default_value(column),
            };
            record.insert(column.name.to_string(), value);
        }
        Ok(record)
    }

    /// Apply a partial update to `record` in place. Returns the number of
    /// columns changed.
    pub fn apply_update(&self, record: &mut Record, fields: Record) -> Result<usize, StoreError> {
        self.reject_unknown(&fields)?;

        let mut checked = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let column = self
                .column(&name)
                .ok_or_else(|| StoreError::UnknownField(name.clone()))?;
            let value = if value.is_null() {
                if column.required {
                    return Err(StoreError::MissingField(column.name));
                }
                default_value(column)
            } else {
                check_kind(column, value)?
            };
            checked.push((name, value));
        }

        let changed = checked.len();
        for (name, value) in checked {
            record.insert(name, value);
        }
        Ok(changed)
    }

    /// Case-insensitive substring match over the search columns.
    pub fn matches_query(&self, record: &Record, needle_lower: &str) -> bool {
        self.search.iter().any(|column| match record.get(*column) {
            Some(Value::String(s)) => s.to_lowercase().contains(needle_lower),
            _ => false,
        })
    }

    fn reject_unknown(&self, fields: &Record) -> Result<(), StoreError> {
        for name in fields.keys() {
            if SYSTEM_COLUMNS.contains(&name.as_str()) {
                return Err(StoreError::ReadOnlyField(name.clone()));
            }
            if self.column(name).is_none() {
                return Err(StoreError::UnknownField(name.clone()));
            }
        }
        Ok(())
    }
}

impl Filter {
    pub fn matches(&self, record: &Record, wanted: &str) -> bool {
        match (self.mode, record.get(self.column)) {
            (FilterMode::Equals, Some(Value::String(s))) => s == wanted,
            (FilterMode::Contains, Some(Value::Array(items))) => {
                items.iter().any(|item| item.as_str() == Some(wanted))
            }
            _ => false,
        }
    }
}

fn default_value(column: &Column) -> Value {
    match column.kind {
        ColumnKind::Text => Value::String(column.default.unwrap_or_default().to_string()),
        ColumnKind::List => Value::Array(Vec::new()),
    }
}

fn check_kind(column: &Column, value: Value) -> Result<Value, StoreError> {
    let ok = match (column.kind, &value) {
        (ColumnKind::Text, Value::String(_)) => true,
        (ColumnKind::List, Value::Array(items)) => items.iter().all(Value::is_string),
        _ => false,
    };
    if ok {
        Ok(value)
    } else {
        let expected = match column.kind {
            ColumnKind::Text => "a string",
            ColumnKind::List => "an array of strings",
        };
        Err(StoreError::InvalidField {
            field: column.name,
            expected,
        })
    }
}

static MEMORIES: TableSchema = TableSchema {
    columns: &[
        required("content", "The memory content text"),
        with_default(
            "memory_type",
            "note",
            "learning, status, decision, note, preference or reference",
        ),
        list("projects", "Related project slugs"),
        list("tags", "Tags for categorization"),
        with_default("source", "claude-web", "Chat UUID or source identifier"),
    ],
    search: &["content"],
    filters: &[equals("memory_type"), contains("project", "projects")],
};

static BOOKMARKS: TableSchema = TableSchema {
    columns: &[
        required("url", "The URL to bookmark"),
        required("title", "Title of the bookmark"),
        text("description", "Brief description of the content"),
        with_default(
            "bookmark_type",
            "reference",
            "reference, tool, article or documentation",
        ),
        list("projects", "Related project slugs"),
        list("tags", "Tags for categorization"),
        with_default("source", "claude-web", "Source identifier"),
        with_default("language", "en", "Content language code"),
    ],
    search: &["title", "description", "url"],
    filters: &[equals("bookmark_type"), contains("project", "projects")],
};

static CHATS: TableSchema = TableSchema {
    columns: &[
        required("chat_id", "Chat UUID"),
        required("chat_title", "Chat title"),
        text("project_slug", "Project the chat belongs to"),
        with_default("active", "yes", "\"yes\" or \"no\""),
        with_default("source", "claude-web", "Source identifier"),
    ],
    search: &["chat_title", "chat_id"],
    filters: &[equals("project_slug"), equals("active")],
};

static PROJECTS: TableSchema = TableSchema {
    columns: &[
        required("name", "Project name"),
        required("slug", "URL-safe identifier"),
        text("description", "What the project is about"),
        with_default("status", "active", "active, paused or completed"),
        text("category", "Free-form category"),
        with_default("priority", "normal", "low, normal, high or critical"),
        list("paths", "File system paths"),
        list("technologies", "Languages and tools used"),
        list("tags", "Tags for categorization"),
        list("related_projects", "Slugs of related projects"),
        text("next_steps", "Planned next steps"),
        text("notes", "Free-form notes"),
        text("claude_project_id", "Upstream project UUID"),
    ],
    search: &["name", "slug", "description", "notes"],
    filters: &[equals("status"), equals("category")],
};

static DOCUMENTS: TableSchema = TableSchema {
    columns: &[
        required("path", "Vault path or external URL"),
        required("title", "Document title"),
        text("description", "Brief description"),
        with_default(
            "doc_type",
            "reference",
            "artifact, report, template, reference or external",
        ),
        list("projects", "Related project slugs"),
        list("tags", "Tags for categorization"),
        with_default("source", "claude-web", "Source identifier"),
    ],
    search: &["title", "description", "path"],
    filters: &[equals("doc_type"), contains("project", "projects")],
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_table_names_round_trip() {
        for table in Table::ALL {
            assert_eq!(table.qualified_name().parse::<Table>().unwrap(), table);
            assert_eq!(table.short_name().parse::<Table>().unwrap(), table);
            assert_eq!(Table::from_tool_prefix(table.tool_prefix()), Some(table));
        }
        assert!("memory.nope".parse::<Table>().is_err());
    }

    #[test]
    fn test_build_record_applies_defaults() {
        let record = Table::Memories
            .schema()
            .build_record(fields(json!({"content": "remember this"})))
            .unwrap();
        assert_eq!(record["memory_type"], "note");
        assert_eq!(record["source"], "claude-web");
        assert_eq!(record["projects"], json!([]));
        assert_eq!(record["tags"], json!([]));
    }

    #[test]
    fn test_build_record_requires_fields() {
        let err = Table::Bookmarks
            .schema()
            .build_record(fields(json!({"url": "https://example.com"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingField("title")));
    }

    #[test]
    fn test_build_record_rejects_bad_shapes() {
        let schema = Table::Memories.schema();
        assert!(matches!(
            schema.build_record(fields(json!({"content": "x", "tags": "one"}))),
            Err(StoreError::InvalidField { field: "tags", .. })
        ));
        assert!(matches!(
            schema.build_record(fields(json!({"content": "x", "tags": [1, 2]}))),
            Err(StoreError::InvalidField { field: "tags", .. })
        ));
        assert!(matches!(
            schema.build_record(fields(json!({"content": "x", "mood": "happy"}))),
            Err(StoreError::UnknownField(_))
        ));
        assert!(matches!(
            schema.build_record(fields(json!({"content": "x", "row_id": "abc"}))),
            Err(StoreError::ReadOnlyField(_))
        ));
    }

    #[test]
    fn test_apply_update_is_partial() {
        let schema = Table::Projects.schema();
        let mut record = schema
            .build_record(fields(json!({"name": "Gateway", "slug": "gateway"})))
            .unwrap();

        let changed = schema
            .apply_update(&mut record, fields(json!({"status": "paused", "technologies": ["rust"]})))
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(record["status"], "paused");
        assert_eq!(record["technologies"], json!(["rust"]));
        assert_eq!(record["name"], "Gateway");
    }

    #[test]
    fn test_apply_update_is_all_or_nothing() {
        let schema = Table::Projects.schema();
        let mut record = schema
            .build_record(fields(json!({"name": "Gateway", "slug": "gateway"})))
            .unwrap();
        let before = record.clone();

        assert!(schema
            .apply_update(&mut record, fields(json!({"status": "paused", "paths": "nope"})))
            .is_err());
        assert_eq!(record, before);
    }

    #[test]
    fn test_query_and_filters() {
        let schema = Table::Bookmarks.schema();
        let record = schema
            .build_record(fields(json!({
                "url": "https://github.com/tokio-rs/axum",
                "title": "Axum",
                "projects": ["gateway"],
            })))
            .unwrap();

        assert!(schema.matches_query(&record, "github"));
        assert!(schema.matches_query(&record, "axum"));
        assert!(!schema.matches_query(&record, "warp"));

        assert!(schema.filter("project").unwrap().matches(&record, "gateway"));
        assert!(!schema.filter("project").unwrap().matches(&record, "other"));
        assert!(schema.filter("bookmark_type").unwrap().matches(&record, "reference"));
    }
}
