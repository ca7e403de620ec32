//! Tool catalogue and execution.
//!
//! Six record tools per table (`<prefix>_search`, `_list`, `_add`, `_get`,
//! `_update`, `_delete`) plus `get_schema` and the three vault tools. Input
//! schemas are derived from the table definitions so the catalogue cannot
//! drift from what the store accepts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::store::schema::SYSTEM_COLUMNS;
use crate::store::{
    clamp_limit, ColumnKind, Record, RecordStore, StoreError, Table, DEFAULT_LIMIT,
};
use crate::vault::{Vault, VaultError};

const DEFAULT_SCHEMA_TABLE: &str = "memory.memories";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("Tool task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Search,
    List,
    Add,
    Get,
    Update,
    Delete,
}

impl RecordAction {
    pub const ALL: [RecordAction; 6] = [
        RecordAction::Search,
        RecordAction::List,
        RecordAction::Add,
        RecordAction::Get,
        RecordAction::Update,
        RecordAction::Delete,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            RecordAction::Search => "search",
            RecordAction::List => "list",
            RecordAction::Add => "add",
            RecordAction::Get => "get",
            RecordAction::Update => "update",
            RecordAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Record(Table, RecordAction),
    GetSchema,
    VaultRead,
    VaultWrite,
    VaultList,
}

impl Tool {
    /// Every tool in catalogue order.
    pub fn all() -> Vec<Tool> {
        let mut tools: Vec<Tool> = Table::ALL
            .into_iter()
            .flat_map(|t| RecordAction::ALL.into_iter().map(move |a| Tool::Record(t, a)))
            .collect();
        tools.extend([Tool::GetSchema, Tool::VaultRead, Tool::VaultWrite, Tool::VaultList]);
        tools
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Record(table, action) => {
                write!(f, "{}_{}", table.tool_prefix(), action.suffix())
            }
            Tool::GetSchema => f.write_str("get_schema"),
            Tool::VaultRead => f.write_str("vault_read"),
            Tool::VaultWrite => f.write_str("vault_write"),
            Tool::VaultList => f.write_str("vault_list"),
        }
    }
}

impl FromStr for Tool {
    type Err = ToolError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "get_schema" => return Ok(Tool::GetSchema),
            "vault_read" => return Ok(Tool::VaultRead),
            "vault_write" => return Ok(Tool::VaultWrite),
            "vault_list" => return Ok(Tool::VaultList),
            _ => {}
        }

        name.split_once('_')
            .and_then(|(prefix, suffix)| {
                let table = Table::from_tool_prefix(prefix)?;
                let action = RecordAction::ALL.into_iter().find(|a| a.suffix() == suffix)?;
                Some(Tool::Record(table, action))
            })
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }
}

/// Entry in the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn object_schema(properties: Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn limit_prop() -> Value {
    json!({
        "type": "integer",
        "description": "Maximum rows to return (1-500)",
        "default": DEFAULT_LIMIT,
    })
}

fn column_props(table: Table) -> Map<String, Value> {
    table
        .schema()
        .columns
        .iter()
        .map(|column| {
            let mut prop = match column.kind {
                ColumnKind::Text => string_prop(column.description),
                ColumnKind::List => json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": column.description,
                }),
            };
            if let Some(default) = column.default {
                prop["default"] = json!(default);
            }
            (column.name.to_string(), prop)
        })
        .collect()
}

fn describe(tool: Tool) -> ToolDescriptor {
    let (description, input_schema) = match tool {
        Tool::Record(table, action) => {
            let name = table.qualified_name();
            let schema = table.schema();
            match action {
                RecordAction::Search => (
                    format!(
                        "Search {name} by case-insensitive substring over: {}",
                        schema.search.join(", ")
                    ),
                    object_schema(
                        Map::from_iter([
                            ("query".to_string(), string_prop("Text to look for")),
                            ("limit".to_string(), limit_prop()),
                        ]),
                        &["query"],
                    ),
                ),
                RecordAction::List => {
                    let mut props = Map::from_iter([("limit".to_string(), limit_prop())]);
                    for filter in schema.filters {
                        props.insert(
                            filter.param.to_string(),
                            string_prop(&format!("Only rows matching this {}", filter.column)),
                        );
                    }
                    (
                        format!("List {name}, newest first, with optional filters"),
                        object_schema(props, &[]),
                    )
                }
                RecordAction::Add => {
                    let required: Vec<&str> = schema
                        .columns
                        .iter()
                        .filter(|c| c.required)
                        .map(|c| c.name)
                        .collect();
                    (
                        format!("Add a row to {name}"),
                        object_schema(column_props(table), &required),
                    )
                }
                RecordAction::Get => (
                    format!("Fetch one row of {name} by row_id"),
                    row_id_schema(Map::new()),
                ),
                RecordAction::Update => (
                    format!("Update the given fields of a {name} row"),
                    row_id_schema(column_props(table)),
                ),
                RecordAction::Delete => (
                    format!("Delete a row of {name} by row_id"),
                    row_id_schema(Map::new()),
                ),
            }
        }
        Tool::GetSchema => (
            "Describe the columns of a table".to_string(),
            object_schema(
                Map::from_iter([(
                    "table_name".to_string(),
                    json!({
                        "type": "string",
                        "description": "Qualified table name",
                        "default": DEFAULT_SCHEMA_TABLE,
                        "enum": Table::ALL.map(|t| t.qualified_name()),
                    }),
                )]),
                &[],
            ),
        ),
        Tool::VaultRead => (
            "Read a UTF-8 file from the note vault".to_string(),
            object_schema(
                Map::from_iter([("path".to_string(), string_prop("Path relative to the vault root"))]),
                &["path"],
            ),
        ),
        Tool::VaultWrite => (
            "Write a file in the note vault, creating parent directories".to_string(),
            object_schema(
                Map::from_iter([
                    ("path".to_string(), string_prop("Path relative to the vault root")),
                    ("content".to_string(), string_prop("File content")),
                    (
                        "overwrite".to_string(),
                        json!({"type": "boolean", "default": false, "description": "Replace an existing file"}),
                    ),
                ]),
                &["path", "content"],
            ),
        ),
        Tool::VaultList => (
            "List a vault directory".to_string(),
            object_schema(
                Map::from_iter([
                    (
                        "path".to_string(),
                        json!({"type": "string", "default": "", "description": "Directory relative to the vault root"}),
                    ),
                    (
                        "recursive".to_string(),
                        json!({"type": "boolean", "default": false, "description": "Descend into subdirectories"}),
                    ),
                ]),
                &[],
            ),
        ),
    };

    ToolDescriptor {
        name: tool.to_string(),
        description,
        input_schema,
    }
}

fn row_id_schema(mut props: Map<String, Value>) -> Value {
    props.insert("row_id".to_string(), string_prop("Row identifier (UUID)"));
    object_schema(props, &["row_id"])
}

/// Tool arguments with typed accessors. Each accessor removes what it reads,
/// so whatever is left over afterwards was not expected.
struct Args(Map<String, Value>);

impl Args {
    fn new(arguments: Value) -> Result<Self, ToolError> {
        match arguments {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self(Map::new())),
            other => Err(ToolError::InvalidArguments(format!(
                "arguments must be an object, got {other}"
            ))),
        }
    }

    fn string(&mut self, key: &str) -> Result<Option<String>, ToolError> {
        match self.0.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(ToolError::InvalidArguments(format!("'{key}' must be a string"))),
        }
    }

    fn required_string(&mut self, key: &str) -> Result<String, ToolError> {
        self.string(key)?
            .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' is required")))
    }

    fn flag(&mut self, key: &str) -> Result<bool, ToolError> {
        match self.0.remove(key) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(b),
            Some(_) => Err(ToolError::InvalidArguments(format!("'{key}' must be a boolean"))),
        }
    }

    fn limit(&mut self) -> Result<usize, ToolError> {
        match self.0.remove("limit") {
            None | Some(Value::Null) => Ok(DEFAULT_LIMIT),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(clamp_limit)
                .ok_or_else(|| ToolError::InvalidArguments("'limit' must be an integer".into())),
            Some(_) => Err(ToolError::InvalidArguments("'limit' must be an integer".into())),
        }
    }

    fn finish(self) -> Result<(), ToolError> {
        match self.0.keys().next() {
            Some(key) => Err(ToolError::InvalidArguments(format!("unexpected argument '{key}'"))),
            None => Ok(()),
        }
    }

    fn into_fields(self) -> Record {
        self.0
    }
}

/// Executes tools against the record store and the vault.
#[derive(Clone)]
pub struct ToolRegistry {
    store: Arc<dyn RecordStore>,
    vault: Arc<Vault>,
}

impl ToolRegistry {
    pub fn new(store: Arc<dyn RecordStore>, vault: Arc<Vault>) -> Self {
        Self { store, vault }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        Tool::all().into_iter().map(describe).collect()
    }

    /// Run `name` with `arguments` on the blocking pool.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool: Tool = name.parse()?;
        let registry = self.clone();
        tokio::task::spawn_blocking(move || registry.execute(tool, arguments)).await?
    }

    /// Synchronous execution; callers on a runtime should go through [`call`](Self::call).
    pub fn execute(&self, tool: Tool, arguments: Value) -> Result<Value, ToolError> {
        let mut args = Args::new(arguments)?;
        match tool {
            Tool::Record(table, action) => self.execute_record(table, action, args),
            Tool::GetSchema => {
                let name = args
                    .string("table_name")?
                    .unwrap_or_else(|| DEFAULT_SCHEMA_TABLE.to_string());
                args.finish()?;
                let table: Table = name.parse()?;
                Ok(schema_json(table))
            }
            Tool::VaultRead => {
                let path = args.required_string("path")?;
                args.finish()?;
                let content = self.vault.read(&path)?;
                Ok(json!({ "path": path, "content": content }))
            }
            Tool::VaultWrite => {
                let path = args.required_string("path")?;
                let content = args.required_string("content")?;
                let overwrite = args.flag("overwrite")?;
                args.finish()?;
                let outcome = self.vault.write(&path, &content, overwrite)?;
                Ok(json!({
                    "status": "ok",
                    "path": outcome.path,
                    "bytes": outcome.bytes,
                    "created": outcome.created,
                }))
            }
            Tool::VaultList => {
                let path = args.string("path")?.unwrap_or_default();
                let recursive = args.flag("recursive")?;
                args.finish()?;
                let entries = self.vault.list(&path, recursive)?;
                Ok(json!({ "path": path, "entries": entries }))
            }
        }
    }

    fn execute_record(
        &self,
        table: Table,
        action: RecordAction,
        mut args: Args,
    ) -> Result<Value, ToolError> {
        let key = table.tool_prefix();
        match action {
            RecordAction::Search => {
                let query = args.required_string("query")?;
                let limit = args.limit()?;
                args.finish()?;
                let rows = self.store.search(table, &query, limit)?;
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            RecordAction::List => {
                let limit = args.limit()?;
                let mut filters = Vec::new();
                for (param, value) in args.into_fields() {
                    match value {
                        Value::Null => {}
                        Value::String(s) => filters.push((param, s)),
                        _ => {
                            return Err(ToolError::InvalidArguments(format!(
                                "filter '{param}' must be a string"
                            )))
                        }
                    }
                }
                let rows = self.store.list(table, &filters, limit)?;
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            RecordAction::Add => {
                let record = self.store.insert(table, args.into_fields())?;
                tracing::info!(table = %table, row_id = ?record.get("row_id"), "Row added");
                Ok(json!({ "status": "ok", key: record }))
            }
            RecordAction::Get => {
                let row_id = args.required_string("row_id")?;
                args.finish()?;
                Ok(Value::Object(self.store.get(table, &row_id)?))
            }
            RecordAction::Update => {
                let row_id = args.required_string("row_id")?;
                let record = self.store.update(table, &row_id, args.into_fields())?;
                Ok(json!({ "status": "ok", key: record }))
            }
            RecordAction::Delete => {
                let row_id = args.required_string("row_id")?;
                args.finish()?;
                self.store.delete(table, &row_id)?;
                tracing::info!(table = %table, row_id = %row_id, "Row deleted");
                Ok(json!({ "status": "deleted", "row_id": row_id }))
            }
        }
    }
}

fn schema_json(table: Table) -> Value {
    let schema = table.schema();
    let mut columns: Vec<Value> = SYSTEM_COLUMNS
        .iter()
        .map(|name| json!({ "name": name, "type": "String", "managed": true }))
        .collect();
    columns.extend(schema.columns.iter().map(|c| {
        json!({
            "name": c.name,
            "type": c.kind.type_name(),
            "required": c.required,
            "default": c.default,
            "description": c.description,
        })
    }));

    json!({
        "table": table.qualified_name(),
        "columns": columns,
        "search_columns": schema.search,
        "filters": schema.filters.iter().map(|f| f.param).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SnapshotStore;

    fn registry() -> (tempfile::TempDir, ToolRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(
            Arc::new(SnapshotStore::in_memory()),
            Arc::new(Vault::new(dir.path(), 1024 * 1024)),
        );
        (dir, registry)
    }

    #[test]
    fn test_tool_names_round_trip() {
        let tools = Tool::all();
        assert_eq!(tools.len(), 34);
        for tool in tools {
            assert_eq!(tool.to_string().parse::<Tool>().unwrap(), tool);
        }
        assert!(matches!("memory_fly".parse::<Tool>(), Err(ToolError::UnknownTool(_))));
        assert!(matches!("vault_delete".parse::<Tool>(), Err(ToolError::UnknownTool(_))));
    }

    #[test]
    fn test_descriptors_follow_table_schemas() {
        let (_dir, registry) = registry();
        let descriptors = registry.descriptors();
        let add = descriptors.iter().find(|d| d.name == "bookmark_add").unwrap();
        assert_eq!(add.input_schema["required"], json!(["url", "title"]));
        assert_eq!(add.input_schema["properties"]["language"]["default"], "en");

        let list = descriptors.iter().find(|d| d.name == "memory_list").unwrap();
        assert!(list.input_schema["properties"].get("project").is_some());
    }

    #[test]
    fn test_record_round_trip() {
        let (_dir, registry) = registry();
        let added = registry
            .execute(
                Tool::Record(Table::Memories, RecordAction::Add),
                json!({"content": "Prefer tracing over println", "tags": ["rust"]}),
            )
            .unwrap();
        assert_eq!(added["status"], "ok");
        let row_id = added["memory"]["row_id"].as_str().unwrap().to_string();

        let found = registry
            .execute(
                Tool::Record(Table::Memories, RecordAction::Search),
                json!({"query": "TRACING"}),
            )
            .unwrap();
        assert_eq!(found.as_array().unwrap().len(), 1);

        let updated = registry
            .execute(
                Tool::Record(Table::Memories, RecordAction::Update),
                json!({"row_id": row_id, "memory_type": "preference"}),
            )
            .unwrap();
        assert_eq!(updated["memory"]["memory_type"], "preference");

        let listed = registry
            .execute(
                Tool::Record(Table::Memories, RecordAction::List),
                json!({"memory_type": "preference", "limit": 5}),
            )
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let deleted = registry
            .execute(
                Tool::Record(Table::Memories, RecordAction::Delete),
                json!({"row_id": row_id}),
            )
            .unwrap();
        assert_eq!(deleted["status"], "deleted");

        let err = registry
            .execute(
                Tool::Record(Table::Memories, RecordAction::Get),
                json!({"row_id": row_id}),
            )
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_argument_errors() {
        let (_dir, registry) = registry();
        let search = Tool::Record(Table::Chats, RecordAction::Search);
        assert!(matches!(
            registry.execute(search, json!({})),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            registry.execute(search, json!({"query": "x", "limit": "ten"})),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            registry.execute(search, json!({"query": "x", "extra": 1})),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            registry.execute(search, json!([1, 2])),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            registry.execute(Tool::Record(Table::Chats, RecordAction::Add), json!({"chat_id": "a"})),
            Err(ToolError::Store(StoreError::MissingField("chat_title")))
        ));
    }

    #[test]
    fn test_get_schema() {
        let (_dir, registry) = registry();
        let default = registry.execute(Tool::GetSchema, Value::Null).unwrap();
        assert_eq!(default["table"], "memory.memories");
        assert_eq!(default["columns"][0]["name"], "row_id");

        let projects = registry
            .execute(Tool::GetSchema, json!({"table_name": "memory.projects"}))
            .unwrap();
        assert!(projects["columns"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["name"] == "technologies" && c["type"] == "Json"));

        let err = registry
            .execute(Tool::GetSchema, json!({"table_name": "memory.nope"}))
            .unwrap_err();
        assert!(err.to_string().contains("memory.documents"));
    }

    #[test]
    fn test_vault_tools() {
        let (_dir, registry) = registry();
        let written = registry
            .execute(Tool::VaultWrite, json!({"path": "inbox/today.md", "content": "hi"}))
            .unwrap();
        assert_eq!(written["created"], true);

        let read = registry
            .execute(Tool::VaultRead, json!({"path": "inbox/today.md"}))
            .unwrap();
        assert_eq!(read["content"], "hi");

        let listed = registry
            .execute(Tool::VaultList, json!({"recursive": true}))
            .unwrap();
        assert_eq!(listed["entries"][1]["path"], "inbox/today.md");

        assert!(matches!(
            registry.execute(Tool::VaultRead, json!({"path": "../etc/passwd"})),
            Err(ToolError::Vault(VaultError::Traversal(_)))
        ));
    }

    #[tokio::test]
    async fn test_call_runs_on_blocking_pool() {
        let (_dir, registry) = registry();
        let result = registry
            .call("project_add", json!({"name": "Gateway", "slug": "gateway"}))
            .await
            .unwrap();
        assert_eq!(result["project"]["status"], "active");

        assert!(matches!(
            registry.call("nope", Value::Null).await,
            Err(ToolError::UnknownTool(_))
        ));
    }
}
