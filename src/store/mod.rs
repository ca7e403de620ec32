//! Record store for the five knowledge tables.
//!
//! # Data Flow
//! ```text
//! ToolRegistry (spawn_blocking)
//!     → RecordStore trait
//!     → SnapshotStore (DashMap per table)
//!     → data_dir/<table>.json (rewritten after each mutation)
//! ```

pub mod schema;
pub mod snapshot;

use std::path::PathBuf;

pub use schema::{Column, ColumnKind, Filter, FilterMode, Record, Table, TableSchema};
pub use snapshot::SnapshotStore;

/// Largest page any search or list call may return.
pub const MAX_LIMIT: usize = 500;

/// Page size when the caller does not pass one.
pub const DEFAULT_LIMIT: usize = 20;

/// Clamp a caller-supplied limit into `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: i64) -> usize {
    limit.clamp(1, MAX_LIMIT as i64) as usize
}

/// Errors raised by the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unknown table: {0}. Valid tables: {tables}", tables = valid_tables())]
    UnknownTable(String),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Field '{0}' is managed by the store and cannot be set")]
    ReadOnlyField(String),
    #[error("Unknown filter for {table}: {param}")]
    UnknownFilter { table: Table, param: String },
    #[error("No fields to update")]
    EmptyUpdate,
    #[error("Row {row_id} not found in {table}")]
    NotFound { table: Table, row_id: String },
    #[error("Snapshot IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn valid_tables() -> String {
    Table::ALL
        .iter()
        .map(Table::qualified_name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Storage backend used by the tool layer.
///
/// Implementations are synchronous; callers on the async side wrap them in
/// `spawn_blocking`.
pub trait RecordStore: Send + Sync + 'static {
    /// Case-insensitive substring search over the table's search columns.
    fn search(&self, table: Table, query: &str, limit: usize) -> Result<Vec<Record>, StoreError>;

    /// List rows matching every `(param, value)` filter.
    fn list(
        &self,
        table: Table,
        filters: &[(String, String)],
        limit: usize,
    ) -> Result<Vec<Record>, StoreError>;

    /// Insert a row built from `fields`; returns the stored record.
    fn insert(&self, table: Table, fields: Record) -> Result<Record, StoreError>;

    fn get(&self, table: Table, row_id: &str) -> Result<Record, StoreError>;

    /// Apply a partial update; returns the updated record.
    fn update(&self, table: Table, row_id: &str, fields: Record) -> Result<Record, StoreError>;

    /// Remove a row; returns the removed record.
    fn delete(&self, table: Table, row_id: &str) -> Result<Record, StoreError>;

    /// Number of rows in `table`.
    fn count(&self, table: Table) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(-5), 1);
        assert_eq!(clamp_limit(20), 20);
        assert_eq!(clamp_limit(10_000), MAX_LIMIT);
    }

    #[test]
    fn test_unknown_table_lists_valid_names() {
        let msg = StoreError::UnknownTable("memory.nope".into()).to_string();
        assert!(msg.contains("memory.nope"));
        for table in Table::ALL {
            assert!(msg.contains(table.qualified_name()));
        }
    }
}
