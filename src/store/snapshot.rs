//! In-memory record store with JSON snapshot persistence.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde_json::Value;

use crate::store::schema::{CREATED_AT, ROW_ID, UPDATED_AT};
use crate::store::{Record, RecordStore, StoreError, Table};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

fn now_iso() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

struct TableState {
    rows: DashMap<String, Record>,
    snapshot: Option<PathBuf>,
    /// Serialises snapshot writes for this table.
    save_lock: Mutex<()>,
}

impl TableState {
    fn new(snapshot: Option<PathBuf>) -> Self {
        Self {
            rows: DashMap::new(),
            snapshot,
            save_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let rows: Vec<Record> =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;

        for record in rows {
            let row_id = record.get(ROW_ID).and_then(Value::as_str).map(str::to_string);
            match row_id {
                Some(row_id) => {
                    self.rows.insert(row_id, record);
                }
                None => tracing::warn!(path = %path.display(), "Skipping snapshot row without row_id"),
            }
        }
        Ok(())
    }

    fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut rows: Vec<Record> = self.rows.iter().map(|r| r.value().clone()).collect();
        sort_newest_first(&mut rows);

        let tmp = path.with_extension("json.tmp");
        let io_err = |source: std::io::Error| StoreError::Io {
            path: tmp.clone(),
            source,
        };
        let file = File::create(&tmp).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &rows).map_err(|source| StoreError::Corrupt {
            path: tmp.clone(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        drop(writer);

        fs::rename(&tmp, path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), rows = rows.len(), "Saved snapshot");
        Ok(())
    }
}

/// `created_at` descending, then `row_id` ascending.
fn sort_newest_first(rows: &mut [Record]) {
    let key = |r: &Record, col: &str| r.get(col).and_then(Value::as_str).unwrap_or("").to_string();
    rows.sort_by(|a, b| {
        key(b, CREATED_AT)
            .cmp(&key(a, CREATED_AT))
            .then_with(|| key(a, ROW_ID).cmp(&key(b, ROW_ID)))
    });
}

/// Thread-safe record store backed by one `DashMap` per table.
#[derive(Clone)]
pub struct SnapshotStore {
    tables: Arc<HashMap<Table, TableState>>,
}

impl SnapshotStore {
    /// Store with no persistence.
    pub fn in_memory() -> Self {
        let tables = Table::ALL
            .into_iter()
            .map(|t| (t, TableState::new(None)))
            .collect();
        Self {
            tables: Arc::new(tables),
        }
    }

    /// Open a store under `data_dir`, loading existing snapshots.
    ///
    /// With `persist == false` nothing is read or written.
    pub fn open(data_dir: &Path, persist: bool) -> Result<Self, StoreError> {
        if !persist {
            return Ok(Self::in_memory());
        }

        fs::create_dir_all(data_dir).map_err(|source| StoreError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;

        let mut tables = HashMap::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            let path = data_dir.join(format!("{}.json", table.short_name()));
            let state = TableState::new(Some(path));
            state.load()?;
            tracing::info!(table = %table, rows = state.rows.len(), "Loaded table");
            tables.insert(table, state);
        }

        Ok(Self {
            tables: Arc::new(tables),
        })
    }

    fn state(&self, table: Table) -> &TableState {
        // Every table is inserted by both constructors.
        &self.tables[&table]
    }

    fn collect(&self, table: Table, limit: usize, keep: impl Fn(&Record) -> bool) -> Vec<Record> {
        let mut rows: Vec<Record> = self
            .state(table)
            .rows
            .iter()
            .filter(|r| keep(r.value()))
            .map(|r| r.value().clone())
            .collect();
        sort_newest_first(&mut rows);
        rows.truncate(limit);
        rows
    }

    fn not_found(table: Table, row_id: &str) -> StoreError {
        StoreError::NotFound {
            table,
            row_id: row_id.to_string(),
        }
    }
}

impl RecordStore for SnapshotStore {
    fn search(&self, table: Table, query: &str, limit: usize) -> Result<Vec<Record>, StoreError> {
        let schema = table.schema();
        let needle = query.to_lowercase();
        Ok(self.collect(table, limit, |r| schema.matches_query(r, &needle)))
    }

    fn list(
        &self,
        table: Table,
        filters: &[(String, String)],
        limit: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let schema = table.schema();
        let resolved = filters
            .iter()
            .map(|(param, value)| {
                schema
                    .filter(param)
                    .map(|f| (f, value.as_str()))
                    .ok_or_else(|| StoreError::UnknownFilter {
                        table,
                        param: param.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.collect(table, limit, |r| {
            resolved.iter().all(|(filter, value)| filter.matches(r, value))
        }))
    }

    fn insert(&self, table: Table, fields: Record) -> Result<Record, StoreError> {
        let mut record = table.schema().build_record(fields)?;
        let row_id = uuid::Uuid::new_v4().to_string();
        let now = now_iso();
        record.insert(ROW_ID.to_string(), Value::String(row_id.clone()));
        record.insert(CREATED_AT.to_string(), Value::String(now.clone()));
        record.insert(UPDATED_AT.to_string(), Value::String(now));

        let state = self.state(table);
        state.rows.insert(row_id, record.clone());
        state.save()?;
        Ok(record)
    }

    fn get(&self, table: Table, row_id: &str) -> Result<Record, StoreError> {
        self.state(table)
            .rows
            .get(row_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Self::not_found(table, row_id))
    }

    fn update(&self, table: Table, row_id: &str, fields: Record) -> Result<Record, StoreError> {
        if fields.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }

        let state = self.state(table);
        let updated = {
            let mut entry = state
                .rows
                .get_mut(row_id)
                .ok_or_else(|| Self::not_found(table, row_id))?;
            table.schema().apply_update(entry.value_mut(), fields)?;
            entry.insert(UPDATED_AT.to_string(), Value::String(now_iso()));
            entry.value().clone()
        };

        state.save()?;
        Ok(updated)
    }

    fn delete(&self, table: Table, row_id: &str) -> Result<Record, StoreError> {
        let state = self.state(table);
        let (_, removed) = state
            .rows
            .remove(row_id)
            .ok_or_else(|| Self::not_found(table, row_id))?;
        state.save()?;
        Ok(removed)
    }

    fn count(&self, table: Table) -> usize {
        self.state(table).rows.len()
    }
}
