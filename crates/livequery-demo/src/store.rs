//! In-memory table store.
//!
//! Not thread-safe on its own terms: the demo only touches it from query and
//! write callables, which the coordinator runs one at a time.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreError;

type Tables = HashMap<String, BTreeMap<u64, String>>;

/// Tables of string rows keyed by id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
    next_id: u64,
    /// Table state at `begin`, restored by `rollback`.
    snapshot: Option<Tables>,
    commits: u64,
    rollbacks: u64,
}

/// Shared store handle.
pub type SharedStore = Arc<Mutex<MemoryStore>>;

/// Effect of an update on a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Updated {
    /// The value changed.
    Changed,
    /// The row already held this value.
    Unchanged,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty shared store.
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Insert a row and return its id.
    pub fn insert(&mut self, table: &str, value: impl Into<String>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(id, value.into());
        id
    }

    /// Replace the value of an existing row.
    pub fn update(&mut self, table: &str, id: u64, value: &str) -> Result<Updated, StoreError> {
        let row = self
            .tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(&id))
            .ok_or_else(|| StoreError::RowNotFound {
                table: table.to_string(),
                id,
            })?;

        if row == value {
            return Ok(Updated::Unchanged);
        }
        *row = value.to_string();
        Ok(Updated::Changed)
    }

    /// Delete a row, returning its value.
    pub fn delete(&mut self, table: &str, id: u64) -> Result<String, StoreError> {
        self.tables
            .get_mut(table)
            .and_then(|rows| rows.remove(&id))
            .ok_or_else(|| StoreError::RowNotFound {
                table: table.to_string(),
                id,
            })
    }

    /// Number of rows in a table.
    pub fn count(&self, table: &str) -> usize {
        self.tables.get(table).map(BTreeMap::len).unwrap_or(0)
    }

    /// All rows of a table in id order.
    pub fn rows(&self, table: &str) -> Vec<(u64, String)> {
        self.tables
            .get(table)
            .map(|rows| rows.iter().map(|(id, v)| (*id, v.clone())).collect())
            .unwrap_or_default()
    }

    /// Start a transaction. Changes made until `commit` or `rollback` can be
    /// undone.
    pub fn begin(&mut self) {
        self.snapshot = Some(self.tables.clone());
    }

    /// Keep the changes made since `begin`.
    pub fn commit(&mut self) {
        self.snapshot = None;
        self.commits += 1;
    }

    /// Number of committed writes.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Undo the changes made since `begin`.
    pub fn rollback(&mut self) {
        if let Some(tables) = self.snapshot.take() {
            self.tables = tables;
        }
        self.rollbacks += 1;
    }

    /// Number of rolled back writes.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_count() {
        let mut store = MemoryStore::new();
        let first = store.insert("todos", "write docs");
        let second = store.insert("todos", "ship it");

        assert_ne!(first, second);
        assert_eq!(store.count("todos"), 2);
        assert_eq!(store.count("users"), 0);
        assert_eq!(
            store.rows("todos"),
            vec![(first, "write docs".to_string()), (second, "ship it".to_string())]
        );
    }

    #[test]
    fn test_update() {
        let mut store = MemoryStore::new();
        let id = store.insert("todos", "draft");

        assert_eq!(store.update("todos", id, "final"), Ok(Updated::Changed));
        assert_eq!(store.update("todos", id, "final"), Ok(Updated::Unchanged));
        assert_eq!(
            store.update("todos", id + 1, "x"),
            Err(StoreError::RowNotFound {
                table: "todos".to_string(),
                id: id + 1
            })
        );
    }

    #[test]
    fn test_delete() {
        let mut store = MemoryStore::new();
        let id = store.insert("todos", "temp");

        assert_eq!(store.delete("todos", id).unwrap(), "temp");
        assert!(store.delete("todos", id).is_err());
        assert_eq!(store.count("todos"), 0);
    }

    #[test]
    fn test_rollback_restores_tables() {
        let mut store = MemoryStore::new();
        let kept = store.insert("todos", "kept");

        store.begin();
        store.insert("todos", "discarded");
        store.update("todos", kept, "changed").unwrap();
        store.rollback();

        assert_eq!(store.rows("todos"), vec![(kept, "kept".to_string())]);
        assert_eq!(store.rollbacks(), 1);
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn test_commit_keeps_changes() {
        let mut store = MemoryStore::new();

        store.begin();
        store.insert("todos", "kept");
        store.commit();
        store.rollback();

        assert_eq!(store.count("todos"), 1);
        assert_eq!(store.commits(), 1);
    }
}
