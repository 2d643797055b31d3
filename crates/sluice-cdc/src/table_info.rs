//! Column metadata lookup and caching
//!
//! Binlog row events carry values by ordinal only; joining them with column
//! names and key flags requires metadata from the source database. The
//! provider is synchronous and its results are cacheable for the process
//! lifetime. Schema-change invalidation is not handled here: after an ALTER
//! the cache serves stale metadata until [`ColumnCache::invalidate`] is
//! called or the entry is evicted.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CdcError, Result};

/// Metadata of one table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Whether the column is part of the table key
    pub is_key: bool,
    /// Zero-based position within the row
    pub ordinal: usize,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, is_key: bool, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            is_key,
            ordinal,
        }
    }
}

/// Source of column metadata, typically backed by INFORMATION_SCHEMA.
pub trait TableInfoProvider: Send + Sync {
    /// Columns of `database.table` in ordinal order.
    fn column_list(&self, database: &str, table: &str) -> Result<Vec<ColumnInfo>>;
}

/// Map-backed provider for tests and embedded use.
#[derive(Debug, Default, Clone)]
pub struct StaticTableInfo {
    tables: HashMap<(String, String), Vec<ColumnInfo>>,
}

impl StaticTableInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the columns of one table.
    pub fn with_table(
        mut self,
        database: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnInfo>,
    ) -> Self {
        self.tables.insert((database.into(), table.into()), columns);
        self
    }
}

impl TableInfoProvider for StaticTableInfo {
    fn column_list(&self, database: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        self.tables
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .ok_or_else(|| CdcError::schema(format!("no column metadata for {database}.{table}")))
    }
}

/// Read-through cache of per-table column metadata.
///
/// Uses FIFO eviction when the cache exceeds the maximum size to prevent
/// unbounded memory growth. Safe for concurrent reads behind a lock with
/// single-writer semantics; the assembler owns it exclusively.
pub struct ColumnCache {
    tables: HashMap<(String, String), Vec<ColumnInfo>>,
    insertion_order: VecDeque<(String, String)>,
    max_entries: usize,
}

impl Default for ColumnCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnCache {
    /// Default maximum cache entries
    const DEFAULT_MAX_ENTRIES: usize = 1000;

    pub fn new() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }

    /// Create with a custom entry bound.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            tables: HashMap::new(),
            insertion_order: VecDeque::new(),
            max_entries,
        }
    }

    /// Cached columns for a table, or None if absent.
    pub fn get(&self, database: &str, table: &str) -> Option<&[ColumnInfo]> {
        self.tables
            .get(&(database.to_string(), table.to_string()))
            .map(Vec::as_slice)
    }

    /// Cache the columns of a table.
    pub fn insert(&mut self, database: &str, table: &str, columns: Vec<ColumnInfo>) {
        use std::collections::hash_map::Entry;

        let key = (database.to_string(), table.to_string());
        match self.tables.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(columns);
            }
            Entry::Vacant(entry) => {
                self.insertion_order.push_back(key);
                entry.insert(columns);

                while self.tables.len() > self.max_entries {
                    if let Some(oldest) = self.insertion_order.pop_front() {
                        self.tables.remove(&oldest);
                        debug!("evicted column cache entry for {}.{}", oldest.0, oldest.1);
                    } else {
                        break;
                    }
                }
            }
        }
    }

    /// Drop one table's entry, e.g. after a schema change.
    pub fn invalidate(&mut self, database: &str, table: &str) {
        let key = (database.to_string(), table.to_string());
        self.tables.remove(&key);
        self.insertion_order.retain(|k| *k != key);
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.insertion_order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<ColumnInfo> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ColumnInfo::new(*n, i == 0, i))
            .collect()
    }

    #[test]
    fn test_cache_basic() {
        let mut cache = ColumnCache::new();
        assert!(cache.is_empty());

        cache.insert("db", "users", columns(&["id", "name"]));
        assert_eq!(cache.len(), 1);

        let cached = cache.get("db", "users").unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].name, "id");
        assert!(cached[0].is_key);
        assert!(!cached[1].is_key);

        assert!(cache.get("db", "orders").is_none());
    }

    #[test]
    fn test_cache_update_existing() {
        let mut cache = ColumnCache::new();
        cache.insert("db", "users", columns(&["id"]));
        cache.insert("db", "users", columns(&["id", "name"]));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("db", "users").unwrap().len(), 2);
    }

    #[test]
    fn test_cache_fifo_eviction() {
        let mut cache = ColumnCache::with_max_entries(2);
        cache.insert("db", "t1", columns(&["a"]));
        cache.insert("db", "t2", columns(&["b"]));
        cache.insert("db", "t3", columns(&["c"]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("db", "t1").is_none());
        assert!(cache.get("db", "t2").is_some());
        assert!(cache.get("db", "t3").is_some());
    }

    #[test]
    fn test_cache_invalidate() {
        let mut cache = ColumnCache::new();
        cache.insert("db", "users", columns(&["id"]));
        cache.invalidate("db", "users");
        assert!(cache.get("db", "users").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_static_provider_miss_is_schema_error() {
        let provider = StaticTableInfo::new();
        let err = provider.column_list("db", "missing").unwrap_err();
        assert!(matches!(err, CdcError::Schema(_)));
    }

    #[test]
    fn test_static_provider_lookup() {
        let provider =
            StaticTableInfo::new().with_table("db", "users", columns(&["id", "email"]));
        let cols = provider.column_list("db", "users").unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[1].name, "email");
        assert_eq!(cols[1].ordinal, 1);
    }
}
