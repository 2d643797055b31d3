//! Change records emitted to the downstream producer

use serde::{Deserialize, Serialize};

/// Row mutation operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeOp {
    /// Row inserted
    Insert,
    /// Row updated
    Update,
    /// Row deleted
    Delete,
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeOp::Insert => write!(f, "INSERT"),
            ChangeOp::Update => write!(f, "UPDATE"),
            ChangeOp::Delete => write!(f, "DELETE"),
        }
    }
}

/// A self-describing change captured from one binlog row.
///
/// `key` is the key-column projection, `value` the full-row projection; both
/// map column names to stringified values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Operation type
    pub op: ChangeOp,
    /// Transaction GTID as `<source-id>:<sequence>`
    pub gtid: String,
    /// Originating event timestamp (epoch millis)
    pub timestamp_ms: i64,
    /// Database name
    pub database: String,
    /// Table name
    pub table: String,
    /// Key-column projection
    pub key: serde_json::Value,
    /// Full-row projection
    pub value: serde_json::Value,
}

/// One transaction's records, handed to the producer as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerRecord {
    /// Destination partition
    pub partition: u32,
    /// Opaque checkpoint token for resuming after this batch
    pub checkpoint: String,
    /// Change records in binlog order
    pub records: Vec<ChangeRecord>,
}

impl ProducerRecord {
    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
