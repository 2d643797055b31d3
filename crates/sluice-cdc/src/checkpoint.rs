//! # Source checkpoints
//!
//! A checkpoint names the exact replication position a transaction batch was
//! emitted at. The token is opaque to this layer; the producer side persists
//! it and hands it back on restart so replication resumes after the last
//! durable batch.
//!
//! ## Format
//!
//! - source id: GTID source UUID (or the literal `None` for anonymous
//!   transactions)
//! - sequence: GTID sequence number
//! - file: binlog file the last event of the batch came from
//! - position: byte offset of that event
//!
//! Across successive commits the `(file, position)` pair never decreases.

use serde::{Deserialize, Serialize};

/// Replication position of one emitted transaction batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCheckpoint {
    /// GTID source UUID, or `None` for anonymous transactions
    pub source_id: String,
    /// GTID sequence number
    pub sequence: u64,
    /// Binlog file name
    pub file: String,
    /// Byte position within the file
    pub position: u64,
}

impl SourceCheckpoint {
    pub fn new(
        source_id: impl Into<String>,
        sequence: u64,
        file: impl Into<String>,
        position: u64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            sequence,
            file: file.into(),
            position,
        }
    }

    /// Render the opaque checkpoint token.
    pub fn to_token(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.source_id, self.sequence, self.file, self.position
        )
    }

    /// The `(file, position)` pair, used for monotonicity checks.
    pub fn file_position(&self) -> (&str, u64) {
        (&self.file, self.position)
    }
}

impl std::fmt::Display for SourceCheckpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_token())
    }
}
