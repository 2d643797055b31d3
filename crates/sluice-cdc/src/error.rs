//! Error types for the binlog assembler

use thiserror::Error;

/// Result type for assembler operations
pub type Result<T> = std::result::Result<T, CdcError>;

/// CDC assembler errors
#[derive(Debug, Error)]
pub enum CdcError {
    /// Downstream producer rejected a batch
    #[error("producer error: {0}")]
    Producer(String),

    /// Column metadata could not be resolved
    #[error("schema error: {0}")]
    Schema(String),

    /// The assembler observed a state it cannot continue from
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CdcError {
    /// Create a new producer error
    pub fn producer(msg: impl Into<String>) -> Self {
        Self::Producer(msg.into())
    }

    /// Create a new schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a new invalid-state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
