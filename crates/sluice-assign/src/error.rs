//! Error types for assignment operations

use thiserror::Error;

/// Result type for assignment operations
pub type Result<T> = std::result::Result<T, AssignError>;

/// Failures surfaced by the assignment engine.
///
/// None of these are recoverable at this layer: the caller owns the fleet
/// snapshot and must abort the rebalance or surface the failure to the
/// operator. No partial assignment is ever returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssignError {
    /// The group has no tasks to assign partitions to
    #[error("no tasks exist for group {0}")]
    NoGroupTasks(String),

    /// A move targets an instance that runs no task of the group
    #[error("no task of group {group} is available on target instance {instance}")]
    NoTargetTask { group: String, instance: String },

    /// Post-assignment validation failed
    #[error("assignment validation failed: {0}")]
    InvariantViolation(String),
}
