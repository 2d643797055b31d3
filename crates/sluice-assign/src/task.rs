//! Task and group types shared by the assignment operations
//!
//! A datastream group is a logical stream whose work is sharded into tasks.
//! Every task of a group carries the group name as its task prefix and a
//! subset of the group's partitions. Partition identifiers are opaque
//! strings; the engine never interprets them.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whole-fleet assignment snapshot: instance id to the tasks it runs.
pub type Assignment = HashMap<String, Vec<GroupTask>>;

/// Operator move directive: instance id to the partitions that should land
/// on it.
pub type TargetAssignment = HashMap<String, HashSet<String>>;

/// A unit of work carrying a subset of a group's partitions.
///
/// Tasks are identified by a stable `name` and are never mutated in place:
/// any partition change produces a successor task via [`GroupTask::successor`]
/// that lists the predecessor in `dependencies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTask {
    /// Stable task identity
    pub name: String,
    /// Task prefix, equal to the owning group's name
    pub group: String,
    /// Partitions currently owned by this task
    pub partitions: Vec<String>,
    /// Names of prior tasks whose partitions this task absorbed
    pub dependencies: Vec<String>,
}

impl GroupTask {
    /// Create a task with no partitions and no lineage.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            partitions: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Set the owned partitions.
    pub fn with_partitions(mut self, partitions: Vec<String>) -> Self {
        self.partitions = partitions;
        self
    }

    /// Create the replacement for this task after a partition change.
    ///
    /// The successor gets a fresh name under the same group prefix and
    /// records this task as its parent.
    pub fn successor(&self, partitions: Vec<String>) -> GroupTask {
        GroupTask {
            name: next_task_name(&self.group),
            group: self.group.clone(),
            partitions,
            dependencies: vec![self.name.clone()],
        }
    }
}

fn next_task_name(group: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let short = id.split('-').next().unwrap_or_default();
    format!("{group}-{short}")
}

/// The current partition set of one datastream group, supplied by the
/// connector on every rebalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPartitions {
    /// Group name, used as the task prefix
    pub group: String,
    /// All partitions of the group; ordering carries no meaning
    pub partitions: Vec<String>,
}

impl GroupPartitions {
    pub fn new(group: impl Into<String>, partitions: Vec<String>) -> Self {
        Self {
            group: group.into(),
            partitions,
        }
    }
}

/// Iterate the tasks of one group across a whole-fleet assignment.
pub fn group_tasks<'a>(
    assignment: &'a Assignment,
    group: &'a str,
) -> impl Iterator<Item = &'a GroupTask> {
    assignment
        .values()
        .flatten()
        .filter(move |task| task.group == group)
}
