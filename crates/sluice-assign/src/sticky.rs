//! Sticky partition assignment
//!
//! Two operations over a whole-fleet assignment snapshot:
//!
//! - [`PartitionAssignment::assign_partitions`] absorbs a changed partition
//!   set by mutating existing tasks in place where possible. Unassigned
//!   partitions are shuffled before distribution so that successive
//!   rebalances do not hotspot a single task when partition sets grow in a
//!   predictable order.
//! - [`PartitionAssignment::move_partitions`] relocates a designated
//!   partition subset to operator-chosen instances. Each task is replaced at
//!   most once, and the receiving task records every source task it took a
//!   partition from.
//!
//! Both operations finish with a sanity check that every partition of the
//! group appears in exactly one task; a violation is fatal and no partial
//! result escapes.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::{AssignError, Result};
use crate::task::{group_tasks, Assignment, GroupPartitions, GroupTask, TargetAssignment};

/// Partition distribution as a capability layered over a task-count
/// stabilizing strategy.
///
/// Implementations may randomize tie-breaking; both operations are otherwise
/// pure functions of their inputs.
pub trait PartitionAssignment {
    /// Rebalance a group's partitions across its existing tasks.
    fn assign_partitions(
        &mut self,
        current: &Assignment,
        metadata: &GroupPartitions,
    ) -> Result<Assignment>;

    /// Relocate the partitions named by `target` onto the requested
    /// instances.
    fn move_partitions(
        &mut self,
        current: &Assignment,
        target: &TargetAssignment,
        metadata: &GroupPartitions,
    ) -> Result<Assignment>;
}

/// Sticky assigner: minimizes task mutations and keeps the per-group task
/// count unchanged.
pub struct StickyPartitionAssigner<R: Rng = StdRng> {
    rng: R,
}

impl StickyPartitionAssigner<StdRng> {
    /// Create an assigner seeded from system entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create an assigner with a fixed seed for reproducible shuffles.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for StickyPartitionAssigner<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> StickyPartitionAssigner<R> {
    /// Create an assigner driving its shuffle from the given source of
    /// entropy.
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> PartitionAssignment for StickyPartitionAssigner<R> {
    fn assign_partitions(
        &mut self,
        current: &Assignment,
        metadata: &GroupPartitions,
    ) -> Result<Assignment> {
        let group = metadata.group.as_str();
        debug!(group, "computing sticky partition assignment");

        let mut assigned: HashSet<&str> = HashSet::new();
        let mut task_count = 0usize;
        for task in group_tasks(current, group) {
            task_count += 1;
            assigned.extend(task.partitions.iter().map(String::as_str));
        }
        if task_count == 0 {
            return Err(AssignError::NoGroupTasks(metadata.group.clone()));
        }

        let live: HashSet<&str> = metadata.partitions.iter().map(String::as_str).collect();
        let mut unassigned: Vec<String> = metadata
            .partitions
            .iter()
            .filter(|p| !assigned.contains(p.as_str()))
            .cloned()
            .collect();
        unassigned.shuffle(&mut self.rng);

        let base = metadata.partitions.len() / task_count;
        // this many tasks may carry one extra partition
        let mut remainder = metadata.partitions.len() % task_count;
        debug!(base, remainder, task_count, "per-task allowances");

        let mut next = Assignment::with_capacity(current.len());
        for (instance, tasks) in current {
            let mut next_tasks = Vec::with_capacity(tasks.len());
            for task in tasks {
                if task.group != group {
                    next_tasks.push(task.clone());
                    continue;
                }

                let mut partitions: Vec<String> = task
                    .partitions
                    .iter()
                    .filter(|p| live.contains(p.as_str()))
                    .cloned()
                    .collect();
                let mut changed = partitions.len() != task.partitions.len();

                let allowed = if remainder > 0 { base + 1 } else { base };
                while partitions.len() < allowed {
                    match unassigned.pop() {
                        Some(p) => {
                            partitions.push(p);
                            changed = true;
                        }
                        None => break,
                    }
                }
                if remainder > 0 {
                    remainder -= 1;
                }

                if changed {
                    next_tasks.push(task.successor(partitions));
                } else {
                    next_tasks.push(task.clone());
                }
            }
            next.insert(instance.clone(), next_tasks);
        }

        info!(
            group,
            partitions = metadata.partitions.len(),
            tasks = task_count,
            "computed new partition assignment"
        );
        validate(&next, metadata)?;
        Ok(next)
    }

    fn move_partitions(
        &mut self,
        current: &Assignment,
        target: &TargetAssignment,
        metadata: &GroupPartitions,
    ) -> Result<Assignment> {
        let group = metadata.group.as_str();
        info!(group, targets = target.len(), "moving partitions");

        // target entries for partitions no longer in the group are dropped
        let live: HashSet<&str> = metadata.partitions.iter().map(String::as_str).collect();
        let mut to_reassign: HashSet<&str> = HashSet::new();
        for wanted in target.values() {
            to_reassign.extend(
                wanted
                    .iter()
                    .map(String::as_str)
                    .filter(|p| live.contains(p)),
            );
        }

        // source task of every partition that is actually leaving a task
        let mut source_task: HashMap<String, String> = HashMap::new();
        let mut tasks_to_mutate: HashSet<String> = HashSet::new();
        for task in group_tasks(current, group) {
            let mut releases = false;
            for p in &task.partitions {
                if to_reassign.contains(p.as_str()) {
                    source_task.insert(p.clone(), task.name.clone());
                    releases = true;
                }
            }
            if releases {
                tasks_to_mutate.insert(task.name.clone());
            }
        }
        let to_release: HashSet<&str> = source_task.keys().map(String::as_str).collect();

        let mut next = Assignment::with_capacity(current.len());
        for (instance, tasks) in current {
            // partitions arriving on this instance, restricted to ones that
            // some task is actually releasing
            let to_move_in: Vec<&str> = target
                .get(instance)
                .map(|wanted| {
                    wanted
                        .iter()
                        .map(String::as_str)
                        .filter(|p| to_release.contains(p))
                        .collect()
                })
                .unwrap_or_default();

            let target_task = if to_move_in.is_empty() {
                None
            } else {
                // fewest partitions wins, first in traversal order on ties
                let mut chosen: Option<&GroupTask> = None;
                for candidate in tasks.iter().filter(|t| t.group == group) {
                    let better = match chosen {
                        Some(best) => candidate.partitions.len() < best.partitions.len(),
                        None => true,
                    };
                    if better {
                        chosen = Some(candidate);
                    }
                }
                match chosen {
                    Some(task) => Some(task.name.clone()),
                    None => {
                        return Err(AssignError::NoTargetTask {
                            group: metadata.group.clone(),
                            instance: instance.clone(),
                        })
                    }
                }
            };

            let mut next_tasks = Vec::with_capacity(tasks.len());
            for task in tasks {
                if task.group != group {
                    next_tasks.push(task.clone());
                    continue;
                }

                let mut changed = false;
                let mut partitions = task.partitions.clone();
                let mut extra_dependencies: Vec<String> = Vec::new();

                if tasks_to_mutate.contains(&task.name) {
                    partitions.retain(|p| !to_release.contains(p.as_str()));
                    changed = true;
                }

                if target_task.as_deref() == Some(task.name.as_str()) {
                    for p in &to_move_in {
                        partitions.push((*p).to_string());
                        if let Some(source) = source_task.get(*p) {
                            if !extra_dependencies.contains(source) {
                                extra_dependencies.push(source.clone());
                            }
                        }
                    }
                    changed = true;
                }

                if changed {
                    let mut replacement = task.successor(partitions);
                    for dependency in extra_dependencies {
                        if !replacement.dependencies.contains(&dependency) {
                            replacement.dependencies.push(dependency);
                        }
                    }
                    debug!(
                        from = %task.name,
                        to = %replacement.name,
                        "task replaced during move"
                    );
                    next_tasks.push(replacement);
                } else {
                    next_tasks.push(task.clone());
                }
            }
            next.insert(instance.clone(), next_tasks);
        }

        validate(&next, metadata)?;
        Ok(next)
    }
}

/// Verify that the group's assigned partitions are exactly the metadata
/// partitions: nothing missing, nothing duplicated, nothing extra.
fn validate(assignment: &Assignment, metadata: &GroupPartitions) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(metadata.partitions.len());
    let mut total = 0usize;
    for task in group_tasks(assignment, &metadata.group) {
        for p in &task.partitions {
            total += 1;
            if !seen.insert(p.as_str()) {
                return Err(AssignError::InvariantViolation(format!(
                    "partition {p} assigned to more than one task of group {}",
                    metadata.group
                )));
            }
        }
    }
    if total != metadata.partitions.len() {
        return Err(AssignError::InvariantViolation(format!(
            "assigned partition count {total} does not match expected {} for group {}",
            metadata.partitions.len(),
            metadata.group
        )));
    }
    for p in &metadata.partitions {
        if !seen.contains(p.as_str()) {
            return Err(AssignError::InvariantViolation(format!(
                "partition {p} of group {} is not assigned to any task",
                metadata.group
            )));
        }
    }
    Ok(())
}
