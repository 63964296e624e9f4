//! Read-only projections of task entries for debugging and operator tooling.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use super::{
    entry::TaskEntry,
    result::TaskExecError,
    types::{CircuitType, TaskStatus, TaskType},
};
use crate::{
    ids::{BatchId, ExecutorId, TaskId},
    TimestampMs,
};

/// Flat view of a single task.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub batch_id: BatchId,
    pub task_type: TaskType,
    pub circuit_type: CircuitType,
    pub created: TimestampMs,
    pub execution_time: Option<Duration>,
    pub owner: ExecutorId,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub last_error: Option<TaskExecError>,
}

impl TaskView {
    pub fn new(entry: &TaskEntry, now: TimestampMs) -> Self {
        Self {
            id: entry.task.id,
            batch_id: entry.task.batch_id,
            task_type: entry.task.task_type,
            circuit_type: entry.task.circuit_type,
            created: entry.created,
            execution_time: entry.execution_time(now),
            owner: entry.owner,
            status: entry.status,
            retry_count: entry.retry_count,
            last_error: entry.last_error.clone(),
        }
    }
}

/// A task together with the tasks it depends on, recursively.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskTreeView {
    pub task: TaskView,
    /// Tasks whose results were already delivered and pruned from storage.
    pub resolved: Vec<TaskId>,
    pub dependencies: Vec<TaskTreeView>,
}

/// Task counts grouped by status and by type.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub by_status: BTreeMap<TaskStatus, u64>,
    pub by_type: BTreeMap<TaskType, u64>,
}

impl TaskStats {
    pub fn add(&mut self, entry: &TaskEntry) {
        *self.by_status.entry(entry.status).or_default() += 1;
        *self.by_type.entry(entry.task.task_type).or_default() += 1;
    }

    pub fn total(&self) -> u64 {
        self.by_status.values().sum()
    }

    pub fn count_with_status(&self, status: TaskStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or_default()
    }
}

/// Predicate selecting task entries for [`TaskView`] listings. Unset fields
/// match everything.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub batch_id: Option<BatchId>,
    pub owner: Option<ExecutorId>,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &TaskEntry) -> bool {
        self.status.map_or(true, |s| s == entry.status)
            && self.task_type.map_or(true, |t| t == entry.task.task_type)
            && self.batch_id.map_or(true, |b| b == entry.task.batch_id)
            && self.owner.map_or(true, |o| o == entry.owner)
    }
}
