use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::{
    errors::TaskError,
    result::{TaskExecError, TaskResult, TaskResultDetails},
    types::{CircuitType, TaskStatus, TaskType},
};
use crate::{
    block::{BlockId, BlockNumber, BlockRef, ShardId, MAIN_SHARD_ID},
    buf::Buf32,
    ids::{BatchId, ExecutorId, TaskId},
    TimestampMs,
};

/// Unit of proof work handed to an executor.
#[derive(
    Clone,
    Debug,
    Eq,
    PartialEq,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct Task {
    pub id: TaskId,
    pub batch_id: BatchId,
    pub shard_id: ShardId,
    pub block_num: BlockNumber,
    pub block_hash: Buf32,
    /// Set for whole-batch tasks instead of a single block.
    pub block_ids: Vec<BlockId>,
    pub task_type: TaskType,
    pub circuit_type: CircuitType,
    pub parent_task_id: Option<TaskId>,
    pub dependency_results: BTreeMap<TaskId, TaskResult>,
}

impl Task {
    fn new(batch_id: BatchId, task_type: TaskType, circuit_type: CircuitType) -> Self {
        Self {
            id: TaskId::new(),
            batch_id,
            shard_id: MAIN_SHARD_ID,
            block_num: 0,
            block_hash: Buf32::zero(),
            block_ids: Vec::new(),
            task_type,
            circuit_type,
            parent_task_id: None,
            dependency_results: BTreeMap::new(),
        }
    }

    fn with_block(mut self, block: &BlockRef) -> Self {
        self.shard_id = block.shard_id;
        self.block_num = block.number;
        self.block_hash = block.hash;
        self
    }
}

/// Scheduling wrapper around a [`Task`].
///
/// Only forward edges are stored: `pending_dependencies` lists the tasks this
/// one waits on. The reverse direction is rebuilt with
/// [`DependentsIndex`](super::graph::DependentsIndex) when needed.
#[derive(
    Clone,
    Debug,
    Eq,
    PartialEq,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct TaskEntry {
    pub task: Task,
    pub pending_dependencies: BTreeSet<TaskId>,
    pub created: TimestampMs,
    pub started: Option<TimestampMs>,
    pub finished: Option<TimestampMs>,
    pub owner: ExecutorId,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub last_error: Option<TaskExecError>,
}

impl TaskEntry {
    fn new(task: Task, status: TaskStatus, created: TimestampMs) -> Self {
        Self {
            task,
            pending_dependencies: BTreeSet::new(),
            created,
            started: None,
            finished: None,
            owner: ExecutorId::UNKNOWN,
            status,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Whole-batch proof task, schedulable right away.
    pub fn new_batch_proof(batch_id: BatchId, block_ids: Vec<BlockId>, now: TimestampMs) -> Self {
        let mut task = Task::new(batch_id, TaskType::ProofBatch, CircuitType::None);
        task.block_ids = block_ids;
        Self::new(task, TaskStatus::WaitingForExecutor, now)
    }

    /// Aggregation task that waits for its block proofs.
    pub fn new_aggregate_proofs(batch_id: BatchId, now: TimestampMs) -> Self {
        let task = Task::new(batch_id, TaskType::AggregateProofs, CircuitType::None);
        Self::new(task, TaskStatus::WaitingForInput, now)
    }

    /// Block proof feeding `aggregate`, which gets it added as a dependency.
    pub fn new_block_proof(
        aggregate: &mut TaskEntry,
        block: &BlockRef,
        now: TimestampMs,
    ) -> Self {
        let mut task = Task::new(
            aggregate.task.batch_id,
            TaskType::ProofBlock,
            CircuitType::None,
        )
        .with_block(block);
        task.parent_task_id = Some(aggregate.task.id);

        let entry = Self::new(task, TaskStatus::WaitingForExecutor, now);
        aggregate.add_dependency(entry.task.id);
        entry
    }

    pub fn new_partial_prove(
        batch_id: BatchId,
        block: &BlockRef,
        circuit_type: CircuitType,
        now: TimestampMs,
    ) -> Self {
        let task = Task::new(batch_id, TaskType::PartialProve, circuit_type).with_block(block);
        Self::new(task, TaskStatus::WaitingForExecutor, now)
    }

    /// Intermediate proving stage that consumes outputs of other tasks.
    pub fn new_proving_stage(
        batch_id: BatchId,
        task_type: TaskType,
        circuit_type: CircuitType,
        now: TimestampMs,
    ) -> Self {
        let task = Task::new(batch_id, task_type, circuit_type);
        Self::new(task, TaskStatus::WaitingForInput, now)
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }

    /// Makes this task wait for `dependency`.
    pub fn add_dependency(&mut self, dependency: TaskId) {
        self.pending_dependencies.insert(dependency);
        if self.status == TaskStatus::WaitingForExecutor {
            self.status = TaskStatus::WaitingForInput;
        }
    }

    /// Records a dependency outcome. Only successful results resolve the
    /// dependency; returns whether the task became schedulable.
    pub fn add_dependency_result(&mut self, result: &TaskResult) -> Result<bool, TaskError> {
        if !self.pending_dependencies.contains(&result.task_id) {
            return Err(TaskError::NoSuchDependency {
                id: self.task.id,
                dependency: result.task_id,
            });
        }

        if !result.is_success() {
            return Ok(false);
        }

        self.pending_dependencies.remove(&result.task_id);
        self.task
            .dependency_results
            .insert(result.task_id, result.clone());

        if self.pending_dependencies.is_empty() && self.status == TaskStatus::WaitingForInput {
            self.status = TaskStatus::WaitingForExecutor;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn start(&mut self, executor: ExecutorId, now: TimestampMs) -> Result<(), TaskError> {
        if executor.is_unknown() {
            return Err(TaskError::UnknownExecutor);
        }
        if self.status != TaskStatus::WaitingForExecutor {
            return Err(self.invalid_status("start"));
        }

        self.status = TaskStatus::Running;
        self.owner = executor;
        self.started = Some(now);
        Ok(())
    }

    /// Checks that `result` may be applied to this entry.
    pub fn validate_for_result(&self, result: &TaskResult) -> Result<(), TaskError> {
        if result.task_id != self.task.id {
            return Err(TaskError::ResultMismatch {
                entry: self.task.id,
                result: result.task_id,
            });
        }
        if result.sender.is_unknown() {
            return Err(TaskError::UnknownExecutor);
        }
        if result.sender != self.owner {
            return Err(TaskError::WrongExecutor {
                id: self.task.id,
                owner: self.owner,
                sender: result.sender,
            });
        }
        if self.status != TaskStatus::Running {
            return Err(self.invalid_status("terminate"));
        }
        Ok(())
    }

    pub fn terminate(&mut self, result: &TaskResult, now: TimestampMs) -> Result<(), TaskError> {
        self.validate_for_result(result)?;

        self.status = if result.is_success() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.last_error = result.error.clone();
        self.finished = Some(now);
        Ok(())
    }

    /// Returns a running task to the queue, counting the attempt.
    pub fn reset_running(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::Running {
            return Err(self.invalid_status("reset"));
        }

        self.status = TaskStatus::WaitingForExecutor;
        self.owner = ExecutorId::UNKNOWN;
        self.started = None;
        self.retry_count += 1;
        Ok(())
    }

    pub fn execution_time(&self, now: TimestampMs) -> Option<Duration> {
        let started = self.started?;
        let until = self.finished.unwrap_or(now);
        Some(Duration::from_millis(until.saturating_sub(started)))
    }

    pub fn is_schedulable(&self) -> bool {
        self.status == TaskStatus::WaitingForExecutor
    }

    /// Scheduling order between two entries, `Greater` meaning `self` goes
    /// first. Aggregation tasks come first, then older tasks, then lower task
    /// types. The task id is the final tie-break so the order is total.
    pub fn cmp_priority(&self, other: &TaskEntry) -> Ordering {
        let self_agg = self.task.task_type == TaskType::AggregateProofs;
        let other_agg = other.task.task_type == TaskType::AggregateProofs;

        self_agg
            .cmp(&other_agg)
            .then_with(|| other.created.cmp(&self.created))
            .then_with(|| other.task.task_type.cmp(&self.task.task_type))
            .then_with(|| other.task.id.cmp(&self.task.id))
    }

    pub fn has_higher_priority(&self, other: &TaskEntry) -> bool {
        self.cmp_priority(other) == Ordering::Greater
    }

    pub fn result_details(&self, result: TaskResult, now: TimestampMs) -> TaskResultDetails {
        TaskResultDetails {
            result,
            task_type: self.task.task_type,
            circuit_type: self.task.circuit_type,
            execution_time: self.execution_time(now),
        }
    }

    fn invalid_status(&self, operation: &'static str) -> TaskError {
        TaskError::InvalidStatus {
            id: self.task.id,
            status: self.status,
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::result::TaskErrType;

    const EXECUTOR: ExecutorId = ExecutorId::new(42);

    fn block_ref(n: u64) -> BlockRef {
        BlockRef::new(MAIN_SHARD_ID, n, Buf32::new([n as u8; 32]))
    }

    fn running(now: TimestampMs) -> TaskEntry {
        let mut entry = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), 0);
        entry.start(EXECUTOR, now).unwrap();
        entry
    }

    #[test]
    fn test_start() {
        let mut entry = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), 0);

        assert_eq!(
            entry.start(ExecutorId::UNKNOWN, 5),
            Err(TaskError::UnknownExecutor)
        );

        entry.start(EXECUTOR, 5).unwrap();
        assert_eq!(entry.status, TaskStatus::Running);
        assert_eq!(entry.owner, EXECUTOR);
        assert_eq!(entry.started, Some(5));

        assert!(matches!(
            entry.start(EXECUTOR, 6),
            Err(TaskError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_start_waiting_for_input() {
        let mut entry = TaskEntry::new_aggregate_proofs(BatchId::new(), 0);
        assert!(matches!(
            entry.start(EXECUTOR, 1),
            Err(TaskError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_terminate() {
        let mut entry = running(10);
        let id = entry.id();

        let foreign = TaskResult::success(id, ExecutorId::new(7), BTreeMap::new(), Vec::new());
        assert!(matches!(
            entry.terminate(&foreign, 20),
            Err(TaskError::WrongExecutor { .. })
        ));

        let other_task =
            TaskResult::success(TaskId::new(), EXECUTOR, BTreeMap::new(), Vec::new());
        assert!(matches!(
            entry.terminate(&other_task, 20),
            Err(TaskError::ResultMismatch { .. })
        ));

        let ok = TaskResult::success(id, EXECUTOR, BTreeMap::new(), Vec::new());
        entry.terminate(&ok, 20).unwrap();
        assert_eq!(entry.status, TaskStatus::Completed);
        assert_eq!(entry.finished, Some(20));
        assert_eq!(entry.execution_time(100), Some(Duration::from_millis(10)));

        // already terminated
        assert!(matches!(
            entry.terminate(&ok, 30),
            Err(TaskError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_terminate_with_failure() {
        let mut entry = running(10);
        let err = TaskExecError::new(TaskErrType::ProofGenerationFailed, "bad witness");
        let res = TaskResult::failure(entry.id(), EXECUTOR, err.clone());

        entry.terminate(&res, 11).unwrap();
        assert_eq!(entry.status, TaskStatus::Failed);
        assert_eq!(entry.last_error, Some(err));
    }

    #[test]
    fn test_reset_running() {
        let mut entry = running(10);
        entry.reset_running().unwrap();

        assert_eq!(entry.status, TaskStatus::WaitingForExecutor);
        assert_eq!(entry.owner, ExecutorId::UNKNOWN);
        assert_eq!(entry.started, None);
        assert_eq!(entry.retry_count, 1);

        assert!(entry.reset_running().is_err());
    }

    #[test]
    fn test_dependency_resolution() {
        let mut agg = TaskEntry::new_aggregate_proofs(BatchId::new(), 0);
        let first = TaskEntry::new_block_proof(&mut agg, &block_ref(1), 0);
        let second = TaskEntry::new_block_proof(&mut agg, &block_ref(2), 0);

        assert_eq!(agg.pending_dependencies.len(), 2);
        assert_eq!(first.task.parent_task_id, Some(agg.id()));

        let ok_first = TaskResult::success(first.id(), EXECUTOR, BTreeMap::new(), Vec::new());
        assert!(!agg.add_dependency_result(&ok_first).unwrap());
        assert_eq!(agg.status, TaskStatus::WaitingForInput);

        // failed result keeps the dependency pending
        let failed = TaskResult::failure(
            second.id(),
            EXECUTOR,
            TaskExecError::new(TaskErrType::InvalidInputData, "nope"),
        );
        assert!(!agg.add_dependency_result(&failed).unwrap());
        assert!(agg.pending_dependencies.contains(&second.id()));

        let ok_second = TaskResult::success(second.id(), EXECUTOR, BTreeMap::new(), Vec::new());
        assert!(agg.add_dependency_result(&ok_second).unwrap());
        assert_eq!(agg.status, TaskStatus::WaitingForExecutor);
        assert_eq!(agg.task.dependency_results.len(), 2);

        // already resolved
        assert!(matches!(
            agg.add_dependency_result(&ok_second),
            Err(TaskError::NoSuchDependency { .. })
        ));
    }

    #[test]
    fn test_priority_order() {
        let batch = BatchId::new();
        let old_block = TaskEntry::new_partial_prove(batch, &block_ref(1), CircuitType::Zkevm, 1);
        let new_block = TaskEntry::new_partial_prove(batch, &block_ref(1), CircuitType::Zkevm, 2);
        let new_agg = TaskEntry::new_aggregate_proofs(batch, 100);

        assert!(new_agg.has_higher_priority(&old_block));
        assert!(old_block.has_higher_priority(&new_block));

        let same_time_batch = TaskEntry::new_batch_proof(batch, Vec::new(), 1);
        assert!(same_time_batch.has_higher_priority(&old_block));

        assert_eq!(old_block.cmp_priority(&old_block), Ordering::Equal);
        assert_eq!(
            old_block.cmp_priority(&new_block),
            new_block.cmp_priority(&old_block).reverse()
        );
    }
}
