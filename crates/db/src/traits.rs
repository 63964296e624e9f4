//! Trait definitions for the storage interfaces. Both stores share one
//! transactional engine but own disjoint tables.

use std::time::Duration;

#[cfg(feature = "mocks")]
use mockall::automock;
use synccommittee_primitives::{
    batch::{BlockBatch, ProposalData},
    block::{BlockId, BlockRefs},
    buf::Buf32,
    ids::{BatchId, ExecutorId, TaskId},
    task::{Task, TaskEntry, TaskFilter, TaskResult, TaskStats, TaskTreeView, TaskView},
};

use crate::{
    types::{BatchEntry, BlockEntry},
    DbResult,
};

/// Persisted proof task graph and the scheduling operations over it.
#[cfg_attr(feature = "mocks", automock)]
pub trait TaskDatabase: Send + Sync {
    /// Inserts all entries or none. Fails with `TaskAlreadyExists` if any id is
    /// taken.
    fn add_task_entries(&self, entries: Vec<TaskEntry>) -> DbResult<()>;

    /// Looks up a pending or failed task.
    fn try_get_task_entry(&self, id: TaskId) -> DbResult<Option<TaskEntry>>;

    /// Hands the highest priority schedulable task to `executor`, marking it
    /// running. A task is never handed to two executors.
    fn request_task_to_execute(&self, executor: ExecutorId) -> DbResult<Option<Task>>;

    /// Applies an executor's result, returning the terminated entry. Results for
    /// tasks that no longer exist are ignored and give `None`.
    fn process_task_result(&self, result: TaskResult) -> DbResult<Option<TaskEntry>>;

    /// Returns running tasks older than `execution_timeout` to the queue, and
    /// the ids of those tasks.
    fn reschedule_hanging_tasks(&self, execution_timeout: Duration) -> DbResult<Vec<TaskId>>;

    /// Deletes the pending tasks of the given batches, returning how many were
    /// removed.
    fn remove_batch_tasks(&self, batch_ids: &[BatchId]) -> DbResult<usize>;

    fn get_task_stats(&self) -> DbResult<TaskStats>;

    fn get_task_views(&self, filter: &TaskFilter) -> DbResult<Vec<TaskView>>;

    /// Dependency tree rooted at `root`, `None` if the task does not exist.
    fn get_task_tree_view(&self, root: TaskId) -> DbResult<Option<TaskTreeView>>;
}

/// Batch lifecycle: fetched, proved, proposed, deleted.
#[cfg_attr(feature = "mocks", automock)]
pub trait BatchDatabase: Send + Sync {
    /// Stores a freshly fetched batch, advancing the fetch cursors.
    fn set_block_batch(&self, batch: &BlockBatch) -> DbResult<()>;

    /// Marks a batch as proved, returning `false` if it already was.
    fn set_batch_as_proved(&self, id: BatchId) -> DbResult<bool>;

    /// Data of the next batch to submit to L1, if it is proved already.
    fn try_get_next_proposal_data(&self) -> DbResult<Option<ProposalData>>;

    /// Deletes a proposed batch and advances the proved state root to it.
    fn set_batch_as_proposed(&self, id: BatchId) -> DbResult<()>;

    /// Deletes `first_to_purge` and all of its descendants, rewinding the fetch
    /// cursors to its parent. Returns the purged ids, oldest first.
    fn reset_batches_range(&self, first_to_purge: BatchId) -> DbResult<Vec<BatchId>>;

    /// Deletes every batch that is not proved yet and clears the fetch cursors.
    /// Returns the purged ids.
    fn reset_batches_not_proved(&self) -> DbResult<Vec<BatchId>>;

    fn batch_exists(&self, id: BatchId) -> DbResult<bool>;

    fn try_get_batch(&self, id: BatchId) -> DbResult<Option<BatchEntry>>;

    /// How many more batches may be stored.
    fn get_free_space_batch_count(&self) -> DbResult<u32>;

    fn try_get_latest_batch_id(&self) -> DbResult<Option<BatchId>>;

    /// Latest fetched block of every shard seen so far.
    fn try_get_latest_fetched(&self) -> DbResult<BlockRefs>;

    fn try_get_block(&self, id: BlockId) -> DbResult<Option<BlockEntry>>;

    fn try_get_proved_state_root(&self) -> DbResult<Option<Buf32>>;

    fn set_proved_state_root(&self, root: Buf32) -> DbResult<()>;
}
