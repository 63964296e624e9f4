use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use rockbound::{OptimisticTransactionDB, SchemaDBOperationsExt};
use synccommittee_common::clock::Clock;
use synccommittee_db::{errors::DbError, traits::TaskDatabase, DbResult};
use synccommittee_primitives::{
    ids::{BatchId, ExecutorId, TaskId},
    task::{
        graph::{find_cycle, DependentsIndex},
        Task, TaskEntry, TaskError, TaskFilter, TaskResult, TaskStats, TaskStatus, TaskTreeView,
        TaskView,
    },
    TimestampMs,
};
use tracing::*;

use super::schemas::{FailedTaskEntrySchema, TaskEntrySchema};
use crate::{txn::run_in_txn, utils::scan_table, DbOpsConfig};

/// Deepest dependency level rendered by [`TaskDatabase::get_task_tree_view`].
const TREE_VIEW_MAX_DEPTH: usize = 50;

pub struct TaskDb {
    db: Arc<OptimisticTransactionDB>,
    ops: DbOpsConfig,
    clock: Arc<dyn Clock>,
}

impl TaskDb {
    /// Wraps an existing database handle.
    ///
    /// Assumes it was opened with column families as defined in `STORE_COLUMN_FAMILIES`.
    pub fn new(db: Arc<OptimisticTransactionDB>, ops: DbOpsConfig, clock: Arc<dyn Clock>) -> Self {
        Self { db, ops, clock }
    }

    fn pending_entries(&self) -> DbResult<Vec<TaskEntry>> {
        Ok(scan_table::<TaskEntrySchema>(&self.db)?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect())
    }

    fn all_entries(&self) -> DbResult<Vec<TaskEntry>> {
        let mut entries = self.pending_entries()?;
        entries.extend(
            scan_table::<FailedTaskEntrySchema>(&self.db)?
                .into_iter()
                .map(|(_, entry)| entry),
        );
        Ok(entries)
    }
}

impl TaskDatabase for TaskDb {
    fn add_task_entries(&self, entries: Vec<TaskEntry>) -> DbResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut ids = BTreeSet::new();
        for entry in &entries {
            if !ids.insert(entry.id()) {
                return Err(DbError::TaskAlreadyExists(entry.id()));
            }
        }
        if let Some(id) = find_cycle(&entries) {
            return Err(DbError::DependencyCycle(id));
        }

        run_in_txn(&self.db, &self.ops, "add_task_entries", |txn| {
            for entry in &entries {
                let id = entry.id();
                if txn.get_for_update::<TaskEntrySchema>(&id)?.is_some()
                    || txn.get::<FailedTaskEntrySchema>(&id)?.is_some()
                {
                    return Err(DbError::TaskAlreadyExists(id));
                }
                txn.put::<TaskEntrySchema>(&id, entry)?;
            }
            Ok(())
        })?;

        debug!(count = entries.len(), "added task entries");
        Ok(())
    }

    fn try_get_task_entry(&self, id: TaskId) -> DbResult<Option<TaskEntry>> {
        if let Some(entry) = self.db.get::<TaskEntrySchema>(&id)? {
            return Ok(Some(entry));
        }
        Ok(self.db.get::<FailedTaskEntrySchema>(&id)?)
    }

    fn request_task_to_execute(&self, executor: ExecutorId) -> DbResult<Option<Task>> {
        if executor.is_unknown() {
            return Err(TaskError::UnknownExecutor.into());
        }

        let task = run_in_txn(&self.db, &self.ops, "request_task_to_execute", |txn| {
            let best = self
                .pending_entries()?
                .into_iter()
                .filter(TaskEntry::is_schedulable)
                .max_by(|a, b| a.cmp_priority(b));

            let Some(best) = best else {
                return Ok(None);
            };

            // the scan is not tracked, so re-read the chosen entry under the txn
            let mut entry = match txn.get_for_update::<TaskEntrySchema>(&best.id())? {
                Some(entry) if entry.is_schedulable() => entry,
                _ => return Err(DbError::TransactionConflict("task_entries")),
            };

            entry.start(executor, self.clock.now_ms())?;
            txn.put::<TaskEntrySchema>(&entry.id(), &entry)?;
            Ok(Some(entry.task))
        })?;

        if let Some(task) = &task {
            debug!(task_id = %task.id, task_type = %task.task_type, %executor, "task assigned");
        }
        Ok(task)
    }

    fn process_task_result(&self, result: TaskResult) -> DbResult<Option<TaskEntry>> {
        let task_id = result.task_id;

        let terminated = run_in_txn(&self.db, &self.ops, "process_task_result", |txn| {
            let Some(mut entry) = txn.get_for_update::<TaskEntrySchema>(&task_id)? else {
                return Ok(None);
            };
            let now = self.clock.now_ms();

            if result.is_success() {
                entry.terminate(&result, now)?;
                txn.delete::<TaskEntrySchema>(&task_id)?;

                let pending = self.pending_entries()?;
                let dependents = DependentsIndex::build(&pending);
                for dependent_id in dependents.dependents_of(&task_id) {
                    let Some(mut dependent) = txn.get_for_update::<TaskEntrySchema>(dependent_id)?
                    else {
                        continue;
                    };
                    if dependent.add_dependency_result(&result)? {
                        debug!(task_id = %dependent_id, "dependencies resolved, task is ready");
                    }
                    txn.put::<TaskEntrySchema>(dependent_id, &dependent)?;
                }
            } else if result.has_retryable_error() {
                entry.validate_for_result(&result)?;
                entry.reset_running()?;
                entry.last_error = result.error.clone();
                txn.put::<TaskEntrySchema>(&task_id, &entry)?;
            } else {
                entry.terminate(&result, now)?;
                txn.delete::<TaskEntrySchema>(&task_id)?;
                txn.put::<FailedTaskEntrySchema>(&task_id, &entry)?;
            }

            Ok(Some(entry))
        })?;

        match &terminated {
            Some(entry) => debug!(%task_id, status = %entry.status, "task result processed"),
            None => warn!(%task_id, "received result for unknown task, ignoring"),
        }
        Ok(terminated)
    }

    fn reschedule_hanging_tasks(&self, execution_timeout: Duration) -> DbResult<Vec<TaskId>> {
        let timeout_ms = execution_timeout.as_millis() as TimestampMs;

        run_in_txn(&self.db, &self.ops, "reschedule_hanging_tasks", |txn| {
            let now = self.clock.now_ms();
            let is_hanging = |entry: &TaskEntry| {
                entry.status == TaskStatus::Running
                    && entry
                        .started
                        .is_some_and(|started| now.saturating_sub(started) > timeout_ms)
            };

            let mut rescheduled = Vec::new();
            for candidate in self.pending_entries()?.iter().filter(|e| is_hanging(*e)) {
                let id = candidate.id();
                let Some(mut entry) = txn.get_for_update::<TaskEntrySchema>(&id)? else {
                    continue;
                };
                if !is_hanging(&entry) {
                    continue;
                }

                warn!(task_id = %id, owner = %entry.owner, "task execution timed out, rescheduling");
                entry.reset_running()?;
                txn.put::<TaskEntrySchema>(&id, &entry)?;
                rescheduled.push(id);
            }
            Ok(rescheduled)
        })
    }

    fn remove_batch_tasks(&self, batch_ids: &[BatchId]) -> DbResult<usize> {
        let batches: BTreeSet<BatchId> = batch_ids.iter().copied().collect();
        if batches.is_empty() {
            return Ok(0);
        }

        let removed = run_in_txn(&self.db, &self.ops, "remove_batch_tasks", |txn| {
            let mut removed = 0;
            for (id, entry) in scan_table::<TaskEntrySchema>(&self.db)? {
                if batches.contains(&entry.task.batch_id) {
                    txn.delete::<TaskEntrySchema>(&id)?;
                    removed += 1;
                }
            }
            for (id, entry) in scan_table::<FailedTaskEntrySchema>(&self.db)? {
                if batches.contains(&entry.task.batch_id) {
                    txn.delete::<FailedTaskEntrySchema>(&id)?;
                    removed += 1;
                }
            }
            Ok(removed)
        })?;

        info!(batches = batches.len(), tasks = removed, "removed batch tasks");
        Ok(removed)
    }

    fn get_task_stats(&self) -> DbResult<TaskStats> {
        let mut stats = TaskStats::default();
        for entry in self.all_entries()? {
            stats.add(&entry);
        }
        Ok(stats)
    }

    fn get_task_views(&self, filter: &TaskFilter) -> DbResult<Vec<TaskView>> {
        let now = self.clock.now_ms();
        Ok(self
            .all_entries()?
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| TaskView::new(e, now))
            .collect())
    }

    fn get_task_tree_view(&self, root: TaskId) -> DbResult<Option<TaskTreeView>> {
        let entries: BTreeMap<TaskId, TaskEntry> = self
            .all_entries()?
            .into_iter()
            .map(|e| (e.id(), e))
            .collect();

        let Some(root_entry) = entries.get(&root) else {
            return Ok(None);
        };

        let builder = TreeBuilder {
            entries: &entries,
            now: self.clock.now_ms(),
        };
        let mut path = Vec::new();
        builder.build(root_entry, 0, &mut path).map(Some)
    }
}

struct TreeBuilder<'a> {
    entries: &'a BTreeMap<TaskId, TaskEntry>,
    now: TimestampMs,
}

impl TreeBuilder<'_> {
    fn build(
        &self,
        entry: &TaskEntry,
        depth: usize,
        path: &mut Vec<TaskId>,
    ) -> DbResult<TaskTreeView> {
        let id = entry.id();
        if path.contains(&id) {
            return Err(DbError::DependencyCycle(id));
        }

        let mut view = TaskTreeView {
            task: TaskView::new(entry, self.now),
            resolved: entry.task.dependency_results.keys().copied().collect(),
            dependencies: Vec::new(),
        };
        if depth >= TREE_VIEW_MAX_DEPTH {
            return Ok(view);
        }

        path.push(id);
        for dep_id in &entry.pending_dependencies {
            match self.entries.get(dep_id) {
                Some(dep) => view.dependencies.push(self.build(dep, depth + 1, path)?),
                None => warn!(task_id = %id, dependency = %dep_id, "pending dependency is missing"),
            }
        }
        path.pop();

        Ok(view)
    }
}

#[cfg(feature = "test_utils")]
#[cfg(test)]
mod tests {
    use std::thread;

    use synccommittee_common::clock::ManualClock;
    use synccommittee_primitives::{
        block::{BlockRef, MAIN_SHARD_ID},
        buf::Buf32,
        task::{TaskErrType, TaskExecError, TaskType},
    };

    use super::*;
    use crate::test_utils::get_rocksdb_tmp_instance;

    const T0: TimestampMs = 1_000_000;

    fn setup_db() -> (Arc<TaskDb>, Arc<ManualClock>) {
        let (db, db_ops) = get_rocksdb_tmp_instance().unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        (Arc::new(TaskDb::new(db, db_ops, clock.clone())), clock)
    }

    fn block_ref(number: u64) -> BlockRef {
        BlockRef::new(MAIN_SHARD_ID, number, Buf32::new([number as u8; 32]))
    }

    /// Aggregate task with `n` block proofs feeding it.
    fn aggregate_with_blocks(n: u64) -> (TaskEntry, Vec<TaskEntry>) {
        let mut agg = TaskEntry::new_aggregate_proofs(BatchId::new(), T0);
        let blocks = (1..=n)
            .map(|i| TaskEntry::new_block_proof(&mut agg, &block_ref(i), T0))
            .collect();
        (agg, blocks)
    }

    fn executor(id: u32) -> ExecutorId {
        ExecutorId::new(id)
    }

    #[test]
    fn test_add_and_get() {
        let (db, _) = setup_db();
        let entry = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);

        db.add_task_entries(vec![entry.clone()]).unwrap();
        assert_eq!(db.try_get_task_entry(entry.id()).unwrap(), Some(entry));
        assert_eq!(db.try_get_task_entry(TaskId::new()).unwrap(), None);
    }

    #[test]
    fn test_add_existing_fails_whole_batch() {
        let (db, _) = setup_db();
        let existing = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);
        db.add_task_entries(vec![existing.clone()]).unwrap();

        let fresh = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);
        let res = db.add_task_entries(vec![fresh.clone(), existing.clone()]);
        assert!(matches!(res, Err(DbError::TaskAlreadyExists(id)) if id == existing.id()));

        assert_eq!(db.try_get_task_entry(fresh.id()).unwrap(), None);
    }

    #[test]
    fn test_add_rejects_cycle() {
        let (db, _) = setup_db();
        let mut a = TaskEntry::new_proving_stage(
            BatchId::new(),
            TaskType::MergeProof,
            Default::default(),
            T0,
        );
        let mut b = TaskEntry::new_proving_stage(
            a.task.batch_id,
            TaskType::AggregatedFri,
            Default::default(),
            T0,
        );
        a.add_dependency(b.id());
        b.add_dependency(a.id());

        let res = db.add_task_entries(vec![a, b]);
        assert!(matches!(res, Err(DbError::DependencyCycle(_))));
    }

    #[test]
    fn test_request_none_available() {
        let (db, _) = setup_db();
        assert_eq!(db.request_task_to_execute(executor(1)).unwrap(), None);

        let (agg, _) = aggregate_with_blocks(1);
        // waiting for input, not schedulable
        db.add_task_entries(vec![agg]).unwrap();
        assert_eq!(db.request_task_to_execute(executor(1)).unwrap(), None);
    }

    #[test]
    fn test_request_unknown_executor() {
        let (db, _) = setup_db();
        let res = db.request_task_to_execute(ExecutorId::UNKNOWN);
        assert!(matches!(
            res,
            Err(DbError::Task(TaskError::UnknownExecutor))
        ));
    }

    #[test]
    fn test_request_follows_priority() {
        let (db, clock) = setup_db();
        let older = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);
        let newer = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0 + 10);
        let mut agg = TaskEntry::new_aggregate_proofs(BatchId::new(), T0 + 20);
        agg.status = TaskStatus::WaitingForExecutor;
        db.add_task_entries(vec![newer.clone(), agg.clone(), older.clone()])
            .unwrap();

        clock.advance(Duration::from_secs(1));
        let first = db.request_task_to_execute(executor(1)).unwrap().unwrap();
        let second = db.request_task_to_execute(executor(1)).unwrap().unwrap();
        let third = db.request_task_to_execute(executor(2)).unwrap().unwrap();
        assert_eq!(first.id, agg.id());
        assert_eq!(second.id, older.id());
        assert_eq!(third.id, newer.id());

        let stored = db.try_get_task_entry(third.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
        assert_eq!(stored.owner, executor(2));
        assert_eq!(stored.started, Some(T0 + 1_000));
    }

    fn assert_single_assignment(requesters: u32) {
        let (db, _) = setup_db();
        let entry = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);
        db.add_task_entries(vec![entry.clone()]).unwrap();

        let handles: Vec<_> = (1..=requesters)
            .map(|i| {
                let db = db.clone();
                thread::spawn(move || db.request_task_to_execute(executor(i)))
            })
            .collect();

        let received: Vec<Task> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap().unwrap())
            .collect();

        assert_eq!(received.len(), 1, "task assigned {} times", received.len());
        assert_eq!(received[0].id, entry.id());
    }

    #[test]
    fn test_single_assignment_2_requesters() {
        assert_single_assignment(2);
    }

    #[test]
    fn test_single_assignment_10_requesters() {
        assert_single_assignment(10);
    }

    #[test]
    fn test_single_assignment_100_requesters() {
        assert_single_assignment(100);
    }

    #[test]
    fn test_success_propagates_to_dependent() {
        let (db, clock) = setup_db();
        let (agg, blocks) = aggregate_with_blocks(2);
        let agg_id = agg.id();
        let mut all = blocks.clone();
        all.push(agg);
        db.add_task_entries(all).unwrap();

        for _ in 0..2 {
            let task = db.request_task_to_execute(executor(7)).unwrap().unwrap();
            assert_eq!(task.task_type, TaskType::ProofBlock);
            clock.advance(Duration::from_secs(5));

            let result = TaskResult::success(task.id, executor(7), Default::default(), Vec::new());
            let entry = db.process_task_result(result).unwrap().unwrap();
            assert_eq!(entry.status, TaskStatus::Completed);
            assert_eq!(db.try_get_task_entry(task.id).unwrap(), None);
        }

        let agg = db.try_get_task_entry(agg_id).unwrap().unwrap();
        assert_eq!(agg.status, TaskStatus::WaitingForExecutor);
        assert!(agg.pending_dependencies.is_empty());
        assert_eq!(agg.task.dependency_results.len(), 2);

        let next = db.request_task_to_execute(executor(8)).unwrap().unwrap();
        assert_eq!(next.id, agg_id);
        assert_eq!(next.dependency_results.len(), 2);
    }

    #[test]
    fn test_double_delivery_is_ignored() {
        let (db, _) = setup_db();
        let entry = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);
        db.add_task_entries(vec![entry]).unwrap();

        let task = db.request_task_to_execute(executor(1)).unwrap().unwrap();
        let result = TaskResult::success(task.id, executor(1), Default::default(), Vec::new());

        assert!(db.process_task_result(result.clone()).unwrap().is_some());
        assert_eq!(db.process_task_result(result).unwrap(), None);
    }

    #[test]
    fn test_result_from_wrong_executor() {
        let (db, _) = setup_db();
        let entry = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);
        db.add_task_entries(vec![entry]).unwrap();

        let task = db.request_task_to_execute(executor(1)).unwrap().unwrap();
        let result = TaskResult::success(task.id, executor(2), Default::default(), Vec::new());

        let res = db.process_task_result(result);
        assert!(matches!(
            res,
            Err(DbError::Task(TaskError::WrongExecutor { .. }))
        ));
        let stored = db.try_get_task_entry(task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
    }

    #[test]
    fn test_retryable_failure_requeues() {
        let (db, _) = setup_db();
        let entry = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);
        db.add_task_entries(vec![entry]).unwrap();

        let task = db.request_task_to_execute(executor(1)).unwrap().unwrap();
        let error = TaskExecError::new(TaskErrType::Timeout, "prover timed out");
        let result = TaskResult::failure(task.id, executor(1), error.clone());

        let processed = db.process_task_result(result).unwrap().unwrap();
        assert_eq!(processed.status, TaskStatus::WaitingForExecutor);

        let stored = db.try_get_task_entry(task.id).unwrap().unwrap();
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.owner, ExecutorId::UNKNOWN);
        assert_eq!(stored.last_error, Some(error));

        let again = db.request_task_to_execute(executor(2)).unwrap().unwrap();
        assert_eq!(again.id, task.id);
    }

    #[test]
    fn test_terminal_failure_keeps_dependents_blocked() {
        let (db, _) = setup_db();
        let (agg, blocks) = aggregate_with_blocks(1);
        let agg_id = agg.id();
        db.add_task_entries(vec![agg, blocks[0].clone()]).unwrap();

        let task = db.request_task_to_execute(executor(1)).unwrap().unwrap();
        let error = TaskExecError::new(TaskErrType::InvalidInputData, "bad block");
        let result = TaskResult::failure(task.id, executor(1), error);

        let processed = db.process_task_result(result).unwrap().unwrap();
        assert_eq!(processed.status, TaskStatus::Failed);

        let failed = db.try_get_task_entry(task.id).unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);

        let agg = db.try_get_task_entry(agg_id).unwrap().unwrap();
        assert_eq!(agg.status, TaskStatus::WaitingForInput);
        assert!(agg.pending_dependencies.contains(&task.id));
        assert_eq!(db.request_task_to_execute(executor(1)).unwrap(), None);
    }

    #[test]
    fn test_reschedule_hanging_tasks() {
        let (db, clock) = setup_db();
        let entry = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);
        db.add_task_entries(vec![entry.clone()]).unwrap();
        db.request_task_to_execute(executor(3)).unwrap().unwrap();

        let timeout = Duration::from_secs(60);

        clock.set(T0 + 30_000);
        assert!(db.reschedule_hanging_tasks(timeout).unwrap().is_empty());
        let stored = db.try_get_task_entry(entry.id()).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);

        clock.set(T0 + 61_000);
        assert_eq!(db.reschedule_hanging_tasks(timeout).unwrap(), vec![entry.id()]);
        let stored = db.try_get_task_entry(entry.id()).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::WaitingForExecutor);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.owner, ExecutorId::UNKNOWN);
        assert_eq!(stored.started, None);
    }

    #[test]
    fn test_remove_batch_tasks() {
        let (db, _) = setup_db();
        let (agg, blocks) = aggregate_with_blocks(3);
        let batch_id = agg.task.batch_id;
        let other = TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), T0);
        let mut all = blocks;
        all.push(agg);
        all.push(other.clone());
        db.add_task_entries(all).unwrap();

        assert_eq!(db.remove_batch_tasks(&[batch_id]).unwrap(), 4);
        assert_eq!(db.get_task_stats().unwrap().total(), 1);
        assert!(db.try_get_task_entry(other.id()).unwrap().is_some());
        assert_eq!(db.remove_batch_tasks(&[]).unwrap(), 0);
    }

    #[test]
    fn test_stats_and_views() {
        let (db, _) = setup_db();
        let (agg, blocks) = aggregate_with_blocks(2);
        let mut all = blocks;
        all.push(agg);
        db.add_task_entries(all).unwrap();
        db.request_task_to_execute(executor(1)).unwrap().unwrap();

        let stats = db.get_task_stats().unwrap();
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.count_with_status(TaskStatus::Running), 1);
        assert_eq!(stats.count_with_status(TaskStatus::WaitingForExecutor), 1);
        assert_eq!(stats.count_with_status(TaskStatus::WaitingForInput), 1);

        let running = db
            .get_task_views(&TaskFilter::with_status(TaskStatus::Running))
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].owner, executor(1));
        assert_eq!(db.get_task_views(&TaskFilter::all()).unwrap().len(), 3);
    }

    #[test]
    fn test_tree_view() {
        let (db, _) = setup_db();
        let (agg, blocks) = aggregate_with_blocks(2);
        let agg_id = agg.id();
        let mut all = blocks;
        all.push(agg);
        db.add_task_entries(all).unwrap();

        let task = db.request_task_to_execute(executor(1)).unwrap().unwrap();
        let result = TaskResult::success(task.id, executor(1), Default::default(), Vec::new());
        db.process_task_result(result).unwrap();

        let tree = db.get_task_tree_view(agg_id).unwrap().unwrap();
        assert_eq!(tree.task.id, agg_id);
        assert_eq!(tree.resolved, vec![task.id]);
        assert_eq!(tree.dependencies.len(), 1);
        assert!(tree.dependencies[0].dependencies.is_empty());

        assert_eq!(db.get_task_tree_view(TaskId::new()).unwrap(), None);
    }
}
