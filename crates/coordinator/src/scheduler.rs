//! Executor-facing API over the task storage.

use std::{cmp::Ordering, sync::Arc, time::Duration};

use synccommittee_primitives::{
    ids::{ExecutorId, TaskId},
    task::{Task, TaskFilter, TaskResult, TaskStats, TaskTreeView, TaskView},
};
use synccommittee_storage::TaskDbOps;
use synccommittee_tasks::ShutdownGuard;
use tracing::*;

use crate::{config::SchedulerConfig, errors::CoordinatorError, handler::TaskStateChangeHandler};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TaskOrder {
    #[default]
    CreatedAt,
    ExecutionTime,
}

/// Query of the debug task listing.
#[derive(Clone, Debug)]
pub struct TaskDebugRequest {
    pub filter: TaskFilter,
    pub order: TaskOrder,
    pub ascending: bool,
    pub limit: usize,
}

impl Default for TaskDebugRequest {
    fn default() -> Self {
        Self {
            filter: TaskFilter::all(),
            order: TaskOrder::default(),
            ascending: false,
            limit: 20,
        }
    }
}

pub struct TaskScheduler {
    task_ops: Arc<TaskDbOps>,
    handler: Arc<dyn TaskStateChangeHandler>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    pub fn new(
        task_ops: Arc<TaskDbOps>,
        handler: Arc<dyn TaskStateChangeHandler>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            task_ops,
            handler,
            config,
        }
    }

    pub async fn get_task(&self, executor: ExecutorId) -> Result<Option<Task>, CoordinatorError> {
        Ok(self.task_ops.request_task_to_execute_async(executor).await?)
    }

    /// Applies an executor's result. Results for tasks that no longer exist
    /// are dropped.
    pub async fn set_task_result(&self, result: TaskResult) -> Result<(), CoordinatorError> {
        let task_id = result.task_id;
        let Some(entry) = self.task_ops.try_get_task_entry_async(task_id).await? else {
            warn!(%task_id, sender = %result.sender, "received result for unknown task");
            return Ok(());
        };

        entry.validate_for_result(&result)?;
        self.handler.on_task_terminated(&entry.task, &result).await?;
        self.task_ops.process_task_result_async(result).await?;
        Ok(())
    }

    pub async fn get_task_stats(&self) -> Result<TaskStats, CoordinatorError> {
        Ok(self.task_ops.get_task_stats_async().await?)
    }

    pub async fn get_tasks(
        &self,
        request: &TaskDebugRequest,
    ) -> Result<Vec<TaskView>, CoordinatorError> {
        let filter = request.filter.clone();
        let mut views = self.task_ops.get_task_views_async(filter).await?;

        views.sort_by(|a, b| {
            let ord = match request.order {
                TaskOrder::CreatedAt => a.created.cmp(&b.created),
                TaskOrder::ExecutionTime => cmp_execution_time(a.execution_time, b.execution_time),
            };
            if request.ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        views.truncate(request.limit);
        Ok(views)
    }

    pub async fn get_task_tree(
        &self,
        root: TaskId,
    ) -> Result<Option<TaskTreeView>, CoordinatorError> {
        Ok(self.task_ops.get_task_tree_view_async(root).await?)
    }

    /// Returns tasks whose executors went silent to the queue until shutdown.
    pub async fn run(&self, shutdown: &ShutdownGuard) {
        let timeout = self.config.task_execution_timeout();
        let mut interval = tokio::time::interval(self.config.task_check_interval());
        info!(?timeout, "starting task scheduler");

        loop {
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => break,
                _ = interval.tick() => {}
            }

            match self.task_ops.reschedule_hanging_tasks_async(timeout).await {
                Ok(ids) if !ids.is_empty() => info!(count = ids.len(), "rescheduled hanging tasks"),
                Ok(_) => trace!("no hanging tasks"),
                Err(err) => error!(%err, "failed to reschedule hanging tasks"),
            }
        }
        info!("task scheduler stopped");
    }
}

// tasks that never ran sort as the shortest
fn cmp_execution_time(a: Option<Duration>, b: Option<Duration>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use synccommittee_common::clock::{Clock, ManualClock};
    use synccommittee_db::traits::{MockTaskDatabase, TaskDatabase};
    use synccommittee_primitives::{
        ids::BatchId,
        task::{TaskEntry, TaskErrType, TaskExecError, TaskStatus, TaskType},
    };
    use synccommittee_rocksdb::{test_utils::get_rocksdb_tmp_instance, TaskDb};
    use synccommittee_test_utils::ArbitraryGenerator;

    use super::*;
    use crate::{handler::MockTaskStateChangeHandler, test_utils::task_ops};

    const EXECUTOR: ExecutorId = ExecutorId::new(7);

    fn setup(handler: MockTaskStateChangeHandler) -> (TaskScheduler, Arc<TaskDb>, Arc<ManualClock>) {
        let (db, ops) = get_rocksdb_tmp_instance().unwrap();
        let clock = Arc::new(ManualClock::new(10_000));
        let task_db = Arc::new(TaskDb::new(db, ops, clock.clone() as Arc<dyn Clock>));
        let scheduler = TaskScheduler::new(
            task_ops(task_db.clone()),
            Arc::new(handler),
            SchedulerConfig::default(),
        );
        (scheduler, task_db, clock)
    }

    fn batch_entry() -> TaskEntry {
        TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), 10_000)
    }

    #[tokio::test]
    async fn test_result_goes_through_handler_then_storage() {
        let mut handler = MockTaskStateChangeHandler::new();
        handler
            .expect_on_task_terminated()
            .times(1)
            .returning(|_, _| Ok(()));
        let (scheduler, task_db, _) = setup(handler);

        let entry = batch_entry();
        task_db.add_task_entries(vec![entry.clone()]).unwrap();

        let task = scheduler.get_task(EXECUTOR).await.unwrap().unwrap();
        assert_eq!(task.id, entry.id());
        assert!(scheduler.get_task(EXECUTOR).await.unwrap().is_none());

        let payload: Vec<u8> = ArbitraryGenerator::new().generate();
        let result = TaskResult::success(task.id, EXECUTOR, Default::default(), payload);
        scheduler.set_task_result(result.clone()).await.unwrap();
        assert!(task_db.try_get_task_entry(task.id).unwrap().is_none());

        // repeated delivery is tolerated and does not reach the handler
        scheduler.set_task_result(result).await.unwrap();
    }

    #[tokio::test]
    async fn test_result_from_wrong_executor_is_rejected() {
        let mut handler = MockTaskStateChangeHandler::new();
        handler.expect_on_task_terminated().never();
        let (scheduler, task_db, _) = setup(handler);

        task_db.add_task_entries(vec![batch_entry()]).unwrap();
        let task = scheduler.get_task(EXECUTOR).await.unwrap().unwrap();

        let result = TaskResult::success(task.id, ExecutorId::new(8), Default::default(), vec![]);
        let err = scheduler.set_task_result(result).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Task(_)));

        let entry = task_db.try_get_task_entry(task.id).unwrap().unwrap();
        assert_eq!(entry.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_handler_error_keeps_task() {
        let mut handler = MockTaskStateChangeHandler::new();
        handler.expect_on_task_terminated().returning(|_, _| {
            Err(CoordinatorError::Reset(
                crate::errors::ResetError::ResetInProgress,
            ))
        });
        let (scheduler, task_db, _) = setup(handler);

        task_db.add_task_entries(vec![batch_entry()]).unwrap();
        let task = scheduler.get_task(EXECUTOR).await.unwrap().unwrap();

        let result = TaskResult::failure(
            task.id,
            EXECUTOR,
            TaskExecError::new(TaskErrType::ProofGenerationFailed, "bad witness"),
        );
        assert!(scheduler.set_task_result(result).await.is_err());
        assert!(task_db.try_get_task_entry(task.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_tasks_orders_and_limits() {
        let (scheduler, task_db, clock) = setup(MockTaskStateChangeHandler::new());

        let entries: Vec<_> = (0..3)
            .map(|i| TaskEntry::new_batch_proof(BatchId::new(), Vec::new(), 10_000 + i))
            .collect();
        task_db.add_task_entries(entries.clone()).unwrap();

        // only one of them has been running
        let running = scheduler.get_task(EXECUTOR).await.unwrap().unwrap();
        clock.advance(Duration::from_secs(5));

        let newest_first = scheduler
            .get_tasks(&TaskDebugRequest {
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(newest_first.len(), 2);
        assert_eq!(newest_first[0].id, entries[2].id());
        assert_eq!(newest_first[1].id, entries[1].id());

        let longest_first = scheduler
            .get_tasks(&TaskDebugRequest {
                order: TaskOrder::ExecutionTime,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(longest_first[0].id, running.id);
        assert_eq!(longest_first[0].execution_time, Some(Duration::from_secs(5)));

        let waiting = scheduler
            .get_tasks(&TaskDebugRequest {
                filter: TaskFilter::with_status(TaskStatus::WaitingForExecutor),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(waiting.len(), 2);
        assert!(waiting.iter().all(|v| v.task_type == TaskType::ProofBatch));
    }

    #[tokio::test]
    async fn test_task_tree() {
        let (scheduler, task_db, _) = setup(MockTaskStateChangeHandler::new());

        let mut aggregate = TaskEntry::new_aggregate_proofs(BatchId::new(), 10_000);
        let block = synccommittee_primitives::block::BlockRef::new(
            1,
            1,
            synccommittee_primitives::buf::Buf32::zero(),
        );
        let child = TaskEntry::new_block_proof(&mut aggregate, &block, 10_000);
        task_db
            .add_task_entries(vec![aggregate.clone(), child.clone()])
            .unwrap();

        let tree = scheduler.get_task_tree(aggregate.id()).await.unwrap().unwrap();
        assert_eq!(tree.task.id, aggregate.id());
        assert_eq!(tree.dependencies.len(), 1);
        assert_eq!(tree.dependencies[0].task.id, child.id());

        assert!(scheduler.get_task_tree(TaskId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_reschedules_until_shutdown() {
        let mut task_db = MockTaskDatabase::new();
        task_db
            .expect_reschedule_hanging_tasks()
            .withf(|timeout| *timeout == Duration::from_millis(50))
            .returning(|_| Ok(vec![TaskId::new()]));

        let config = SchedulerConfig {
            task_check_interval_ms: 5,
            task_execution_timeout_ms: 50,
        };
        let scheduler = Arc::new(TaskScheduler::new(
            task_ops(Arc::new(task_db)),
            Arc::new(MockTaskStateChangeHandler::new()),
            config,
        ));

        let manager = synccommittee_tasks::TaskManager::new(tokio::runtime::Handle::current());
        let executor = manager.executor();
        let s = scheduler.clone();
        let handle = executor.spawn_critical_async_with_shutdown("scheduler", |shutdown| async move {
            s.run(&shutdown).await;
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        executor.shutdown_signal().send();
        handle.await.unwrap();
    }
}
