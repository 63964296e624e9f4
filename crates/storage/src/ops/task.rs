//! Proof task operation interface.

use std::{sync::Arc, time::Duration};

use synccommittee_db::{traits::TaskDatabase, DbResult};
use synccommittee_primitives::{
    ids::{BatchId, ExecutorId, TaskId},
    task::{Task, TaskEntry, TaskFilter, TaskResult, TaskStats, TaskTreeView, TaskView},
};

use crate::exec::*;

/// Database context for the task operation interface.
pub struct Context {
    db: Arc<dyn TaskDatabase>,
}

impl Context {
    pub fn new(db: Arc<dyn TaskDatabase>) -> Self {
        Self { db }
    }

    pub fn into_ops(self, pool: threadpool::ThreadPool) -> TaskDbOps {
        TaskDbOps::new(pool, Arc::new(self))
    }
}

inst_ops! {
    (TaskDbOps, Context) {
        add_task_entries(entries: Vec<TaskEntry>) => ();
        try_get_task_entry(id: TaskId) => Option<TaskEntry>;
        request_task_to_execute(executor: ExecutorId) => Option<Task>;
        process_task_result(result: TaskResult) => Option<TaskEntry>;
        reschedule_hanging_tasks(execution_timeout: Duration) => Vec<TaskId>;
        remove_batch_tasks(batch_ids: Vec<BatchId>) => usize;
        get_task_stats() => TaskStats;
        get_task_views(filter: TaskFilter) => Vec<TaskView>;
        get_task_tree_view(root: TaskId) => Option<TaskTreeView>;
    }
}

fn add_task_entries(ctx: &Context, entries: Vec<TaskEntry>) -> DbResult<()> {
    ctx.db.add_task_entries(entries)
}

fn try_get_task_entry(ctx: &Context, id: TaskId) -> DbResult<Option<TaskEntry>> {
    ctx.db.try_get_task_entry(id)
}

fn request_task_to_execute(ctx: &Context, executor: ExecutorId) -> DbResult<Option<Task>> {
    ctx.db.request_task_to_execute(executor)
}

fn process_task_result(ctx: &Context, result: TaskResult) -> DbResult<Option<TaskEntry>> {
    ctx.db.process_task_result(result)
}

fn reschedule_hanging_tasks(ctx: &Context, execution_timeout: Duration) -> DbResult<Vec<TaskId>> {
    ctx.db.reschedule_hanging_tasks(execution_timeout)
}

fn remove_batch_tasks(ctx: &Context, batch_ids: Vec<BatchId>) -> DbResult<usize> {
    ctx.db.remove_batch_tasks(&batch_ids)
}

fn get_task_stats(ctx: &Context) -> DbResult<TaskStats> {
    ctx.db.get_task_stats()
}

fn get_task_views(ctx: &Context, filter: TaskFilter) -> DbResult<Vec<TaskView>> {
    ctx.db.get_task_views(&filter)
}

fn get_task_tree_view(ctx: &Context, root: TaskId) -> DbResult<Option<TaskTreeView>> {
    ctx.db.get_task_tree_view(root)
}

#[cfg(test)]
mod tests {
    use synccommittee_db::traits::MockTaskDatabase;

    use super::*;
    use crate::exec::ops_pool;

    #[tokio::test]
    async fn test_owned_args_are_forwarded() {
        let batches = vec![BatchId::new(), BatchId::new()];
        let expected = batches.clone();
        let mut db = MockTaskDatabase::new();
        db.expect_remove_batch_tasks()
            .withf(move |ids| ids == expected.as_slice())
            .returning(|ids| Ok(ids.len()));
        let ops = Context::new(Arc::new(db)).into_ops(ops_pool(2));

        assert_eq!(ops.remove_batch_tasks_async(batches).await.unwrap(), 2);
    }

    #[test]
    fn test_blocking_variant_runs_inline() {
        let mut db = MockTaskDatabase::new();
        db.expect_get_task_stats()
            .returning(|| Ok(TaskStats::default()));
        let ops = Context::new(Arc::new(db)).into_ops(ops_pool(1));

        assert_eq!(ops.get_task_stats_blocking().unwrap().total(), 0);
    }
}
