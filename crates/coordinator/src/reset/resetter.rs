use std::sync::Arc;

use synccommittee_primitives::ids::BatchId;
use synccommittee_storage::{BatchDbOps, TaskDbOps};
use tracing::*;

use crate::{
    errors::CoordinatorError,
    fetch::BlockFetcher,
    l1::{sync_proved_state_root, RollupContract},
};

/// Rewinds stored progress. Callers are expected to have suspended block
/// ingestion first.
#[derive(Clone)]
pub struct StateResetter {
    batch_ops: Arc<BatchDbOps>,
    task_ops: Arc<TaskDbOps>,
    rollup: Arc<dyn RollupContract>,
    fetcher: Arc<dyn BlockFetcher>,
}

impl StateResetter {
    pub fn new(
        batch_ops: Arc<BatchDbOps>,
        task_ops: Arc<TaskDbOps>,
        rollup: Arc<dyn RollupContract>,
        fetcher: Arc<dyn BlockFetcher>,
    ) -> Self {
        Self {
            batch_ops,
            task_ops,
            rollup,
            fetcher,
        }
    }

    /// Drops `first_to_purge` and every batch built on top of it together
    /// with their pending tasks. Returns the purged batch ids.
    pub async fn reset_progress_partial(
        &self,
        first_to_purge: BatchId,
    ) -> Result<Vec<BatchId>, CoordinatorError> {
        info!(%first_to_purge, "resetting progress starting from batch");

        let purged = self
            .batch_ops
            .reset_batches_range_async(first_to_purge)
            .await?;
        let removed_tasks = self
            .task_ops
            .remove_batch_tasks_async(purged.clone())
            .await?;

        info!(
            %first_to_purge,
            purged_batches = purged.len(),
            %removed_tasks,
            "partial progress reset completed"
        );
        Ok(purged)
    }

    /// Drops every batch that is not proved yet and re-reads the proved state
    /// root from L1. Fetching restarts from that root.
    pub async fn reset_progress_to_l1(&self) -> Result<Vec<BatchId>, CoordinatorError> {
        info!("resetting progress to the state finalized on L1");

        let purged = self.batch_ops.reset_batches_not_proved_async().await?;
        let removed_tasks = self
            .task_ops
            .remove_batch_tasks_async(purged.clone())
            .await?;
        sync_proved_state_root(
            self.rollup.as_ref(),
            self.fetcher.as_ref(),
            &self.batch_ops,
        )
        .await?;

        info!(
            purged_batches = purged.len(),
            %removed_tasks,
            "progress reset to L1 completed"
        );
        Ok(purged)
    }
}
