//! Submission of proved batches to the rollup contract.

use std::sync::Arc;

use synccommittee_db::DbError;
use synccommittee_storage::BatchDbOps;
use synccommittee_tasks::ShutdownGuard;
use tracing::*;

use crate::{
    errors::{CoordinatorError, L1Error},
    fetch::BlockFetcher,
    l1::{sync_proved_state_root, RollupContract},
    worker::SuspendableWorker,
};

pub const PROPOSER_NAME: &str = "proposer";

pub struct Proposer {
    batch_ops: Arc<BatchDbOps>,
    fetcher: Arc<dyn BlockFetcher>,
    rollup: Arc<dyn RollupContract>,
    worker: Arc<SuspendableWorker>,
}

impl Proposer {
    pub fn new(
        batch_ops: Arc<BatchDbOps>,
        fetcher: Arc<dyn BlockFetcher>,
        rollup: Arc<dyn RollupContract>,
        worker: Arc<SuspendableWorker>,
    ) -> Self {
        Self {
            batch_ops,
            fetcher,
            rollup,
            worker,
        }
    }

    pub fn worker(&self) -> Arc<SuspendableWorker> {
        self.worker.clone()
    }

    pub async fn run(&self, shutdown: &ShutdownGuard) {
        if let Err(err) = self.sync_state_root().await {
            error!(%err, "failed to sync proved state root on start");
        }
        self.worker.run(shutdown, || self.run_iteration()).await;
    }

    pub async fn run_iteration(&self) {
        match self.propose_next().await {
            Ok(_) => {}
            Err(CoordinatorError::Db(DbError::StateRootNotInitialized)) => {
                warn!("proved state root is not initialized, syncing with L1");
                if let Err(err) = self.sync_state_root().await {
                    error!(%err, "failed to sync proved state root");
                }
            }
            Err(err) => error!(%err, "failed to propose batch"),
        }
    }

    async fn sync_state_root(&self) -> Result<(), CoordinatorError> {
        sync_proved_state_root(
            self.rollup.as_ref(),
            self.fetcher.as_ref(),
            &self.batch_ops,
        )
        .await?;
        Ok(())
    }

    /// Proposes the next proved batch, if there is one. Returns whether a
    /// batch was proposed.
    async fn propose_next(&self) -> Result<bool, CoordinatorError> {
        let Some(data) = self.batch_ops.try_get_next_proposal_data_async().await? else {
            trace!("no proved batch to propose");
            return Ok(false);
        };

        let batch_id = data.batch_id;
        info!(
            %batch_id,
            old_root = %data.old_proved_state_root,
            new_root = %data.new_proved_state_root,
            txs = data.transactions.len(),
            "proposing batch"
        );

        match self.rollup.update_state(data).await {
            Ok(()) => {}
            Err(L1Error::AlreadyFinalized(_)) => {
                warn!(%batch_id, "batch is already finalized on L1, syncing state root");
                self.sync_state_root().await?;
            }
            Err(err) => return Err(err.into()),
        }

        self.batch_ops.set_batch_as_proposed_async(batch_id).await?;
        Ok(true)
    }
}
