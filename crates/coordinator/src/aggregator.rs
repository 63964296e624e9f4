//! Ingestion of new main shard blocks into block batches.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use synccommittee_common::clock::Clock;
use synccommittee_db::DbError;
use synccommittee_primitives::{
    batch::BlockBatch,
    block::{get_blocks_fetching_range, Block, BlockRef, MAIN_SHARD_ID},
};
use synccommittee_storage::{BatchDbOps, TaskDbOps};
use synccommittee_tasks::ShutdownGuard;
use tracing::*;

use crate::{
    blob::BorshBlobBuilder,
    config::FetchingConfig,
    errors::{CoordinatorError, FetchError},
    fetch::{BlockFetcher, BlockSelector, SubgraphFetcher},
    l1::{sync_proved_state_root, RollupContract},
    reset::ResetLauncher,
    worker::SuspendableWorker,
};

pub const AGGREGATOR_NAME: &str = "aggregator";

pub struct Aggregator {
    fetcher: Arc<dyn BlockFetcher>,
    subgraph: SubgraphFetcher,
    batch_ops: Arc<BatchDbOps>,
    task_ops: Arc<TaskDbOps>,
    rollup: Arc<dyn RollupContract>,
    reset_launcher: Arc<dyn ResetLauncher>,
    worker: Arc<SuspendableWorker>,
    blob_builder: BorshBlobBuilder,
    clock: Arc<dyn Clock>,
    page_size: u32,
    failed_iterations: AtomicU64,
}

impl Aggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn BlockFetcher>,
        batch_ops: Arc<BatchDbOps>,
        task_ops: Arc<TaskDbOps>,
        rollup: Arc<dyn RollupContract>,
        reset_launcher: Arc<dyn ResetLauncher>,
        worker: Arc<SuspendableWorker>,
        clock: Arc<dyn Clock>,
        config: &FetchingConfig,
    ) -> Self {
        Self {
            subgraph: SubgraphFetcher::new(fetcher.clone(), config.fetch_page_size),
            fetcher,
            batch_ops,
            task_ops,
            rollup,
            reset_launcher,
            worker,
            blob_builder: BorshBlobBuilder::new(config.max_blobs_in_tx),
            clock,
            page_size: config.fetch_page_size,
            failed_iterations: AtomicU64::new(0),
        }
    }

    /// The worker driving this component. It is also what a state reset
    /// suspends.
    pub fn worker(&self) -> Arc<SuspendableWorker> {
        self.worker.clone()
    }

    /// Iterations that ended with an error no recovery path applies to.
    pub fn failed_iterations(&self) -> u64 {
        self.failed_iterations.load(Ordering::Relaxed)
    }

    pub async fn run(&self, shutdown: &ShutdownGuard) {
        if let Err(err) = self.ensure_state_root().await {
            error!(%err, "failed to initialize proved state root");
        }
        self.worker.run(shutdown, || self.run_iteration()).await;
    }

    pub async fn run_iteration(&self) {
        if let Err(err) = self.process_new_blocks().await {
            self.handle_error(err).await;
        }
    }

    async fn ensure_state_root(&self) -> Result<(), CoordinatorError> {
        if self.batch_ops.try_get_proved_state_root_async().await?.is_none() {
            self.sync_state_root().await?;
        }
        Ok(())
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

    async fn handle_error(&self, err: CoordinatorError) {
        match &err {
            err if err.is_block_mismatch() => {
                warn!(%err, "chain diverged from fetched blocks");
                self.reset_to_l1().await;
            }
            CoordinatorError::L1(l1_err) if l1_err.requires_reset() => {
                warn!(%err, "batch commit rejected by L1");
                self.reset_to_l1().await;
            }
            CoordinatorError::Db(DbError::StateRootNotInitialized) => {
                warn!("proved state root is not initialized, syncing with L1");
                if let Err(err) = self.sync_state_root().await {
                    error!(%err, "failed to sync proved state root");
                }
            }
            CoordinatorError::Db(DbError::CapacityLimitReached { current, limit }) => {
                info!(%current, %limit, "batch storage is full, waiting for batches to be proposed");
            }
            _ => {
                self.failed_iterations.fetch_add(1, Ordering::Relaxed);
                error!(%err, "failed to process new blocks");
            }
        }
    }

    async fn reset_to_l1(&self) {
        if let Err(err) = self
            .reset_launcher
            .launch_reset_to_l1_with_suspension(AGGREGATOR_NAME)
            .await
        {
            error!(%err, "failed to reset state to L1");
        }
    }

    async fn process_new_blocks(&self) -> Result<(), CoordinatorError> {
        let start = self.get_starting_ref().await?;

        let selector = BlockSelector::Latest;
        let latest = self
            .fetcher
            .get_block(MAIN_SHARD_ID, selector, false)
            .await?
            .ok_or(FetchError::NotFound {
                shard_id: MAIN_SHARD_ID,
                selector,
            })?;

        let free = self.batch_ops.get_free_space_batch_count_async().await?;
        if free == 0 {
            info!("no free space for new batches, skipping iteration");
            return Ok(());
        }

        let Some(range) = get_blocks_fetching_range(&start, &latest.to_ref(), free)? else {
            trace!(%start, "no new main shard blocks");
            return Ok(());
        };
        debug!(start = range.start, end = range.end, "fetching main shard blocks");

        let blocks = self
            .fetcher
            .get_blocks_range(MAIN_SHARD_ID, range.start, range.end + 1, true, self.page_size)
            .await?;

        for block in blocks {
            self.process_main_block(block).await?;
        }
        Ok(())
    }

    /// Main shard block the next fetch continues from: the latest fetched one
    /// if any, else the block of the proved state root. Either one missing from
    /// the chain is reported as a block mismatch.
    async fn get_starting_ref(&self) -> Result<BlockRef, CoordinatorError> {
        let latest_fetched = self.batch_ops.try_get_latest_fetched_async().await?;
        if let Some(main) = latest_fetched.main() {
            let on_chain = self
                .fetcher
                .get_block(MAIN_SHARD_ID, BlockSelector::Hash(main.hash), false)
                .await?;
            return match on_chain {
                Some(block) if block.to_ref() == *main => Ok(*main),
                _ => Err(FetchError::Reorged(*main).into()),
            };
        }

        let root = self
            .batch_ops
            .try_get_proved_state_root_async()
            .await?
            .ok_or(DbError::StateRootNotInitialized)?;
        let block = self
            .fetcher
            .get_block(MAIN_SHARD_ID, BlockSelector::Hash(root), false)
            .await?
            .ok_or(FetchError::UnknownStateRoot(root))?;
        Ok(block.to_ref())
    }

    async fn process_main_block(&self, main_block: Block) -> Result<(), CoordinatorError> {
        let latest_fetched = self.batch_ops.try_get_latest_fetched_async().await?;
        if let Some(main) = latest_fetched.main() {
            main.validate_next(&main_block)?;
        }

        let segments = self
            .subgraph
            .fetch_subgraph(&main_block, &latest_fetched)
            .await?;
        let parent_id = self.batch_ops.try_get_latest_batch_id_async().await?;
        let batch = BlockBatch::new(parent_id, segments)?;

        let blobs = self.blob_builder.make_blobs(&batch.to_pruned())?;
        let (sidecar, data_proofs) = self.rollup.prepare_blobs(blobs).await?;
        let batch = batch.with_data_proofs(data_proofs);

        let batch_id = batch.id;
        let blocks = batch.blocks().count();
        let task = batch.create_proof_task(self.clock.now_ms());
        self.batch_ops.set_block_batch_async(batch).await?;
        self.task_ops.add_task_entries_async(vec![task]).await?;
        self.rollup.commit_batch(sidecar, batch_id).await?;

        info!(
            %batch_id,
            main_block = %main_block.to_ref(),
            %blocks,
            "created block batch"
        );
        Ok(())
    }
}
