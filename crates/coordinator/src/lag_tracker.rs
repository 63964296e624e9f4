//! Periodic report of how far block fetching is behind the chain.

use std::{collections::BTreeMap, sync::Arc};

use synccommittee_primitives::block::{ShardId, MAIN_SHARD_ID};
use synccommittee_storage::BatchDbOps;
use synccommittee_tasks::ShutdownGuard;
use tracing::*;

use crate::{
    config::LagTrackerConfig,
    errors::{CoordinatorError, FetchError},
    fetch::{BlockFetcher, BlockSelector},
};

pub struct LagTracker {
    fetcher: Arc<dyn BlockFetcher>,
    batch_ops: Arc<BatchDbOps>,
    config: LagTrackerConfig,
}

impl LagTracker {
    pub fn new(
        fetcher: Arc<dyn BlockFetcher>,
        batch_ops: Arc<BatchDbOps>,
        config: LagTrackerConfig,
    ) -> Self {
        Self {
            fetcher,
            batch_ops,
            config,
        }
    }

    /// Number of blocks each shard is ahead of what was fetched. Shards never
    /// fetched lag by their whole height.
    pub async fn get_lag(&self) -> Result<BTreeMap<ShardId, u64>, CoordinatorError> {
        let latest_fetched = self.batch_ops.try_get_latest_fetched_async().await?;
        let mut lag = BTreeMap::new();

        for shard_id in self.fetcher.get_shard_ids().await? {
            let selector = BlockSelector::Latest;
            let latest = self
                .fetcher
                .get_block(shard_id, selector, false)
                .await?
                .ok_or(FetchError::NotFound { shard_id, selector })?;

            let behind = match latest_fetched.get(shard_id) {
                Some(fetched) => latest.number.saturating_sub(fetched.number),
                None => latest.number,
            };
            lag.insert(shard_id, behind);
        }
        Ok(lag)
    }

    pub async fn run(&self, shutdown: &ShutdownGuard) {
        let mut interval = tokio::time::interval(self.config.interval());
        info!("starting lag tracker");

        loop {
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => break,
                _ = interval.tick() => {}
            }

            match self.get_lag().await {
                Ok(lag) => {
                    for (shard_id, behind) in &lag {
                        let main = *shard_id == MAIN_SHARD_ID;
                        info!(%shard_id, %main, lag = %behind, "fetching lag");
                    }
                }
                Err(err) => warn!(%err, "failed to compute fetching lag"),
            }
        }
        info!("lag tracker stopped");
    }
}

#[cfg(test)]
mod tests {
    use synccommittee_db::traits::MockBatchDatabase;
    use synccommittee_primitives::block::BlockRefs;
    use synccommittee_test_utils::chain::TestChain;

    use super::*;
    use crate::test_utils::{batch_ops, TestChainFetcher};

    #[tokio::test]
    async fn test_lag_per_shard() {
        let fetcher = TestChainFetcher::new(TestChain::new(2));
        fetcher.with_chain(|c| c.next_segments(2));
        let fetched = fetcher.with_chain(|c| {
            let refs = c.latest_refs();
            c.extend_shard(1, 3);
            c.extend_main();
            refs
        });
        let fetched: BlockRefs = fetched
            .iter()
            .filter(|r| r.shard_id != 2)
            .copied()
            .collect();

        let mut batch_db = MockBatchDatabase::new();
        batch_db
            .expect_try_get_latest_fetched()
            .returning(move || Ok(fetched.clone()));

        let tracker = LagTracker::new(
            Arc::new(fetcher),
            batch_ops(Arc::new(batch_db)),
            LagTrackerConfig::default(),
        );
        let lag = tracker.get_lag().await.unwrap();

        assert_eq!(lag[&MAIN_SHARD_ID], 1);
        assert_eq!(lag[&1], 3);
        // never fetched, the whole shard is behind
        assert_eq!(lag[&2], 2);
    }
}
