use std::sync::Arc;

use synccommittee_primitives::{
    block::{Block, BlockId, BlockRef, BlockRefs},
    segment::{ChainSegments, ShardChainSegment},
};
use tracing::*;

use super::{BlockFetcher, BlockSelector};
use crate::errors::FetchError;

/// Collects the shard blocks a main shard block references that have not been
/// fetched yet.
#[derive(Clone)]
pub struct SubgraphFetcher {
    fetcher: Arc<dyn BlockFetcher>,
    page_size: u32,
}

impl SubgraphFetcher {
    pub fn new(fetcher: Arc<dyn BlockFetcher>, page_size: u32) -> Self {
        Self { fetcher, page_size }
    }

    /// Segments for `main_block` and every child shard that advanced past
    /// `latest_fetched`. Each child segment continues its shard's cursor.
    pub async fn fetch_subgraph(
        &self,
        main_block: &Block,
        latest_fetched: &BlockRefs,
    ) -> Result<ChainSegments, FetchError> {
        let mut segments = Vec::new();

        for child_id in main_block.child_block_ids()? {
            let cursor = latest_fetched.get(child_id.shard_id);
            if let Some(segment) = self.fetch_shard_segment(cursor, child_id).await? {
                segments.push(segment);
            }
        }

        segments.push(ShardChainSegment::new(vec![main_block.clone()])?);
        Ok(ChainSegments::new(segments)?)
    }

    async fn fetch_shard_segment(
        &self,
        cursor: Option<&BlockRef>,
        latest_in_subgraph: BlockId,
    ) -> Result<Option<ShardChainSegment>, FetchError> {
        let shard_id = latest_in_subgraph.shard_id;
        let selector = BlockSelector::Hash(latest_in_subgraph.hash);
        let latest = self
            .fetcher
            .get_block(shard_id, selector, true)
            .await?
            .ok_or(FetchError::NotFound { shard_id, selector })?;

        let latest_ref = latest.to_ref();
        if cursor == Some(&latest_ref) {
            debug!(%shard_id, cursor = %latest_ref, "no new blocks in subgraph");
            return Ok(None);
        }

        if let Some(cursor) = cursor {
            cursor.validate_descendant(&latest_ref)?;
        }

        let from = cursor.map_or(0, |c| c.number + 1);
        debug!(%shard_id, from, to = latest.number, "fetching chain segment");

        let mut blocks = self
            .fetcher
            .get_blocks_range(shard_id, from, latest.number, true, self.page_size)
            .await?;
        blocks.push(latest);

        Ok(Some(ShardChainSegment::new(blocks)?))
    }
}

#[cfg(test)]
mod tests {
    use synccommittee_primitives::block::MAIN_SHARD_ID;
    use synccommittee_test_utils::chain::TestChain;

    use super::*;
    use crate::{fetch::MockBlockFetcher, test_utils::TestChainFetcher};

    #[tokio::test]
    async fn test_fetches_from_genesis_without_cursor() {
        let fetcher = TestChainFetcher::new(TestChain::new(2));
        fetcher.with_chain(|c| c.next_segments(3));
        let main = fetcher.with_chain(|c| c.main_tip().clone());

        let subgraph = SubgraphFetcher::new(Arc::new(fetcher.clone()), 2);
        let segments = subgraph
            .fetch_subgraph(&main, &BlockRefs::new())
            .await
            .unwrap();

        // genesis plus three new blocks per child shard
        for shard_id in [1, 2] {
            let segment = segments.get(shard_id).unwrap();
            assert_eq!(segment.len(), 4);
            assert_eq!(segment.earliest().number, 0);
        }
        assert_eq!(segments.main().unwrap().latest(), &main);
    }

    #[tokio::test]
    async fn test_continues_cursors() {
        let fetcher = TestChainFetcher::new(TestChain::new(2));
        fetcher.with_chain(|c| c.next_segments(2));
        let cursors = fetcher.with_chain(|c| c.latest_refs());

        // shard 1 grows, shard 2 stays where it was
        fetcher.with_chain(|c| c.extend_shard(1, 3));
        let main = fetcher.with_chain(|c| c.extend_main());

        let subgraph = SubgraphFetcher::new(Arc::new(fetcher), 20);
        let segments = subgraph.fetch_subgraph(&main, &cursors).await.unwrap();

        let shard1 = segments.get(1).unwrap();
        assert_eq!(shard1.len(), 3);
        assert!(cursors.get(1).unwrap().validate_next(shard1.earliest()).is_ok());
        assert!(segments.get(2).is_none());
        assert_eq!(segments.main().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_ahead_of_subgraph_is_mismatch() {
        let fetcher = TestChainFetcher::new(TestChain::new(1));
        let old_main = fetcher.with_chain(|c| c.next_segments(1).main().unwrap().latest().clone());
        fetcher.with_chain(|c| c.next_segments(2));
        let cursors = fetcher.with_chain(|c| c.latest_refs());

        let subgraph = SubgraphFetcher::new(Arc::new(fetcher), 20);
        let err = subgraph
            .fetch_subgraph(&old_main, &cursors)
            .await
            .unwrap_err();
        assert!(err.is_block_mismatch(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_missing_child_block() {
        let mut fetcher = MockBlockFetcher::new();
        fetcher.expect_get_block().returning(|_, _, _| Ok(None));

        let mut chain = TestChain::new(1);
        let main = chain.next_segments(1).main().unwrap().latest().clone();
        assert_eq!(main.shard_id, MAIN_SHARD_ID);

        let subgraph = SubgraphFetcher::new(Arc::new(fetcher), 20);
        let err = subgraph
            .fetch_subgraph(&main, &BlockRefs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { shard_id: 1, .. }));
    }
}
