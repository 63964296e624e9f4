//! Access to the L2 chain and assembly of batch subgraphs from it.

mod subgraph;

use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use synccommittee_primitives::{
    block::{Block, BlockNumber, ShardId},
    buf::Buf32,
};

pub use subgraph::SubgraphFetcher;

use crate::errors::FetchError;

/// Which block of a shard to fetch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockSelector {
    Latest,
    Earliest,
    Number(BlockNumber),
    Hash(Buf32),
}

impl fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSelector::Latest => f.write_str("latest"),
            BlockSelector::Earliest => f.write_str("earliest"),
            BlockSelector::Number(n) => write!(f, "{n}"),
            BlockSelector::Hash(h) => write!(f, "{h}"),
        }
    }
}

/// Chain RPC client. Missing blocks are reported as `None`, not as errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlockFetcher: Send + Sync + 'static {
    async fn get_block(
        &self,
        shard_id: ShardId,
        selector: BlockSelector,
        full: bool,
    ) -> Result<Option<Block>, FetchError>;

    /// Blocks numbered `from..to`, requested `page_size` at a time.
    async fn get_blocks_range(
        &self,
        shard_id: ShardId,
        from: BlockNumber,
        to: BlockNumber,
        full: bool,
        page_size: u32,
    ) -> Result<Vec<Block>, FetchError>;

    /// Every shard of the chain, main shard included.
    async fn get_shard_ids(&self) -> Result<Vec<ShardId>, FetchError>;
}
