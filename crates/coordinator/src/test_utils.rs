//! In-memory collaborators for exercising the coordinator without a node or
//! an L1 endpoint.

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use synccommittee_db::traits::{BatchDatabase, TaskDatabase};
use synccommittee_primitives::{
    batch::{DataProofs, ProposalData},
    block::{Block, BlockId, BlockNumber, ShardId},
    buf::Buf32,
    ids::BatchId,
};
use synccommittee_storage::{
    ops::{batch, task},
    ops_pool, BatchDbOps, TaskDbOps,
};
use synccommittee_test_utils::chain::TestChain;

use crate::{
    blob::Blob,
    errors::{FetchError, L1Error},
    fetch::{BlockFetcher, BlockSelector},
    l1::{BlobSidecar, RollupContract},
};

/// Wraps a store, real or mocked, in an ops handle with a private pool.
pub fn batch_ops<D: BatchDatabase + 'static>(db: Arc<D>) -> Arc<BatchDbOps> {
    Arc::new(batch::Context::new(db).into_ops(ops_pool(2)))
}

pub fn task_ops<D: TaskDatabase + 'static>(db: Arc<D>) -> Arc<TaskDbOps> {
    Arc::new(task::Context::new(db).into_ops(ops_pool(2)))
}

/// Serves blocks from a shared [`TestChain`] that tests keep growing.
#[derive(Clone)]
pub struct TestChainFetcher {
    chain: Arc<Mutex<TestChain>>,
}

impl TestChainFetcher {
    pub fn new(chain: TestChain) -> Self {
        Self {
            chain: Arc::new(Mutex::new(chain)),
        }
    }

    pub fn with_chain<R>(&self, f: impl FnOnce(&mut TestChain) -> R) -> R {
        f(&mut self.chain.lock())
    }
}

#[async_trait]
impl BlockFetcher for TestChainFetcher {
    async fn get_block(
        &self,
        shard_id: ShardId,
        selector: BlockSelector,
        _full: bool,
    ) -> Result<Option<Block>, FetchError> {
        let chain = self.chain.lock();
        let Some(blocks) = chain.shard_blocks(shard_id) else {
            return Ok(None);
        };

        let block = match selector {
            BlockSelector::Latest => blocks.last(),
            BlockSelector::Earliest => blocks.first(),
            BlockSelector::Number(n) => chain.block(shard_id, n),
            BlockSelector::Hash(hash) => chain.find(&BlockId::new(shard_id, hash)),
        };
        Ok(block.cloned())
    }

    async fn get_blocks_range(
        &self,
        shard_id: ShardId,
        from: BlockNumber,
        to: BlockNumber,
        _full: bool,
        _page_size: u32,
    ) -> Result<Vec<Block>, FetchError> {
        let chain = self.chain.lock();
        Ok((from..to)
            .filter_map(|n| chain.block(shard_id, n).cloned())
            .collect())
    }

    async fn get_shard_ids(&self) -> Result<Vec<ShardId>, FetchError> {
        Ok(self.chain.lock().shard_ids())
    }
}

#[derive(Debug, Default)]
struct RollupState {
    committed: Vec<BatchId>,
    committed_set: BTreeSet<BatchId>,
    updates: Vec<ProposalData>,
    finalized_root: Buf32,
    reject_commits: bool,
}

/// Rollup contract keeping its state in memory. Commits of the same batch
/// twice are rejected the way the contract does it, and state updates move
/// the finalized root forward.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRollup {
    state: Arc<Mutex<RollupState>>,
}

impl InMemoryRollup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> Vec<BatchId> {
        self.state.lock().committed.clone()
    }

    pub fn updates(&self) -> Vec<ProposalData> {
        self.state.lock().updates.clone()
    }

    pub fn set_finalized_root(&self, root: Buf32) {
        self.state.lock().finalized_root = root;
    }

    /// Makes every following commit fail as if the batch was committed by
    /// someone else.
    pub fn reject_commits(&self, reject: bool) {
        self.state.lock().reject_commits = reject;
    }
}

#[async_trait]
impl RollupContract for InMemoryRollup {
    async fn prepare_blobs(&self, blobs: Vec<Blob>) -> Result<(BlobSidecar, DataProofs), L1Error> {
        let commitments = blobs
            .iter()
            .map(|blob| {
                let mut commitment = [0u8; 32];
                for (i, byte) in blob.iter().enumerate() {
                    commitment[i % 32] ^= byte;
                }
                Buf32::new(commitment)
            })
            .collect();
        let proofs = vec![vec![0u8; 48]; blobs.len()];
        Ok((BlobSidecar { blobs, commitments }, proofs))
    }

    async fn commit_batch(&self, _sidecar: BlobSidecar, batch_id: BatchId) -> Result<(), L1Error> {
        let mut state = self.state.lock();
        if state.reject_commits || !state.committed_set.insert(batch_id) {
            return Err(L1Error::AlreadyCommitted(batch_id));
        }
        state.committed.push(batch_id);
        Ok(())
    }

    async fn update_state(&self, data: ProposalData) -> Result<(), L1Error> {
        let mut state = self.state.lock();
        if !state.finalized_root.is_zero() && data.old_proved_state_root != state.finalized_root {
            return Err(L1Error::AlreadyFinalized(data.batch_id));
        }
        state.finalized_root = data.new_proved_state_root;
        state.updates.push(data);
        Ok(())
    }

    async fn latest_finalized_state_root(&self) -> Result<Buf32, L1Error> {
        Ok(self.state.lock().finalized_root)
    }
}
