//! Block batches: a main shard block with the shard blocks it references.

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{
    block::{Block, BlockId, BlockRefs, Transaction},
    buf::Buf32,
    errors::ChainError,
    ids::BatchId,
    segment::ChainSegments,
    task::TaskEntry,
    TimestampMs,
};

/// KZG proofs of the blobs a batch was committed with.
pub type DataProofs = Vec<Vec<u8>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockBatch {
    pub id: BatchId,
    /// `None` only for the first batch ever created.
    pub parent_id: Option<BatchId>,
    main_block: Block,
    blocks: ChainSegments,
    pub data_proofs: DataProofs,
}

impl BlockBatch {
    /// Builds a new batch; the segments must contain exactly one main shard
    /// block.
    pub fn new(parent_id: Option<BatchId>, blocks: ChainSegments) -> Result<Self, ChainError> {
        let main_block = match blocks.main() {
            Some(main) if main.len() == 1 => main.earliest().clone(),
            Some(main) => return Err(ChainError::InvalidMainSegment(main.len())),
            None => return Err(ChainError::InvalidMainSegment(0)),
        };

        Ok(Self {
            id: BatchId::new(),
            parent_id,
            main_block,
            blocks,
            data_proofs: DataProofs::new(),
        })
    }

    pub fn with_data_proofs(mut self, data_proofs: DataProofs) -> Self {
        self.data_proofs = data_proofs;
        self
    }

    pub fn main_block(&self) -> &Block {
        &self.main_block
    }

    pub fn segments(&self) -> &ChainSegments {
        &self.blocks
    }

    /// Blocks in shard order, main shard first.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.blocks()
    }

    /// Child shard blocks, in shard order.
    pub fn child_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks().filter(|b| !b.is_main_shard())
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.block_ids()
    }

    pub fn earliest_refs(&self) -> BlockRefs {
        self.blocks.earliest_refs()
    }

    pub fn latest_refs(&self) -> BlockRefs {
        self.blocks.latest_refs()
    }

    pub fn parent_refs(&self) -> BlockRefs {
        self.blocks.parent_refs()
    }

    /// Creates the batch-level proof task covering every block of the batch.
    pub fn create_proof_task(&self, now: TimestampMs) -> TaskEntry {
        TaskEntry::new_batch_proof(self.id, self.block_ids(), now)
    }

    pub fn to_pruned(&self) -> PrunedBatch {
        PrunedBatch {
            batch_id: self.id,
            blocks: self.blocks().cloned().collect(),
        }
    }
}

/// Form of a batch that gets committed to L1 as blob data.
#[derive(
    Clone,
    Debug,
    Eq,
    PartialEq,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct PrunedBatch {
    pub batch_id: BatchId,
    pub blocks: Vec<Block>,
}

/// What has to be submitted to L1 to advance the proved state root.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProposalData {
    pub batch_id: BatchId,
    pub main_shard_block_hash: Buf32,
    /// Main shard transactions first, then child shards in shard order.
    pub transactions: Vec<Transaction>,
    pub old_proved_state_root: Buf32,
    pub new_proved_state_root: Buf32,
    pub main_block_fetched_at: TimestampMs,
    pub data_proofs: DataProofs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block::{ShardId, MAIN_SHARD_ID},
        segment::ShardChainSegment,
        task::{TaskStatus, TaskType},
    };

    fn block(shard_id: ShardId, number: u64, seed: u8) -> Block {
        Block {
            shard_id,
            number,
            hash: Buf32::new([seed; 32]),
            parent_hash: Buf32::new([seed.wrapping_sub(1); 32]),
            child_blocks: Vec::new(),
            timestamp: number,
            transactions: Vec::new(),
        }
    }

    fn segments(blocks: Vec<Vec<Block>>) -> ChainSegments {
        ChainSegments::new(
            blocks
                .into_iter()
                .map(|b| ShardChainSegment::new(b).unwrap())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_batch_requires_single_main_block() {
        let no_main = segments(vec![vec![block(1, 1, 10)]]);
        assert_eq!(
            BlockBatch::new(None, no_main),
            Err(ChainError::InvalidMainSegment(0))
        );

        let two_main = segments(vec![vec![block(MAIN_SHARD_ID, 1, 10), block(MAIN_SHARD_ID, 2, 11)]]);
        assert_eq!(
            BlockBatch::new(None, two_main),
            Err(ChainError::InvalidMainSegment(2))
        );
    }

    #[test]
    fn test_batch_proof_task_covers_all_blocks() {
        let batch = BlockBatch::new(
            None,
            segments(vec![
                vec![block(MAIN_SHARD_ID, 5, 50)],
                vec![block(1, 3, 30), block(1, 4, 31)],
            ]),
        )
        .unwrap();

        assert_eq!(batch.main_block().number, 5);
        assert_eq!(batch.child_blocks().count(), 2);

        let task = batch.create_proof_task(77);
        assert_eq!(task.task.task_type, TaskType::ProofBatch);
        assert_eq!(task.task.batch_id, batch.id);
        assert_eq!(task.task.block_ids, batch.block_ids());
        assert_eq!(task.status, TaskStatus::WaitingForExecutor);
        assert_eq!(task.created, 77);

        let pruned = batch.to_pruned();
        assert_eq!(pruned.blocks.len(), 3);
        assert!(pruned.blocks[0].is_main_shard());
    }
}
