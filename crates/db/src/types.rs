//! Persisted records of the batch lifecycle store.

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use synccommittee_primitives::{
    batch::{BlockBatch, DataProofs},
    block::{Block, BlockId, BlockRefs},
    buf::Buf32,
    ids::BatchId,
    TimestampMs,
};

/// Stored form of a [`BlockBatch`]. Block bodies live in their own table and are
/// referenced by id.
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
pub struct BatchEntry {
    pub id: BatchId,
    pub parent_id: Option<BatchId>,
    pub main_parent_block_hash: Buf32,
    pub main_block_id: BlockId,
    /// Child shard blocks in shard order.
    pub exec_block_ids: Vec<BlockId>,
    pub parent_refs: BlockRefs,
    pub latest_refs: BlockRefs,
    pub data_proofs: DataProofs,
    pub is_proved: bool,
    pub created_at: TimestampMs,
}

impl BatchEntry {
    pub fn new(batch: &BlockBatch, created_at: TimestampMs) -> Self {
        let main = batch.main_block();
        Self {
            id: batch.id,
            parent_id: batch.parent_id,
            main_parent_block_hash: main.parent_hash,
            main_block_id: main.id(),
            exec_block_ids: batch.child_blocks().map(Block::id).collect(),
            parent_refs: batch.parent_refs(),
            latest_refs: batch.latest_refs(),
            data_proofs: batch.data_proofs.clone(),
            is_proved: false,
            created_at,
        }
    }

    /// Every block id of the batch, main block first.
    pub fn block_ids(&self) -> impl Iterator<Item = &BlockId> {
        std::iter::once(&self.main_block_id).chain(self.exec_block_ids.iter())
    }
}

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
pub struct BlockEntry {
    pub block: Block,
    pub batch_id: BatchId,
    pub fetched_at: TimestampMs,
}
