//! In-memory multi-shard chains for building valid batches in tests.

use std::collections::BTreeMap;

use rand::random;
use synccommittee_primitives::{
    batch::BlockBatch,
    block::{Block, BlockId, BlockRef, BlockRefs, ShardId, Transaction, MAIN_SHARD_ID},
    buf::{Buf20, Buf32},
    ids::BatchId,
    segment::{ChainSegments, ShardChainSegment},
};

/// A main shard plus `child_shards` execution shards, each starting at a genesis
/// block. Main shard blocks reference the child shard tips at the time they are
/// produced.
#[derive(Clone, Debug)]
pub struct TestChain {
    shards: BTreeMap<ShardId, Vec<Block>>,
}

impl TestChain {
    pub fn new(child_shards: u32) -> Self {
        let mut shards = BTreeMap::new();
        for shard_id in 1..=child_shards {
            shards.insert(shard_id, vec![make_block(shard_id, 0, Buf32::zero())]);
        }

        let mut chain = Self { shards };
        let mut main_genesis = make_block(MAIN_SHARD_ID, 0, Buf32::zero());
        main_genesis.child_blocks = chain.child_tips();
        chain.shards.insert(MAIN_SHARD_ID, vec![main_genesis]);
        chain
    }

    pub fn child_shard_ids(&self) -> Vec<ShardId> {
        self.shards
            .keys()
            .copied()
            .filter(|id| *id != MAIN_SHARD_ID)
            .collect()
    }

    /// Every shard, main shard first.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.shards.keys().copied().collect()
    }

    pub fn shard_blocks(&self, shard_id: ShardId) -> Option<&[Block]> {
        self.shards.get(&shard_id).map(Vec::as_slice)
    }

    pub fn genesis(&self, shard_id: ShardId) -> &Block {
        &self.shards[&shard_id][0]
    }

    pub fn tip(&self, shard_id: ShardId) -> &Block {
        self.shards[&shard_id]
            .last()
            .expect("shards always hold a genesis block")
    }

    pub fn main_tip(&self) -> &Block {
        self.tip(MAIN_SHARD_ID)
    }

    pub fn latest_refs(&self) -> BlockRefs {
        self.shards.keys().map(|id| self.tip(*id).to_ref()).collect()
    }

    pub fn block(&self, shard_id: ShardId, number: u64) -> Option<&Block> {
        self.shards.get(&shard_id)?.get(number as usize)
    }

    pub fn find(&self, id: &BlockId) -> Option<&Block> {
        self.shards
            .get(&id.shard_id)?
            .iter()
            .find(|b| b.hash == id.hash)
    }

    pub fn find_ref(&self, block_ref: &BlockRef) -> Option<&Block> {
        self.block(block_ref.shard_id, block_ref.number)
            .filter(|b| b.hash == block_ref.hash)
    }

    pub fn main_blocks(&self) -> &[Block] {
        &self.shards[&MAIN_SHARD_ID]
    }

    /// Appends `count` blocks to a child shard.
    pub fn extend_shard(&mut self, shard_id: ShardId, count: usize) -> Vec<Block> {
        let mut produced = Vec::with_capacity(count);
        for _ in 0..count {
            let parent = self.tip(shard_id).to_ref();
            let block = make_block(shard_id, parent.number + 1, parent.hash);
            self.shards
                .get_mut(&shard_id)
                .expect("unknown shard")
                .push(block.clone());
            produced.push(block);
        }
        produced
    }

    /// Appends a main shard block referencing the current child shard tips.
    pub fn extend_main(&mut self) -> Block {
        let parent = self.main_tip().to_ref();
        let mut block = make_block(MAIN_SHARD_ID, parent.number + 1, parent.hash);
        block.child_blocks = self.child_tips();
        self.shards
            .get_mut(&MAIN_SHARD_ID)
            .expect("main shard exists")
            .push(block.clone());
        block
    }

    /// Grows every child shard by `blocks_per_shard` blocks, then the main shard
    /// by one, and returns the new blocks as segments.
    pub fn next_segments(&mut self, blocks_per_shard: usize) -> ChainSegments {
        let mut segments = Vec::new();
        if blocks_per_shard > 0 {
            for shard_id in self.child_shard_ids() {
                let blocks = self.extend_shard(shard_id, blocks_per_shard);
                segments.push(ShardChainSegment::new(blocks).expect("valid child segment"));
            }
        }

        let main = self.extend_main();
        segments.push(ShardChainSegment::new(vec![main]).expect("valid main segment"));
        ChainSegments::new(segments).expect("one segment per shard")
    }

    pub fn next_batch(&mut self, parent_id: Option<BatchId>, blocks_per_shard: usize) -> BlockBatch {
        BlockBatch::new(parent_id, self.next_segments(blocks_per_shard)).expect("valid batch")
    }

    /// Replaces the main shard blocks from `number` onwards with a different
    /// branch of the same length.
    pub fn fork_main_from(&mut self, number: u64) {
        let main = self.shards.get_mut(&MAIN_SHARD_ID).expect("main shard exists");
        let replaced = main.split_off(number as usize);

        for old in replaced {
            let parent = main.last().expect("fork point above genesis").to_ref();
            let mut block = make_block(MAIN_SHARD_ID, parent.number + 1, parent.hash);
            block.child_blocks = old.child_blocks;
            main.push(block);
        }
    }

    fn child_tips(&self) -> Vec<Buf32> {
        self.child_shard_ids()
            .into_iter()
            .map(|id| self.tip(id).hash)
            .collect()
    }
}

fn make_block(shard_id: ShardId, number: u64, parent_hash: Buf32) -> Block {
    Block {
        shard_id,
        number,
        hash: Buf32::new(random()),
        parent_hash,
        child_blocks: Vec::new(),
        timestamp: number,
        transactions: vec![Transaction {
            flags: 0,
            seqno: number,
            from: Buf20::new(random()),
            to: Buf20::new(random()),
            refund_to: Buf20::zero(),
            value: u128::from(number),
            data: shard_id.to_le_bytes().to_vec(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_batch_links_shards() {
        let mut chain = TestChain::new(2);
        let batch = chain.next_batch(None, 3);

        assert_eq!(batch.main_block().number, 1);
        assert_eq!(batch.blocks().count(), 1 + 2 * 3);

        let child_ids = batch.main_block().child_block_ids().unwrap();
        assert_eq!(child_ids.len(), 2);
        for id in child_ids {
            assert_eq!(chain.find(&id).unwrap().number, 3);
        }
    }

    #[test]
    fn test_fork_main_keeps_height() {
        let mut chain = TestChain::new(1);
        chain.next_segments(1);
        chain.next_segments(1);
        let old_tip = chain.main_tip().clone();

        chain.fork_main_from(1);
        let new_tip = chain.main_tip();
        assert_eq!(new_tip.number, old_tip.number);
        assert_ne!(new_tip.hash, old_tip.hash);
    }
}
