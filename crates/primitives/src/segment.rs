//! Contiguous runs of blocks, per shard.

use std::collections::BTreeMap;

use crate::{
    block::{Block, BlockId, BlockRef, BlockRefs, ShardId, MAIN_SHARD_ID},
    errors::ChainError,
};

/// Non-empty sequence of blocks of a single shard, each extending the previous.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShardChainSegment {
    blocks: Vec<Block>,
}

impl ShardChainSegment {
    pub fn new(blocks: Vec<Block>) -> Result<Self, ChainError> {
        let Some(first) = blocks.first() else {
            return Err(ChainError::EmptySegment);
        };

        let shard_id = first.shard_id;
        let mut prev = first.to_ref();
        for block in &blocks[1..] {
            if block.shard_id != shard_id {
                return Err(ChainError::ShardMismatch {
                    expected: shard_id,
                    actual: block.to_ref(),
                });
            }
            prev.validate_next(block)?;
            prev = block.to_ref();
        }

        Ok(Self { blocks })
    }

    pub fn shard_id(&self) -> ShardId {
        self.earliest().shard_id
    }

    pub fn earliest(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn latest(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Appends `other`, which must directly continue this segment.
    pub fn concat(&self, other: &ShardChainSegment) -> Result<Self, ChainError> {
        if other.shard_id() != self.shard_id() {
            return Err(ChainError::ShardMismatch {
                expected: self.shard_id(),
                actual: other.earliest().to_ref(),
            });
        }
        self.latest().to_ref().validate_next(other.earliest())?;

        let mut blocks = self.blocks.clone();
        blocks.extend(other.blocks.iter().cloned());
        Ok(Self { blocks })
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

/// Chain segments keyed by shard, iterated in shard order (main shard first).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChainSegments(BTreeMap<ShardId, ShardChainSegment>);

impl ChainSegments {
    pub fn new(segments: Vec<ShardChainSegment>) -> Result<Self, ChainError> {
        let mut map = BTreeMap::new();
        for segment in segments {
            let shard_id = segment.shard_id();
            if map.insert(shard_id, segment).is_some() {
                return Err(ChainError::DuplicateSegment(shard_id));
            }
        }
        Ok(Self(map))
    }

    pub fn get(&self, shard_id: ShardId) -> Option<&ShardChainSegment> {
        self.0.get(&shard_id)
    }

    pub fn main(&self) -> Option<&ShardChainSegment> {
        self.get(MAIN_SHARD_ID)
    }

    pub fn segments(&self) -> impl Iterator<Item = &ShardChainSegment> {
        self.0.values()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.0.values().flat_map(|s| s.blocks().iter())
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks().map(Block::id).collect()
    }

    pub fn blocks_count(&self) -> usize {
        self.0.values().map(ShardChainSegment::len).sum()
    }

    pub fn earliest_refs(&self) -> BlockRefs {
        self.segments().map(|s| s.earliest().to_ref()).collect()
    }

    pub fn latest_refs(&self) -> BlockRefs {
        self.segments().map(|s| s.latest().to_ref()).collect()
    }

    /// Parent references of each segment's earliest block. Shards starting at
    /// genesis have no entry.
    pub fn parent_refs(&self) -> BlockRefs {
        self.segments()
            .filter_map(|s| s.earliest().parent_ref())
            .collect()
    }

    /// Merges `other` into these segments, extending shards present in both.
    pub fn concat(&self, other: &ChainSegments) -> Result<Self, ChainError> {
        let mut merged = self.0.clone();
        for (shard_id, segment) in &other.0 {
            let next = match merged.get(shard_id) {
                Some(existing) => existing.concat(segment)?,
                None => segment.clone(),
            };
            merged.insert(*shard_id, next);
        }
        Ok(Self(merged))
    }
}
