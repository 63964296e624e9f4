//! Blocks, block references and fetch range computation.

use std::{collections::BTreeMap, fmt};

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{
    buf::{Buf20, Buf32},
    errors::ChainError,
};

pub type ShardId = u32;
pub type BlockNumber = u64;

/// The coordinating shard whose blocks reference the other shards' blocks.
pub const MAIN_SHARD_ID: ShardId = 0;

/// Transaction as it is kept inside a batch, without signatures and receipts.
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
pub struct Transaction {
    pub flags: u8,
    pub seqno: u64,
    pub from: Buf20,
    pub to: Buf20,
    pub refund_to: Buf20,
    pub value: u128,
    pub data: Vec<u8>,
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
pub struct Block {
    pub shard_id: ShardId,
    pub number: BlockNumber,
    pub hash: Buf32,
    pub parent_hash: Buf32,
    /// Latest known block hash of every non-main shard, in shard order starting
    /// from shard 1. Only set on main shard blocks.
    pub child_blocks: Vec<Buf32>,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn is_main_shard(&self) -> bool {
        self.shard_id == MAIN_SHARD_ID
    }

    pub fn id(&self) -> BlockId {
        BlockId::new(self.shard_id, self.hash)
    }

    pub fn to_ref(&self) -> BlockRef {
        BlockRef::new(self.shard_id, self.number, self.hash)
    }

    /// Reference to the parent block, `None` for a genesis block.
    pub fn parent_ref(&self) -> Option<BlockRef> {
        if self.number == 0 {
            return None;
        }
        Some(BlockRef::new(
            self.shard_id,
            self.number - 1,
            self.parent_hash,
        ))
    }

    /// Ids of the child shard blocks referenced by a main shard block.
    pub fn child_block_ids(&self) -> Result<Vec<BlockId>, ChainError> {
        if !self.is_main_shard() {
            return Err(ChainError::NotMainShard(self.to_ref()));
        }

        Ok(self
            .child_blocks
            .iter()
            .enumerate()
            .map(|(i, hash)| BlockId::new(i as ShardId + 1, *hash))
            .collect())
    }
}

/// Persisted key of a block body. Borsh encodes it as the little-endian shard id
/// followed by the raw hash.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockId {
    pub shard_id: ShardId,
    pub hash: Buf32,
}

impl BlockId {
    pub fn new(shard_id: ShardId, hash: Buf32) -> Self {
        Self { shard_id, hash }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.shard_id, self.hash)
    }
}

/// Identifies a block without its body.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockRef {
    pub shard_id: ShardId,
    pub number: BlockNumber,
    pub hash: Buf32,
}

impl BlockRef {
    pub fn new(shard_id: ShardId, number: BlockNumber, hash: Buf32) -> Self {
        Self {
            shard_id,
            number,
            hash,
        }
    }

    pub fn id(&self) -> BlockId {
        BlockId::new(self.shard_id, self.hash)
    }

    /// Checks that `child` directly extends the referenced block.
    pub fn validate_next(&self, child: &Block) -> Result<(), ChainError> {
        let actual = child.to_ref();
        if child.shard_id != self.shard_id {
            return Err(ChainError::ShardMismatch {
                expected: self.shard_id,
                actual,
            });
        }
        if child.number != self.number + 1 {
            return Err(ChainError::BlockMismatch {
                reason: "non-sequential block number",
                expected: *self,
                actual,
            });
        }
        if child.parent_hash != self.hash {
            return Err(ChainError::BlockMismatch {
                reason: "parent hash mismatch",
                expected: *self,
                actual,
            });
        }
        Ok(())
    }

    /// Checks that `other` lies strictly after the referenced block.
    pub fn validate_descendant(&self, other: &BlockRef) -> Result<(), ChainError> {
        if other.shard_id != self.shard_id {
            return Err(ChainError::ShardMismatch {
                expected: self.shard_id,
                actual: *other,
            });
        }
        if other.number <= self.number {
            return Err(ChainError::BlockMismatch {
                reason: "block is not a descendant",
                expected: *self,
                actual: *other,
            });
        }
        Ok(())
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.shard_id, self.number, self.hash)
    }
}

/// One block reference per shard.
#[derive(
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockRefs(BTreeMap<ShardId, BlockRef>);

impl BlockRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, block_ref: BlockRef) {
        self.0.insert(block_ref.shard_id, block_ref);
    }

    pub fn get(&self, shard_id: ShardId) -> Option<&BlockRef> {
        self.0.get(&shard_id)
    }

    pub fn main(&self) -> Option<&BlockRef> {
        self.get(MAIN_SHARD_ID)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockRef> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<BlockRef> for BlockRefs {
    fn from_iter<T: IntoIterator<Item = BlockRef>>(iter: T) -> Self {
        let mut refs = Self::new();
        for r in iter {
            refs.insert(r);
        }
        refs
    }
}

/// Inclusive range of main shard block numbers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlocksRange {
    pub start: BlockNumber,
    pub end: BlockNumber,
}

impl BlocksRange {
    pub fn count(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Computes which main shard blocks to fetch next.
///
/// `start` is the last block already accounted for, `latest` is the chain's
/// current head. At most `max_blocks` blocks are returned. Returns `None` when
/// there is nothing new to fetch.
pub fn get_blocks_fetching_range(
    start: &BlockRef,
    latest: &BlockRef,
    max_blocks: u32,
) -> Result<Option<BlocksRange>, ChainError> {
    if start.number > latest.number {
        return Err(ChainError::BlockMismatch {
            reason: "latest block is behind the fetched one",
            expected: *start,
            actual: *latest,
        });
    }

    if start.number == latest.number {
        if start.hash != latest.hash {
            return Err(ChainError::BlockMismatch {
                reason: "hash mismatch at the same height",
                expected: *start,
                actual: *latest,
            });
        }
        return Ok(None);
    }

    if max_blocks == 0 {
        return Ok(None);
    }

    let range_start = start.number + 1;
    let range_end = latest.number.min(start.number + max_blocks as u64);
    Ok(Some(BlocksRange {
        start: range_start,
        end: range_end,
    }))
}
