use thiserror::Error;

use crate::block::{BlockRef, ShardId};

/// Chain continuity and batch shape violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The chain no longer extends what has already been fetched.
    #[error("block mismatch ({reason}): expected successor of {expected}, got {actual}")]
    BlockMismatch {
        reason: &'static str,
        expected: BlockRef,
        actual: BlockRef,
    },

    #[error("block {0} is not a main shard block")]
    NotMainShard(BlockRef),

    #[error("chain segment is empty")]
    EmptySegment,

    #[error("block {actual} does not belong to shard {expected}")]
    ShardMismatch { expected: ShardId, actual: BlockRef },

    #[error("duplicate chain segment for shard {0}")]
    DuplicateSegment(ShardId),

    #[error("batch must contain exactly one main shard block, got {0}")]
    InvalidMainSegment(usize),
}

impl ChainError {
    pub fn is_block_mismatch(&self) -> bool {
        matches!(self, Self::BlockMismatch { .. })
    }
}
