//! Data types shared by the sync committee crates: chain data, batches and the
//! proof task graph.

#[macro_use]
mod macros;

pub mod batch;
pub mod block;
pub mod buf;
pub mod errors;
pub mod ids;
pub mod segment;
pub mod task;

/// Unix time in milliseconds.
pub type TimestampMs = u64;

pub mod prelude {
    pub use crate::{
        batch::{BlockBatch, DataProofs, ProposalData, PrunedBatch},
        block::{Block, BlockId, BlockNumber, BlockRef, BlockRefs, ShardId, MAIN_SHARD_ID},
        buf::{Buf20, Buf32},
        errors::ChainError,
        ids::{BatchId, ExecutorId, TaskId},
        segment::{ChainSegments, ShardChainSegment},
        TimestampMs,
    };
}
