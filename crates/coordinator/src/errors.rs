use std::time::Duration;

use synccommittee_db::DbError;
use synccommittee_primitives::{
    block::{BlockRef, ShardId},
    buf::Buf32,
    errors::ChainError,
    ids::BatchId,
    task::TaskError,
};
use thiserror::Error;

use crate::fetch::BlockSelector;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("block {selector} of shard {shard_id} not found")]
    NotFound {
        shard_id: ShardId,
        selector: BlockSelector,
    },

    /// A block fetched earlier is gone from the chain.
    #[error("block {0} is no longer part of the chain")]
    Reorged(BlockRef),

    /// The block the proved state root refers to is not on the main shard.
    #[error("proved state root {0} is not part of the chain")]
    UnknownStateRoot(Buf32),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("rpc: {0}")]
    Rpc(String),
}

impl FetchError {
    pub fn is_block_mismatch(&self) -> bool {
        match self {
            FetchError::Reorged(_) | FetchError::UnknownStateRoot(_) => true,
            FetchError::Chain(e) => e.is_block_mismatch(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("batch needs {needed} blobs, at most {limit} fit into a transaction")]
    BlobsLimitExceeded { needed: usize, limit: usize },

    #[error("batch encoding failed: {0}")]
    Encoding(#[from] std::io::Error),
}

/// Rollup contract call failures. The variants other than `Other` are
/// rejections reported by the contract itself.
#[derive(Debug, Error)]
pub enum L1Error {
    #[error("batch {0} is already committed")]
    AlreadyCommitted(BatchId),

    #[error("batch {0} is already finalized")]
    AlreadyFinalized(BatchId),

    #[error("invalid batch index: {0}")]
    InvalidIndex(String),

    #[error("invalid versioned hash: {0}")]
    InvalidVersionedHash(String),

    #[error("l1: {0}")]
    Other(String),
}

impl L1Error {
    /// Rejections meaning the local state no longer agrees with L1.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            L1Error::AlreadyCommitted(_)
                | L1Error::AlreadyFinalized(_)
                | L1Error::InvalidIndex(_)
                | L1Error::InvalidVersionedHash(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker {0} is not running")]
    Stopped(&'static str),

    #[error("worker {name} did not respond within {timeout:?}")]
    Timeout {
        name: &'static str,
        timeout: Duration,
    },
}

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("reset already in progress")]
    ResetInProgress,

    #[error("failed to pause component: {0}")]
    Pause(#[source] WorkerError),

    #[error(transparent)]
    Coordinator(#[from] Box<CoordinatorError>),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    L1(#[from] L1Error),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("state reset: {0}")]
    Reset(#[from] ResetError),
}

impl CoordinatorError {
    /// The chain forked away from what was already fetched.
    pub fn is_block_mismatch(&self) -> bool {
        match self {
            CoordinatorError::Db(e) => e.is_block_mismatch(),
            CoordinatorError::Fetch(e) => e.is_block_mismatch(),
            CoordinatorError::Chain(e) => e.is_block_mismatch(),
            _ => false,
        }
    }

    pub fn is_batch_not_found(&self) -> bool {
        match self {
            CoordinatorError::Db(DbError::BatchNotFound(_)) => true,
            CoordinatorError::Reset(ResetError::Coordinator(inner)) => inner.is_batch_not_found(),
            _ => false,
        }
    }
}

impl From<CoordinatorError> for ResetError {
    fn from(value: CoordinatorError) -> Self {
        ResetError::Coordinator(Box::new(value))
    }
}
