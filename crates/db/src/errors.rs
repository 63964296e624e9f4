use rockbound::CodecError;
use synccommittee_primitives::{
    block::BlockId,
    errors::ChainError,
    ids::{BatchId, TaskId},
    task::TaskError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("task {0} already exists")]
    TaskAlreadyExists(TaskId),

    /// Invalid task status, wrong or unknown executor.
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("dependency cycle detected at task {0}")]
    DependencyCycle(TaskId),

    #[error("batch mismatch: batch {batch_id} has parent {parent_id:?}, latest batch is {latest_id:?}")]
    BatchMismatch {
        batch_id: BatchId,
        parent_id: Option<BatchId>,
        latest_id: Option<BatchId>,
    },

    /// Block mismatch or malformed chain data.
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("block {0} not found")]
    BlockNotFound(BlockId),

    #[error("batch {0} not found")]
    BatchNotFound(BatchId),

    #[error("batch {0} is not proved")]
    BatchNotProved(BatchId),

    #[error("cycle detected in the batch chain at {0}")]
    BatchChainCycle(BatchId),

    #[error("proved state root is not initialized")]
    StateRootNotInitialized,

    #[error("state root must not be empty")]
    EmptyStateRoot,

    #[error("stored batches capacity reached ({current}/{limit})")]
    CapacityLimitReached { current: u32, limit: u32 },

    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    #[error("concurrent modification of {0}")]
    TransactionConflict(&'static str),

    #[error("transaction error: {0}")]
    TransactionError(String),

    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Validation errors that describe the data rather than the storage engine.
    /// Repeating the operation cannot change their outcome.
    pub fn is_domain_error(&self) -> bool {
        !matches!(
            self,
            DbError::TransactionConflict(_) | DbError::TransactionError(_) | DbError::Other(_)
        )
    }

    pub fn is_block_mismatch(&self) -> bool {
        matches!(self, DbError::Chain(e) if e.is_block_mismatch())
    }
}

impl From<anyhow::Error> for DbError {
    fn from(value: anyhow::Error) -> Self {
        match value.downcast::<CodecError>() {
            Ok(codec) => codec.into(),
            Err(other) => Self::Other(other.to_string()),
        }
    }
}

impl From<CodecError> for DbError {
    fn from(value: CodecError) -> Self {
        Self::SerializationFailed(value.to_string())
    }
}
