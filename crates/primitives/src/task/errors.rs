use thiserror::Error;

use super::types::TaskStatus;
use crate::ids::{ExecutorId, TaskId};

/// Task state machine violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task {id} has invalid status {status} for {operation}")]
    InvalidStatus {
        id: TaskId,
        status: TaskStatus,
        operation: &'static str,
    },

    #[error("task {id} belongs to executor {owner}, not to {sender}")]
    WrongExecutor {
        id: TaskId,
        owner: ExecutorId,
        sender: ExecutorId,
    },

    #[error("unknown executor id")]
    UnknownExecutor,

    #[error("result for task {result} delivered to task {entry}")]
    ResultMismatch { entry: TaskId, result: TaskId },

    #[error("task {id} has no pending dependency {dependency}")]
    NoSuchDependency { id: TaskId, dependency: TaskId },
}
