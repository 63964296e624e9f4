use std::{collections::BTreeMap, fmt, time::Duration};

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::types::{CircuitType, ProverResultType, TaskType};
use crate::ids::{ExecutorId, TaskId};

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
pub enum TaskErrType {
    Timeout,
    Rpc,
    Io,
    Terminated,
    OutOfMemory,
    Unknown,
    InvalidTask,
    InvalidInputData,
    ProofGenerationFailed,
    NotSupportedType,
    Cancelled,
}

impl TaskErrType {
    /// Whether a task failing with this error may be handed out again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskErrType::Timeout
            | TaskErrType::Rpc
            | TaskErrType::Io
            | TaskErrType::Terminated
            | TaskErrType::OutOfMemory
            | TaskErrType::Unknown => true,
            TaskErrType::InvalidTask
            | TaskErrType::InvalidInputData
            | TaskErrType::ProofGenerationFailed
            | TaskErrType::NotSupportedType
            | TaskErrType::Cancelled => false,
        }
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
pub struct TaskExecError {
    pub err_type: TaskErrType,
    pub message: String,
}

impl TaskExecError {
    pub fn new(err_type: TaskErrType, message: impl Into<String>) -> Self {
        Self {
            err_type,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.err_type.is_retryable()
    }
}

impl fmt::Display for TaskExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.err_type, self.message)
    }
}

/// Outcome of a task execution reported by an executor.
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
pub struct TaskResult {
    pub task_id: TaskId,
    pub sender: ExecutorId,
    pub error: Option<TaskExecError>,
    pub output_artifacts: BTreeMap<ProverResultType, String>,
    pub data: Vec<u8>,
}

impl TaskResult {
    pub fn success(
        task_id: TaskId,
        sender: ExecutorId,
        output_artifacts: BTreeMap<ProverResultType, String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            task_id,
            sender,
            error: None,
            output_artifacts,
            data,
        }
    }

    pub fn failure(task_id: TaskId, sender: ExecutorId, error: TaskExecError) -> Self {
        Self {
            task_id,
            sender,
            error: Some(error),
            output_artifacts: BTreeMap::new(),
            data: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn has_retryable_error(&self) -> bool {
        self.error.as_ref().is_some_and(TaskExecError::is_retryable)
    }
}

/// A task result together with what it takes to interpret it without the
/// task entry at hand.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskResultDetails {
    pub result: TaskResult,
    pub task_type: TaskType,
    pub circuit_type: CircuitType,
    pub execution_time: Option<Duration>,
}
