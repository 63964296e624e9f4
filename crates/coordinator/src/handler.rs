//! Reaction of the batch pipeline to terminated proof tasks.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use synccommittee_db::DbError;
use synccommittee_primitives::task::{Task, TaskResult, TaskType};
use synccommittee_storage::BatchDbOps;
use tracing::*;

use crate::{errors::CoordinatorError, reset::ResetLauncher};

/// Invoked before a task result is applied to the task storage.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskStateChangeHandler: Send + Sync + 'static {
    async fn on_task_terminated(
        &self,
        task: &Task,
        result: &TaskResult,
    ) -> Result<(), CoordinatorError>;
}

pub struct TaskOutcomeHandler {
    batch_ops: Arc<BatchDbOps>,
    reset_launcher: Arc<dyn ResetLauncher>,
}

impl TaskOutcomeHandler {
    pub fn new(batch_ops: Arc<BatchDbOps>, reset_launcher: Arc<dyn ResetLauncher>) -> Self {
        Self {
            batch_ops,
            reset_launcher,
        }
    }

    async fn on_task_succeeded(&self, task: &Task) -> Result<(), CoordinatorError> {
        match task.task_type {
            TaskType::ProofBatch => {
                let proved = self.batch_ops.set_batch_as_proved_async(task.batch_id).await;
                match proved {
                    Ok(_) => {
                        info!(task_id = %task.id, batch_id = %task.batch_id, "batch proof completed");
                        Ok(())
                    }
                    Err(DbError::BatchNotFound(_)) => {
                        warn!(batch_id = %task.batch_id, "proved batch was purged in the meantime");
                        Ok(())
                    }
                    Err(err) => Err(err.into()),
                }
            }
            // dependency results are propagated by the task storage
            TaskType::ProofBlock
            | TaskType::AggregateProofs
            | TaskType::PartialProve
            | TaskType::AggregatedChallenge
            | TaskType::CombinedQ
            | TaskType::AggregatedFri
            | TaskType::FriConsistencyChecks
            | TaskType::MergeProof => Ok(()),
        }
    }
}

#[async_trait]
impl TaskStateChangeHandler for TaskOutcomeHandler {
    async fn on_task_terminated(
        &self,
        task: &Task,
        result: &TaskResult,
    ) -> Result<(), CoordinatorError> {
        if !self.batch_ops.batch_exists_async(task.batch_id).await? {
            warn!(
                task_id = %task.id,
                batch_id = %task.batch_id,
                "batch of terminated task does not exist, ignoring result"
            );
            return Ok(());
        }

        if result.is_success() {
            return self.on_task_succeeded(task).await;
        }

        if result.has_retryable_error() {
            debug!(task_id = %task.id, "task failed with retryable error");
            return Ok(());
        }

        warn!(
            task_id = %task.id,
            batch_id = %task.batch_id,
            err = ?result.error,
            "task failed with non-retryable error, resetting batch"
        );

        match self
            .reset_launcher
            .launch_partial_reset_with_suspension(task.batch_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = CoordinatorError::from(err);
                if err.is_batch_not_found() {
                    warn!(batch_id = %task.batch_id, "batch was already purged");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}
