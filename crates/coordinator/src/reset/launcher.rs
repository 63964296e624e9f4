use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use synccommittee_primitives::ids::BatchId;
use synccommittee_tasks::{ShutdownSignal, TaskExecutor};
use tracing::*;

use super::StateResetter;
use crate::{
    config::ResetConfig,
    errors::{CoordinatorError, ResetError, WorkerError},
    worker::PausableComponent,
};

/// Starts a state reset with block ingestion suspended around it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResetLauncher: Send + Sync + 'static {
    /// Drops the failed batch and its descendants. Ingestion resumes after
    /// the configured delay.
    async fn launch_partial_reset_with_suspension(
        &self,
        failed_batch: BatchId,
    ) -> Result<(), ResetError>;

    /// Drops everything not proved yet and restarts from the state root
    /// finalized on L1. `caller` names the component requesting the reset
    /// from inside its own iteration.
    async fn launch_reset_to_l1_with_suspension(&self, caller: &str) -> Result<(), ResetError>;
}

pub struct StateResetLauncher {
    resetter: StateResetter,
    components: Vec<Arc<dyn PausableComponent>>,
    executor: TaskExecutor,
    config: ResetConfig,
    in_progress: AtomicBool,
}

impl StateResetLauncher {
    pub fn new(
        resetter: StateResetter,
        components: Vec<Arc<dyn PausableComponent>>,
        executor: TaskExecutor,
        config: ResetConfig,
    ) -> Self {
        Self {
            resetter,
            components,
            executor,
            config,
            in_progress: AtomicBool::new(false),
        }
    }

    fn try_acquire(&self) -> Result<ResetGuard<'_>, ResetError> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ResetError::ResetInProgress)?;
        Ok(ResetGuard(&self.in_progress))
    }

    async fn pause_components(&self, caller: Option<&str>) -> Result<(), ResetError> {
        for component in &self.components {
            let res = if Some(component.name()) == caller {
                // the caller's iteration is the one running this reset
                component.request_pause()
            } else {
                component.pause().await
            };

            if let Err(err) = res {
                error!(component = component.name(), %err, "failed to pause component");
                self.resume_now().await;
                return Err(ResetError::Pause(err));
            }
        }
        Ok(())
    }

    async fn resume_now(&self) {
        resume_or_stop(
            &self.components,
            self.config.resume_timeout(),
            &self.executor.shutdown_signal(),
        )
        .await;
    }

    fn schedule_resume(&self) {
        let components = self.components.clone();
        let delay = self.config.resume_delay();
        let timeout = self.config.resume_timeout();
        let signal = self.executor.shutdown_signal();

        info!(?delay, "ingestion will be resumed after delay");
        self.executor
            .spawn_critical_async_with_shutdown("state-reset-resume", move |shutdown| async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        resume_or_stop(&components, timeout, &signal).await;
                    }
                    _ = shutdown.wait_for_shutdown() => {
                        info!("shutdown requested, pending resume cancelled");
                    }
                }
            });
    }

    async fn finish(
        &self,
        reset: Result<Vec<BatchId>, CoordinatorError>,
    ) -> Result<(), ResetError> {
        match reset {
            Ok(_) => {
                self.schedule_resume();
                Ok(())
            }
            Err(err) => {
                error!(%err, "state reset failed, resuming ingestion");
                self.resume_now().await;
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl ResetLauncher for StateResetLauncher {
    async fn launch_partial_reset_with_suspension(
        &self,
        failed_batch: BatchId,
    ) -> Result<(), ResetError> {
        let _guard = self.try_acquire()?;
        info!(%failed_batch, "launching partial state reset");

        self.pause_components(None).await?;
        let reset = self.resetter.reset_progress_partial(failed_batch).await;
        self.finish(reset).await
    }

    async fn launch_reset_to_l1_with_suspension(&self, caller: &str) -> Result<(), ResetError> {
        let _guard = self.try_acquire()?;
        info!(%caller, "launching state reset to L1");

        self.pause_components(Some(caller)).await?;
        let reset = self.resetter.reset_progress_to_l1().await;
        self.finish(reset).await
    }
}

struct ResetGuard<'a>(&'a AtomicBool);

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn resume_components(
    components: &[Arc<dyn PausableComponent>],
    timeout: Duration,
) -> Result<(), WorkerError> {
    for component in components {
        let name = component.name();
        tokio::time::timeout(timeout, component.resume())
            .await
            .map_err(|_| WorkerError::Timeout { name, timeout })??;
    }
    Ok(())
}

/// A component that cannot be resumed leaves the pipeline stuck, so the
/// service is stopped instead.
async fn resume_or_stop(
    components: &[Arc<dyn PausableComponent>],
    timeout: Duration,
    signal: &ShutdownSignal,
) {
    match resume_components(components, timeout).await {
        Ok(()) => info!("ingestion resumed after state reset"),
        Err(err) => {
            error!(%err, "failed to resume after state reset, stopping service");
            signal.send();
        }
    }
}
