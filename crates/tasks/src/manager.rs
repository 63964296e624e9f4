use std::{any::Any, future::Future, panic, sync::Arc, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tracing::*;

use crate::{
    pending_tasks::PendingTasks,
    shutdown::{Shutdown, ShutdownGuard, ShutdownSignal},
};

/// A critical task panicked. Carries the panic payload when it was a string.
#[derive(Debug, thiserror::Error)]
#[error("critical task `{task_name}` panicked{}", describe(.message))]
pub struct PanickedTaskError {
    task_name: &'static str,
    message: Option<String>,
}

impl PanickedTaskError {
    fn from_payload(task_name: &'static str, payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()));
        Self { task_name, message }
    }

    pub fn task_name(&self) -> &str {
        self.task_name
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

fn describe(message: &Option<String>) -> String {
    message.as_ref().map(|m| format!(": {m}")).unwrap_or_default()
}

/// Owns the service's long running tasks. A panic in any of them, or an
/// explicit shutdown signal, stops all of them.
pub struct TaskManager {
    handle: Handle,
    panics_tx: mpsc::UnboundedSender<PanickedTaskError>,
    panics_rx: mpsc::UnboundedReceiver<PanickedTaskError>,
    shutdown_signal: ShutdownSignal,
    pending_tasks: Arc<PendingTasks>,
}

impl TaskManager {
    pub fn new(handle: Handle) -> Self {
        let (panics_tx, panics_rx) = mpsc::unbounded_channel();
        Self {
            handle,
            panics_tx,
            panics_rx,
            shutdown_signal: ShutdownSignal::new(),
            pending_tasks: Arc::new(PendingTasks::new(0)),
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            handle: self.handle.clone(),
            panics_tx: self.panics_tx.clone(),
            shutdown_signal: self.shutdown_signal.clone(),
            pending_tasks: self.pending_tasks.clone(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Blocks until a task panics or shutdown is requested, then stops every
    /// task. Guarded tasks get `shutdown_timeout` to finish, or unlimited
    /// time when `None`.
    ///
    /// Returns the first panic, if that is what ended the run.
    pub fn monitor(mut self, shutdown_timeout: Option<Duration>) -> Result<(), PanickedTaskError> {
        let res = self.wait_for_panic(self.shutdown_signal.subscribe());

        self.shutdown_signal.send();
        if !self.wait_for_pending(shutdown_timeout) {
            warn!(
                pending = self.pending_tasks.current(),
                "graceful shutdown timed out, forcing shutdown"
            );
        }
        res
    }

    fn wait_for_panic(&mut self, shutdown: Shutdown) -> Result<(), PanickedTaskError> {
        self.handle.block_on(async {
            tokio::select! {
                panicked = self.panics_rx.recv() => panicked.map_or(Ok(()), Err),
                _ = shutdown.wait_for_shutdown() => Ok(()),
            }
        })
    }

    /// Whether every guarded task finished in time.
    fn wait_for_pending(&self, timeout: Option<Duration>) -> bool {
        let wait = self.pending_tasks.clone().wait_for_zero();
        let completed = self.handle.block_on(async move {
            match timeout {
                Some(timeout) => tokio::time::timeout(timeout, wait).await.is_ok(),
                None => {
                    wait.await;
                    true
                }
            }
        });
        if completed {
            debug!("all guarded tasks finished");
        }
        completed
    }
}

/// Spawns critical tasks onto the manager's runtime.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    handle: Handle,
    panics_tx: mpsc::UnboundedSender<PanickedTaskError>,
    shutdown_signal: ShutdownSignal,
    pending_tasks: Arc<PendingTasks>,
}

impl TaskExecutor {
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Spawns the future built by `task`. The task is handed a guard it must
    /// watch to stop on shutdown; the manager waits for the guard to drop
    /// before exiting. A panic stops the whole service.
    pub fn spawn_critical_async_with_shutdown<F>(
        &self,
        name: &'static str,
        task: impl FnOnce(ShutdownGuard) -> F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = ShutdownGuard::new(self.shutdown_signal.subscribe(), self.pending_tasks.clone());
        let panics_tx = self.panics_tx.clone();

        let fut = panic::AssertUnwindSafe(task(guard))
            .catch_unwind()
            .map_err(move |payload| {
                let err = PanickedTaskError::from_payload(name, payload);
                error!(%name, %err, "critical task failed");
                let _ = panics_tx.send(err);
            })
            .map(drop);

        debug!(%name, "spawning critical task");
        self.handle.spawn(fut)
    }
}
