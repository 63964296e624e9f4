//! Polling loop that can be paused and resumed from the outside.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use synccommittee_tasks::ShutdownGuard;
use tokio::sync::{watch, Mutex};
use tracing::*;

use crate::errors::WorkerError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WorkerState {
    Running,
    Paused,
    Stopped,
}

/// Component the state reset launcher can suspend.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PausableComponent: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pauses the component once its in-flight iteration finishes. Returns
    /// whether the state changed.
    async fn pause(&self) -> Result<bool, WorkerError>;

    /// Pauses without waiting for the in-flight iteration. Used when the
    /// component requests the pause from inside that iteration.
    fn request_pause(&self) -> Result<bool, WorkerError>;

    async fn resume(&self) -> Result<bool, WorkerError>;
}

/// Runs an action on a fixed interval, one iteration at a time, until the
/// shutdown signal is received.
pub struct SuspendableWorker {
    name: &'static str,
    interval: Duration,
    state: watch::Sender<WorkerState>,
    iteration: Mutex<()>,
}

impl SuspendableWorker {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        let (state, _) = watch::channel(WorkerState::Running);
        Self {
            name,
            interval,
            state,
            iteration: Mutex::new(()),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Drives `action` until shutdown. Paused ticks are skipped.
    pub async fn run<F, Fut>(&self, shutdown: &ShutdownGuard, mut action: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(worker = %self.name, "Starting worker");
        let mut state_rx = self.state.subscribe();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *state_rx.borrow_and_update() == WorkerState::Paused {
                tokio::select! {
                    _ = shutdown.wait_for_shutdown() => break,
                    res = state_rx.changed() => {
                        if res.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            }

            tokio::select! {
                _ = shutdown.wait_for_shutdown() => break,
                _ = interval.tick() => {}
            }

            let _iteration = self.iteration.lock().await;
            if self.state() != WorkerState::Running {
                continue;
            }
            action().await;
        }

        self.state.send_replace(WorkerState::Stopped);
        info!(worker = %self.name, "Worker stopped");
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<bool, WorkerError> {
        let mut result = Ok(false);
        self.state.send_if_modified(|state| match *state {
            WorkerState::Stopped => {
                result = Err(WorkerError::Stopped(self.name));
                false
            }
            current if current == from => {
                *state = to;
                result = Ok(true);
                true
            }
            _ => false,
        });
        result
    }
}

#[async_trait]
impl PausableComponent for SuspendableWorker {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn pause(&self) -> Result<bool, WorkerError> {
        let paused = self.request_pause()?;
        // wait for the in-flight iteration to complete
        drop(self.iteration.lock().await);
        Ok(paused)
    }

    fn request_pause(&self) -> Result<bool, WorkerError> {
        let paused = self.transition(WorkerState::Running, WorkerState::Paused)?;
        if paused {
            info!(worker = %self.name, "worker paused");
        } else {
            warn!(worker = %self.name, "worker already paused");
        }
        Ok(paused)
    }

    async fn resume(&self) -> Result<bool, WorkerError> {
        let resumed = self.transition(WorkerState::Paused, WorkerState::Running)?;
        if resumed {
            info!(worker = %self.name, "worker resumed");
        } else {
            warn!(worker = %self.name, "worker already running");
        }
        Ok(resumed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use synccommittee_tasks::TaskManager;

    use super::*;

    async fn wait_for_count(counter: &AtomicUsize, at_least: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < at_least {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("worker did not reach the expected iteration count");
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let manager = TaskManager::new(tokio::runtime::Handle::current());
        let executor = manager.executor();
        let worker = Arc::new(SuspendableWorker::new("test", Duration::from_millis(1)));
        let counter = Arc::new(AtomicUsize::new(0));

        let (w, c) = (worker.clone(), counter.clone());
        let handle = executor.spawn_critical_async_with_shutdown("worker", |shutdown| async move {
            w.run(&shutdown, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        });

        wait_for_count(&counter, 3).await;

        assert!(worker.pause().await.unwrap());
        assert!(!worker.pause().await.unwrap());
        assert_eq!(worker.state(), WorkerState::Paused);

        let paused_at = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), paused_at);

        assert!(worker.resume().await.unwrap());
        assert!(!worker.resume().await.unwrap());
        wait_for_count(&counter, paused_at + 2).await;

        executor.shutdown_signal().send();
        handle.await.unwrap();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(matches!(
            worker.resume().await,
            Err(WorkerError::Stopped("test"))
        ));
    }

    #[tokio::test]
    async fn test_pause_waits_for_iteration() {
        let manager = TaskManager::new(tokio::runtime::Handle::current());
        let executor = manager.executor();
        let worker = Arc::new(SuspendableWorker::new("slow", Duration::from_millis(1)));
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let (w, s, f) = (worker.clone(), started.clone(), finished.clone());
        executor.spawn_critical_async_with_shutdown("worker", |shutdown| async move {
            w.run(&shutdown, || {
                let (s, f) = (s.clone(), f.clone());
                async move {
                    s.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    f.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        });

        wait_for_count(&started, 1).await;
        worker.pause().await.unwrap();
        assert_eq!(
            started.load(Ordering::SeqCst),
            finished.load(Ordering::SeqCst)
        );

        executor.shutdown_signal().send();
    }
}
