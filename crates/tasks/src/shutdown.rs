use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{futures::Notified, Notify};

use crate::pending_tasks::PendingTasks;

/// Shared shutdown trigger. Any holder may send it; every task observes it.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(Arc<AtomicBool>, Arc<Notify>);

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)), Arc::new(Notify::new()))
    }

    /// Send shutdown signal
    pub fn send(&self) {
        self.0.fetch_or(true, Ordering::Relaxed);
        self.1.notify_waiters();
    }

    /// Check if shutdown signal has been sent
    pub fn is_sent(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn subscribe(&self) -> Shutdown {
        Shutdown(self.clone())
    }

    fn notified(&self) -> Notified<'_> {
        self.1.notified()
    }
}

pub(crate) struct Shutdown(ShutdownSignal);

impl Shutdown {
    pub(crate) fn should_shutdown(&self) -> bool {
        self.0.is_sent()
    }

    pub(crate) async fn wait_for_shutdown(&self) {
        loop {
            // register before checking the flag so a concurrent send is not lost
            let notified = self.0.notified();
            if self.should_shutdown() {
                return;
            }
            notified.await;
        }
    }
}

/// Handed to tasks that take part in graceful shutdown. The task counts as
/// pending until the guard is dropped.
pub struct ShutdownGuard(Shutdown, Arc<PendingTasks>);

impl ShutdownGuard {
    pub(crate) fn new(shutdown: Shutdown, pending: Arc<PendingTasks>) -> Self {
        pending.increment();
        Self(shutdown, pending)
    }

    /// Check if shutdown signal has been sent
    pub fn should_shutdown(&self) -> bool {
        self.0.should_shutdown()
    }

    /// Waits until shutdown signal is sent
    pub async fn wait_for_shutdown(&self) {
        self.0.wait_for_shutdown().await
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.1.decrement();
    }
}
