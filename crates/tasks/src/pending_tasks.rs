//! Number of guarded tasks still alive, awaited on graceful shutdown.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug)]
pub struct PendingTasks {
    count: watch::Sender<usize>,
}

impl PendingTasks {
    pub fn new(initial_count: usize) -> Self {
        let (count, _) = watch::channel(initial_count);
        Self { count }
    }

    pub fn current(&self) -> usize {
        *self.count.borrow()
    }

    pub fn increment(&self) {
        self.count.send_modify(|count| *count += 1);
    }

    pub fn decrement(&self) {
        self.count
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    /// Resolves once every guard is dropped.
    pub async fn wait_for_zero(self: Arc<Self>) {
        let mut count = self.count.subscribe();
        // the sender is owned by `self`, the channel stays open while waiting
        let _ = count.wait_for(|count| *count == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_resolves_on_last_decrement() {
        let pending = Arc::new(PendingTasks::new(0));
        pending.increment();
        pending.increment();

        let waiter = tokio::spawn(pending.clone().wait_for_zero());
        pending.decrement();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        pending.decrement();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.current(), 0);
    }

    #[tokio::test]
    async fn test_wait_with_nothing_pending() {
        let pending = Arc::new(PendingTasks::new(0));
        tokio::time::timeout(Duration::from_millis(100), pending.wait_for_zero())
            .await
            .unwrap();
    }
}
