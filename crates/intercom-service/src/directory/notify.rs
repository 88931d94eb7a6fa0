//! One-shot change notification.
//!
//! A waiter sees only notifications issued after it subscribed. `notify`
//! wakes and removes every registered waiter; a waiter dropped before that
//! removes its own entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    waiters: HashMap<u64, oneshot::Sender<()>>,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeNotifier {
    registry: Arc<Mutex<Registry>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        lock_registry(&self.registry)
    }

    /// Register a waiter for the next notification.
    pub fn subscribe(&self) -> ChangeWaiter {
        let (sender, receiver) = oneshot::channel();
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id = registry.next_id.wrapping_add(1);
        registry.waiters.insert(id, sender);
        ChangeWaiter {
            id,
            receiver,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Wake every current waiter. Returns how many were woken.
    pub fn notify(&self) -> usize {
        let waiters = std::mem::take(&mut self.lock().waiters);
        let count = waiters.len();
        for (_, sender) in waiters {
            let _ = sender.send(());
        }
        count
    }

    /// Number of registered waiters.
    pub fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }
}

fn lock_registry(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct ChangeWaiter {
    id: u64,
    receiver: oneshot::Receiver<()>,
    registry: Arc<Mutex<Registry>>,
}

impl ChangeWaiter {
    /// Resolve on the next notification.
    pub async fn changed(&mut self) {
        // The sender is only dropped by `notify` after sending, or by our own
        // `Drop`, so an error here still means "notified".
        let _ = (&mut self.receiver).await;
    }
}

impl Drop for ChangeWaiter {
    fn drop(&mut self) {
        lock_registry(&self.registry).waiters.remove(&self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_notify_wakes_all_current_waiters() {
        let notifier = ChangeNotifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        assert_eq!(notifier.notify(), 2);
        a.changed().await;
        b.changed().await;
        assert_eq!(notifier.waiter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_waiter_misses_earlier_notify() {
        let notifier = ChangeNotifier::new();
        assert_eq!(notifier.notify(), 0);

        let mut waiter = notifier.subscribe();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter.changed()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_waiter_removes_itself() {
        let notifier = ChangeNotifier::new();
        {
            let mut waiter = notifier.subscribe();
            let _ = tokio::time::timeout(Duration::from_millis(10), waiter.changed()).await;
            assert_eq!(notifier.waiter_count(), 1);
        }
        assert_eq!(notifier.waiter_count(), 0);
    }

    #[tokio::test]
    async fn test_notify_from_another_task() {
        let notifier = ChangeNotifier::new();
        let mut waiter = notifier.subscribe();
        let remote = notifier.clone();

        let handle = tokio::spawn(async move { remote.notify() });
        waiter.changed().await;
        assert_eq!(handle.await.unwrap(), 1);
    }
}
