//! Per-will execution locks.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per will ID.
///
/// Executions of the same will run one after another; different wills never
/// wait on each other.
#[derive(Default)]
pub struct WillLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WillLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `will_id`.
    ///
    /// The entry is dropped from the map when the last holder releases it
    /// with nobody else waiting.
    pub async fn acquire(&self, will_id: &str) -> WillGuard<'_> {
        // Clone out of the map so no shard guard is held across the await
        let lock = self
            .locks
            .entry(will_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        WillGuard {
            locks: &self.locks,
            will_id: will_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of wills currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one will, released on drop.
pub struct WillGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    will_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WillGuard<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            // The map and this guard hold the only references: no waiters
            let mutex = Arc::clone(OwnedMutexGuard::mutex(&guard));
            self.locks.remove_if(&self.will_id, |_, lock| {
                Arc::ptr_eq(lock, &mutex) && Arc::strong_count(lock) == 3
            });
            drop(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_will_is_serialized() {
        let locks = Arc::new(WillLocks::new());
        let guard = locks.acquire("a").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_wills_do_not_block() {
        let locks = WillLocks::new();
        let _a = locks.acquire("a").await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b"))
            .await
            .unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_locks_leave_the_map() {
        let locks = WillLocks::new();
        for id in ["a", "b", "c"] {
            let _guard = locks.acquire(id).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiters_remain() {
        let locks = Arc::new(WillLocks::new());
        let guard = locks.acquire("a").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a").await;
                assert_eq!(locks.len(), 1);
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.len(), 1);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }
}
