//! Per-urn mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map of async mutexes keyed by urn.
///
/// Holders of the same urn are served one at a time in FIFO order; distinct
/// urns never contend. An entry lives only while somebody holds or waits for
/// it.
#[derive(Clone, Default)]
pub struct UrnLocks {
    slots: Slots,
}

impl UrnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `urn`.
    ///
    /// Dropping the returned future before it resolves gives up the place in
    /// the queue without affecting other waiters.
    pub async fn acquire(&self, urn: &str) -> UrnGuard {
        let claim = self.claim(urn);
        let guard = Arc::clone(&claim.slot).lock_owned().await;
        UrnGuard {
            _guard: guard,
            _claim: claim,
        }
    }

    /// Number of urns currently held or awaited.
    pub fn active(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    fn claim(&self, urn: &str) -> Claim {
        let slot = Arc::clone(lock_slots(&self.slots).entry(urn.to_string()).or_default());
        Claim {
            urn: urn.to_string(),
            slots: Arc::clone(&self.slots),
            slot,
        }
    }
}

/// Exclusive access to one urn, released on drop.
pub struct UrnGuard {
    // Field order matters: the mutex guard is released before the claim
    // decides whether the entry can be removed.
    _guard: OwnedMutexGuard<()>,
    _claim: Claim,
}

struct Claim {
    urn: String,
    slots: Slots,
    slot: Arc<AsyncMutex<()>>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut slots = lock_slots(&self.slots);
        // Two references left: the map's and ours.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.urn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn entries_are_removed_when_idle() {
        let locks = UrnLocks::new();
        {
            let _guard = locks.acquire("urn:a").await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn distinct_urns_do_not_contend() {
        let locks = UrnLocks::new();
        let _a = locks.acquire("urn:a").await;
        let acquired =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire("urn:b")).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn same_urn_waits_for_release() {
        let locks = UrnLocks::new();
        let held = locks.acquire("urn:a").await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire("urn:a")).await;
        assert!(blocked.is_err());
        assert_eq!(locks.active(), 1);

        drop(held);
        let _again = locks.acquire("urn:a").await;
        assert_eq!(locks.active(), 1);
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_no_entry() {
        let locks = UrnLocks::new();
        let held = locks.acquire("urn:a").await;
        let _ = tokio::time::timeout(Duration::from_millis(10), locks.acquire("urn:a")).await;
        drop(held);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn holders_never_overlap() {
        let locks = UrnLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let locks = locks.clone();
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                tokio::spawn(async move {
                    let _guard = locks.acquire("urn:shared").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active(), 0);
    }
}
