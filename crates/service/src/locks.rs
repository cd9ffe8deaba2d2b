use hashcloud_catalog::Digest;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive access to one digest, released on drop.
pub type DigestGuard = OwnedMutexGuard<()>;

/// Per-digest mutual exclusion.
///
/// Operations that read a record, decide, and write it back hold the
/// digest's guard for the whole sequence. Unrelated digests never contend.
/// A digest's entry lives only as long as somebody holds or awaits it.
#[derive(Debug, Clone, Default)]
pub struct DigestLocks {
    entries: Arc<SyncMutex<HashMap<Digest, Weak<Mutex<()>>>>>,
}

impl DigestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, digest: &Digest) -> DigestGuard {
        let mutex = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|_, entry| entry.strong_count() > 0);
            match entries.get(digest).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(Mutex::new(()));
                    entries.insert(*digest, Arc::downgrade(&mutex));
                    mutex
                },
            }
        };
        mutex.lock_owned().await
    }

    /// Number of digests currently held or awaited.
    pub fn active(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|entry| entry.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entries_are_released() {
        let locks = DigestLocks::new();
        let guard = locks.lock(&Digest::of(b"a")).await;
        assert_eq!(locks.active(), 1);
        drop(guard);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_distinct_digests_do_not_contend() {
        let locks = DigestLocks::new();
        let _a = locks.lock(&Digest::of(b"a")).await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.lock(&Digest::of(b"b"))).await.unwrap();
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_digest_is_serialized() {
        let locks = DigestLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let (locks, inside, peak) = (locks.clone(), inside.clone(), peak.clone());
                tokio::spawn(async move {
                    let _guard = locks.lock(&Digest::of(b"shared")).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active(), 0);
    }
}
