//! Per-title writer serialization.
//!
//! Numbering a new version reads the existing numbers and then inserts; the
//! title lock keeps that read-compute-commit sequence exclusive within the
//! process. Store-level atomicity and the unique (owner, title, version) key
//! still hold the invariants across processes.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::posts::{Owner, PostTitle};

type TitleKey = (String, String);

#[derive(Clone, Default)]
pub struct TitleLocks {
    inner: Arc<DashMap<TitleKey, Arc<Mutex<()>>>>,
}

impl TitleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, owner: &Owner, title: &PostTitle) -> TitleGuard {
        let key = (owner.as_str().to_string(), title.as_str().to_string());
        let lock = self
            .inner
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        TitleGuard {
            key,
            locks: Arc::clone(&self.inner),
            _guard: guard,
        }
    }

    /// Number of titles with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub struct TitleGuard {
    key: TitleKey,
    locks: Arc<DashMap<TitleKey, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for TitleGuard {
    fn drop(&mut self) {
        // The map and this guard hold one reference each when nobody waits.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn title(raw: &str) -> PostTitle {
        PostTitle::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn entries_are_removed_after_release() {
        let locks = TitleLocks::new();
        let owner = Owner::new("alice").unwrap();
        {
            let _guard = locks.acquire(&owner, &title("One")).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn same_title_is_exclusive() {
        let locks = TitleLocks::new();
        let owner = Owner::new("alice").unwrap();
        let guard = locks.acquire(&owner, &title("One")).await;

        let contender = {
            let locks = locks.clone();
            let owner = owner.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&owner, &title("One")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.expect("contender completes");
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_titles_do_not_block() {
        let locks = TitleLocks::new();
        let owner = Owner::new("alice").unwrap();
        let _one = locks.acquire(&owner, &title("One")).await;
        let _two = locks.acquire(&owner, &title("Two")).await;
        assert_eq!(locks.len(), 2);
    }
}
