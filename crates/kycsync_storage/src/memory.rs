use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::kv::{KvStore, StorageError};

/// Process-local store. Writes can be made to fail on demand, which is how
/// storage-full and unavailable conditions are reproduced in tests.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
    failing_removes: RwLock<BTreeSet<String>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn fail_removes_for(&self, key: &str) {
        self.failing_removes.write().await.insert(key.to_string());
    }

    /// Successful `set_many` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("write rejected".to_string()));
        }

        let mut guard = self.entries.write().await;
        for (key, value) in entries {
            guard.insert((*key).to_string(), (*value).to_string());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.failing_removes.read().await.contains(key) {
            return Err(StorageError::Unavailable(format!("remove rejected for {key}")));
        }
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejected_write_leaves_store_untouched() {
        let store = InMemoryKvStore::new();
        store.set("kycData", "{}").await.expect("write");

        store.set_fail_writes(true);
        let result = store.set_many(&[("kycData", "{\"x\":1}"), ("syncQueue", "[]")]).await;

        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert_eq!(store.get("kycData").await.expect("read").as_deref(), Some("{}"));
        assert!(store.get("syncQueue").await.expect("read").is_none());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn remove_failure_is_per_key() {
        let store = InMemoryKvStore::new();
        store
            .set_many(&[("kycData", "{}"), ("syncQueue", "[]")])
            .await
            .expect("write");
        store.fail_removes_for("kycData").await;

        assert!(store.remove("kycData").await.is_err());
        store.remove("syncQueue").await.expect("remove");

        let snapshot = store.snapshot().await;
        assert!(snapshot.contains_key("kycData"));
        assert!(!snapshot.contains_key("syncQueue"));
    }
}
