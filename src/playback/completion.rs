//! Persisted "playback finished" flag.
//!
//! Read once when the engine starts, written only when a run completes
//! without cancellation, cleared only by a reset. If the store fails, the
//! flag keeps working in memory for the rest of the process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::store::SessionStore;

use super::generation::{Cancelled, RunToken};

pub struct CompletionFlag {
    store: Arc<dyn SessionStore>,
    key: String,
    value: AtomicBool,
    degraded: AtomicBool,
    /// Serializes writes so a reset's clear cannot interleave with a stale completion.
    write_lock: Mutex<()>,
}

impl CompletionFlag {
    /// Load the flag from `store`. A read failure counts as "not completed".
    pub async fn load(store: Arc<dyn SessionStore>, key: &str) -> Self {
        let flag = Self {
            store,
            key: key.to_string(),
            value: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        };

        match flag.store.get(key).await {
            Ok(value) => {
                let completed = value.as_ref().and_then(Value::as_bool).unwrap_or(false);
                flag.value.store(completed, Ordering::SeqCst);
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read completion flag; tracking in memory");
                flag.degraded.store(true, Ordering::SeqCst);
            }
        }
        flag
    }

    pub fn is_set(&self) -> bool {
        self.value.load(Ordering::SeqCst)
    }

    /// Whether the store failed and the flag is only tracked in memory.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Set the flag on behalf of the run owning `token`.
    ///
    /// Refuses with `Cancelled` if the run was superseded, so a cancelled run
    /// never changes the flag.
    pub async fn mark_complete(&self, token: &RunToken) -> Result<(), Cancelled> {
        let _guard = self.write_lock.lock().await;
        token.check()?;
        self.value.store(true, Ordering::SeqCst);
        self.persist(Some(&Value::Bool(true))).await;
        info!(generation = token.id(), key = %self.key, "Playback completion recorded");
        Ok(())
    }

    /// Clear the flag (explicit reset).
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        self.value.store(false, Ordering::SeqCst);
        self.persist(None).await;
    }

    async fn persist(&self, value: Option<&Value>) {
        if self.is_degraded() {
            return;
        }
        let result = match value {
            Some(value) => self.store.set(&self.key, value).await,
            None => self.store.delete(&self.key).await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(key = %self.key, error = %e, "Failed to persist completion flag; tracking in memory");
            self.degraded.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::StoreError;
    use crate::playback::generation::Generation;
    use crate::store::MemorySessionStore;

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
        async fn set(&self, _key: &str, _value: &Value) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn loads_persisted_value() {
        let store = Arc::new(MemorySessionStore::new());
        store.set("done", &json!(true)).await.unwrap();
        let flag = CompletionFlag::load(store, "done").await;
        assert!(flag.is_set());
        assert!(!flag.is_degraded());
    }

    #[tokio::test]
    async fn non_boolean_value_reads_as_unset() {
        let store = Arc::new(MemorySessionStore::new());
        store.set("done", &json!("yes")).await.unwrap();
        let flag = CompletionFlag::load(store, "done").await;
        assert!(!flag.is_set());
    }

    #[tokio::test]
    async fn mark_and_clear_persist() {
        let store = Arc::new(MemorySessionStore::new());
        let flag = CompletionFlag::load(store.clone(), "done").await;
        let generation = Generation::new();
        let token = generation.advance();

        flag.mark_complete(&token).await.unwrap();
        assert!(flag.is_set());
        assert_eq!(store.get("done").await.unwrap(), Some(json!(true)));

        flag.clear().await;
        assert!(!flag.is_set());
        assert_eq!(store.get("done").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancelled_run_cannot_mark() {
        let store = Arc::new(MemorySessionStore::new());
        let flag = CompletionFlag::load(store.clone(), "done").await;
        let generation = Generation::new();
        let stale = generation.advance();
        generation.advance();

        assert_eq!(flag.mark_complete(&stale).await, Err(Cancelled));
        assert!(!flag.is_set());
        assert_eq!(store.get("done").await.unwrap(), None);
    }

    #[tokio::test]
    async fn broken_store_degrades_to_memory() {
        let flag = CompletionFlag::load(Arc::new(BrokenStore), "done").await;
        assert!(flag.is_degraded());
        assert!(!flag.is_set());

        let generation = Generation::new();
        let token = generation.advance();
        flag.mark_complete(&token).await.unwrap();
        assert!(flag.is_set());

        flag.clear().await;
        assert!(!flag.is_set());
    }
}
