//! In-memory session store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

use super::traits::SessionStore;

/// Process-local store. Lives as long as the value does.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.values.write().await.remove(key).is_some())
    }
}
