//! `SessionStore`: The durable key-value seam for playback state.

use async_trait::async_trait;

use crate::error::StoreError;

/// Session-scoped durable key-value store holding JSON values.
///
/// The engine takes this as a constructor dependency; tests substitute the
/// in-memory backend or a failing fake.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a value, `None` if the key was never set or was deleted.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Insert or overwrite a value.
    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;

    /// Delete a value. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
