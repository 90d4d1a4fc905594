//! libSQL backend: Durable `SessionStore` implementation.
//!
//! Values live in the `session_values` table keyed by `(session_id, key)`,
//! serialized as JSON text. Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::StoreError;

use super::migrations;
use super::traits::SessionStore;

/// libSQL session store bound to one session id.
pub struct LibSqlSessionStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    session_id: String,
}

impl LibSqlSessionStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path, session_id: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db, session_id).await?;
        info!(path = %path.display(), session = session_id, "Session store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(session_id: &str) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db, session_id).await
    }

    async fn from_database(db: LibSqlDatabase, session_id: &str) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            session_id: session_id.to_string(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl SessionStore for LibSqlSessionStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM session_values WHERE session_id = ?1 AND key = ?2",
                params![self.session_id.as_str(), key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row
                    .get(0)
                    .map_err(|e| StoreError::Serialization(format!("get {key}: {e}")))?;
                let value: serde_json::Value = serde_json::from_str(&value_str)
                    .map_err(|e| StoreError::Serialization(format!("get {key}: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let value_str =
            serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO session_values (session_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (session_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![self.session_id.as_str(), key, value_str, now],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set: {e}")))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let count = self
            .conn
            .execute(
                "DELETE FROM session_values WHERE session_id = ?1 AND key = ?2",
                params![self.session_id.as_str(), key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("delete: {e}")))?;
        Ok(count > 0)
    }
}
