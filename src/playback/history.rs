//! Chat history persistence.
//!
//! The log is saved to the session store after every change, minus the
//! transient UI-only records that are re-injected dynamically.

use std::sync::{Arc, Weak};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::SessionStore;

use super::log::{LogEvent, MessageLog};
use super::record::{MessageKind, MessageRecord};

/// Record kinds never written to history.
pub const TRANSIENT_KINDS: [&str; 5] = ["loading", "immersive_input", "bento_grid", "skeleton", "thinking"];

pub fn is_transient(kind: &MessageKind) -> bool {
    TRANSIENT_KINDS.contains(&kind.as_str())
}

/// The records worth persisting, in order.
pub fn persistable(records: &[MessageRecord]) -> Vec<MessageRecord> {
    records.iter().filter(|r| !is_transient(&r.kind)).cloned().collect()
}

/// Saves and restores chat history under one store key.
pub struct HistoryStore {
    store: Arc<dyn SessionStore>,
    key: String,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn SessionStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    /// Persist the non-transient records. An empty result leaves the stored history untouched.
    pub async fn save(&self, records: &[MessageRecord]) -> Result<usize, StoreError> {
        let kept = persistable(records);
        if kept.is_empty() {
            return Ok(0);
        }
        let value =
            serde_json::to_value(&kept).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.set(&self.key, &value).await?;
        Ok(kept.len())
    }

    /// Load saved history. Unreadable history is treated as empty.
    pub async fn load(&self) -> Result<Vec<MessageRecord>, StoreError> {
        let Some(value) = self.store.get(&self.key).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_value(value) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to parse saved history");
                Ok(Vec::new())
            }
        }
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(&self.key).await.map(|_| ())
    }
}

/// Spawn a task that saves history after every log change.
///
/// The task keeps its own copy of the log, rebuilt from the broadcast events,
/// so changes still buffered when the log is dropped are saved too. It ends
/// once the log is gone and every buffered change has been saved.
pub fn spawn_history_sync(log: &Arc<MessageLog>, history: Arc<HistoryStore>) -> JoinHandle<()> {
    let log = Arc::clone(log);
    tokio::spawn(async move {
        let (mut records, mut rx) = log.subscribe_with_snapshot().await;
        let weak = Arc::downgrade(&log);
        drop(log);

        loop {
            let mut closed = false;
            loop {
                match rx.try_recv() {
                    Ok(event) => event.apply_to(&mut records),
                    Err(TryRecvError::Lagged(missed)) => {
                        resync(&weak, &mut records, &mut rx, missed).await;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Closed) => {
                        closed = true;
                        break;
                    }
                }
            }

            match history.save(&records).await {
                Ok(saved) => debug!(saved, "History saved"),
                Err(e) => warn!(error = %e, "Failed to save history"),
            }
            if closed {
                break;
            }

            match rx.recv().await {
                Ok(event) => event.apply_to(&mut records),
                Err(RecvError::Lagged(missed)) => {
                    resync(&weak, &mut records, &mut rx, missed).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Start over from a fresh snapshot after missing events.
async fn resync(
    log: &Weak<MessageLog>,
    records: &mut Vec<MessageRecord>,
    rx: &mut broadcast::Receiver<LogEvent>,
    missed: u64,
) {
    match log.upgrade() {
        Some(log) => {
            warn!(missed, "History sync lagged; resyncing from the log");
            (*records, *rx) = log.subscribe_with_snapshot().await;
        }
        None => warn!(missed, "History sync lagged after the log closed; saving what was seen"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::playback::generation::Generation;
    use crate::playback::record::Role;
    use crate::store::MemorySessionStore;

    fn record(kind: &str) -> MessageRecord {
        MessageRecord::new(Role::Assistant, MessageKind::from(kind), json!(kind))
    }

    #[test]
    fn persistable_drops_transient_kinds() {
        let records = vec![
            record("text"),
            record("thinking"),
            record("skeleton"),
            record("table"),
            record("bento_grid"),
            record("feature_preview"),
        ];
        let kinds: Vec<String> = persistable(&records).iter().map(|r| r.kind.to_string()).collect();
        assert_eq!(kinds, vec!["text", "table", "feature_preview"]);
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let history = HistoryStore::new(Arc::new(MemorySessionStore::new()), "chat_history");
        assert!(history.load().await.unwrap().is_empty());

        let records = vec![record("text"), record("thinking"), record("chart")];
        assert_eq!(history.save(&records).await.unwrap(), 2);

        let loaded = history.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, records[0].id);
        assert_eq!(loaded[1].kind, MessageKind::Chart);

        history.clear().await.unwrap();
        assert!(history.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_only_log_keeps_previous_history() {
        let history = HistoryStore::new(Arc::new(MemorySessionStore::new()), "chat_history");
        history.save(&[record("text")]).await.unwrap();
        assert_eq!(history.save(&[record("thinking")]).await.unwrap(), 0);
        assert_eq!(history.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_history_loads_empty() {
        let store = Arc::new(MemorySessionStore::new());
        store.set("chat_history", &json!({"not": "a list"})).await.unwrap();
        let history = HistoryStore::new(store, "chat_history");
        assert!(history.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_task_saves_on_change() {
        let store = Arc::new(MemorySessionStore::new());
        let history = Arc::new(HistoryStore::new(store.clone(), "chat_history"));
        let log = MessageLog::new();
        let handle = spawn_history_sync(&log, history.clone());

        log.push(record("text")).await;
        log.push(record("thinking")).await;

        let mut saved = Vec::new();
        for _ in 0..50 {
            saved = history.load().await.unwrap();
            if !saved.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(saved.len(), 1);

        drop(log);
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("sync task should end with the log")
            .unwrap();
    }

    #[tokio::test]
    async fn changes_buffered_at_drop_are_saved() {
        let store = Arc::new(MemorySessionStore::new());
        let history = Arc::new(HistoryStore::new(store, "chat_history"));
        let log = MessageLog::new();
        let handle = spawn_history_sync(&log, history.clone());
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        let generation = Generation::new();
        let token = generation.advance();
        let writer = log.writer(&token);
        log.push(record("text")).await;
        writer.append(MessageRecord::new(Role::Assistant, MessageKind::Text, json!(""))).await.unwrap();
        for prefix in ["Hello", "Hello there", "Hello there friend"] {
            let mut streamed = log.last().await.unwrap();
            streamed.content = json!(prefix);
            writer.replace_last(streamed).await.unwrap();
        }
        drop(writer);
        drop(log);

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("sync task should end with the log")
            .unwrap();
        let saved = history.load().await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].text(), "Hello there friend");
    }
}
