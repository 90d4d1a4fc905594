//! Message log: The ordered record list the chat view renders.
//!
//! Outside of `clear`, the log only grows at the tail or changes its last
//! record. A run mutates it through a [`LogWriter`] bound to the run's token;
//! the writer re-checks the token under the write lock, so once a generation
//! is cancelled none of its mutations can land.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::generation::{Cancelled, RunToken};
use super::record::{MessageKind, MessageRecord};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// A change to the log, broadcast to subscribers after it is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    Appended {
        generation: Option<u64>,
        record: MessageRecord,
    },
    ReplacedLast {
        generation: Option<u64>,
        record: MessageRecord,
    },
    RemovedLast {
        generation: Option<u64>,
        id: Uuid,
    },
    Cleared,
}

impl LogEvent {
    /// The generation that produced this change, if it came from a run.
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Appended { generation, .. }
            | Self::ReplacedLast { generation, .. }
            | Self::RemovedLast { generation, .. } => *generation,
            Self::Cleared => None,
        }
    }

    /// Replay this change onto a copy of the log.
    pub fn apply_to(&self, records: &mut Vec<MessageRecord>) {
        match self {
            Self::Appended { record, .. } => records.push(record.clone()),
            Self::ReplacedLast { record, .. } => {
                if let Some(last) = records.last_mut() {
                    *last = record.clone();
                }
            }
            Self::RemovedLast { id, .. } => {
                if records.last().is_some_and(|r| r.id == *id) {
                    records.pop();
                }
            }
            Self::Cleared => records.clear(),
        }
    }
}

/// Ordered, tail-mutable message list with change broadcast.
pub struct MessageLog {
    records: RwLock<Vec<MessageRecord>>,
    tx: broadcast::Sender<LogEvent>,
}

impl MessageLog {
    pub fn new() -> Arc<Self> {
        Self::with_records(Vec::new())
    }

    /// Create a log pre-filled with records (e.g. restored history).
    pub fn with_records(records: Vec<MessageRecord>) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            records: RwLock::new(records),
            tx,
        })
    }

    /// Subscribe to log changes.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.tx.subscribe()
    }

    /// Subscribe together with a snapshot taken at the same instant.
    ///
    /// Every event received afterwards applies on top of the returned records.
    pub async fn subscribe_with_snapshot(
        &self,
    ) -> (Vec<MessageRecord>, broadcast::Receiver<LogEvent>) {
        let records = self.records.read().await;
        (records.clone(), self.tx.subscribe())
    }

    /// A writer whose mutations are dropped once `token` is cancelled.
    pub fn writer<'a>(&'a self, token: &'a RunToken) -> LogWriter<'a> {
        LogWriter { log: self, token }
    }

    pub async fn snapshot(&self) -> Vec<MessageRecord> {
        self.records.read().await.clone()
    }

    pub async fn last(&self) -> Option<MessageRecord> {
        self.records.read().await.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn contains_kind(&self, kind: &MessageKind) -> bool {
        self.records.read().await.iter().any(|r| &r.kind == kind)
    }

    /// Drop every record. Caller-side operation, not available to runs.
    pub async fn clear(&self) {
        let mut records = self.records.write().await;
        records.clear();
        let _ = self.tx.send(LogEvent::Cleared);
    }

    /// Append as the caller, outside of any run.
    pub async fn push(&self, record: MessageRecord) {
        let mut records = self.records.write().await;
        records.push(record.clone());
        let _ = self.tx.send(LogEvent::Appended {
            generation: None,
            record,
        });
    }
}

/// Generation-bound view used by the interpreter.
///
/// Exposes exactly the tail operations: append, replace-last, remove-last-if.
pub struct LogWriter<'a> {
    log: &'a MessageLog,
    token: &'a RunToken,
}

impl LogWriter<'_> {
    pub async fn append(&self, record: MessageRecord) -> Result<(), Cancelled> {
        let mut records = self.log.records.write().await;
        self.token.check()?;
        debug!(generation = self.token.id(), kind = %record.kind, "Appending record");
        records.push(record.clone());
        let _ = self.log.tx.send(LogEvent::Appended {
            generation: Some(self.token.id()),
            record,
        });
        Ok(())
    }

    /// Replace the last record. Returns `false` if the log is empty.
    pub async fn replace_last(&self, record: MessageRecord) -> Result<bool, Cancelled> {
        self.replace_last_if(|_| true, record).await
    }

    /// Replace the last record if it satisfies `predicate`.
    pub async fn replace_last_if(
        &self,
        predicate: impl FnOnce(&MessageRecord) -> bool,
        record: MessageRecord,
    ) -> Result<bool, Cancelled> {
        let mut records = self.log.records.write().await;
        self.token.check()?;
        let Some(last) = records.last_mut() else {
            return Ok(false);
        };
        if !predicate(last) {
            return Ok(false);
        }
        *last = record.clone();
        let _ = self.log.tx.send(LogEvent::ReplacedLast {
            generation: Some(self.token.id()),
            record,
        });
        Ok(true)
    }

    /// Remove the last record if it satisfies `predicate`.
    pub async fn remove_last_if(
        &self,
        predicate: impl FnOnce(&MessageRecord) -> bool,
    ) -> Result<Option<MessageRecord>, Cancelled> {
        let mut records = self.log.records.write().await;
        self.token.check()?;
        if !records.last().is_some_and(predicate) {
            return Ok(None);
        }
        let removed = records.pop();
        if let Some(record) = &removed {
            let _ = self.log.tx.send(LogEvent::RemovedLast {
                generation: Some(self.token.id()),
                id: record.id,
            });
        }
        Ok(removed)
    }
}
