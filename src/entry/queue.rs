//! FIFO queue wrapper over a list.
//!
//! Enqueue appends to the tail and dequeue removes from the head. Successful
//! enqueues and dequeues are announced on a broadcast channel; a send with no
//! listeners is not an error.

use super::{entry_basics, Entry, EntryCore, EntryView, ViewKind};
use crate::error::{KvError, KvResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventKind {
    Enqueued,
    Dequeued,
}

/// Notification raised by a successful enqueue or dequeue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEvent {
    pub queue: String,
    pub kind: QueueEventKind,
    pub values: Vec<String>,
    /// True when the values came from one batched call.
    pub batch: bool,
}

/// A first-in first-out queue under one key.
#[derive(Debug)]
pub struct QueueEntry {
    core: EntryCore,
    events: broadcast::Sender<QueueEvent>,
}

entry_basics!(QueueEntry);

impl EntryView for QueueEntry {
    const KIND: ViewKind = ViewKind::Queue;

    fn from_core(core: EntryCore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { core, events }
    }

    fn core(&self) -> &EntryCore {
        &self.core
    }

    fn into_entry(this: Arc<Self>) -> Entry {
        Entry::Queue(this)
    }

    fn from_entry(entry: &Entry) -> Option<Arc<Self>> {
        match entry {
            Entry::Queue(e) => Some(Arc::clone(e)),
            _ => None,
        }
    }
}

impl QueueEntry {
    /// Listen for enqueue and dequeue notifications on this wrapper.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Append one value. Returns the queue length afterwards.
    pub async fn enqueue(&self, value: &str) -> KvResult<u64> {
        let values = vec![value.to_string()];
        let len = {
            let mut conn = self.core.lease().await?;
            conn.rpush(self.name(), &values).await?
        };
        self.notify(QueueEventKind::Enqueued, values, false);
        Ok(len)
    }

    /// Append many values in one round trip. An empty batch is a no-op.
    pub async fn enqueue_many(&self, values: &[String]) -> KvResult<u64> {
        if values.is_empty() {
            return self.count().await;
        }
        let len = {
            let mut conn = self.core.lease().await?;
            conn.rpush(self.name(), values).await?
        };
        self.notify(QueueEventKind::Enqueued, values.to_vec(), true);
        Ok(len)
    }

    /// Remove and return the head, `None` when empty.
    pub async fn dequeue(&self) -> KvResult<Option<String>> {
        let value = {
            let mut conn = self.core.lease().await?;
            conn.lpop(self.name()).await?
        };
        if let Some(value) = &value {
            self.notify(QueueEventKind::Dequeued, vec![value.clone()], false);
        }
        Ok(value)
    }

    /// Remove up to `count` values from the head.
    ///
    /// Stops early if the queue empties, returning only what was removed.
    pub async fn dequeue_many(&self, count: usize) -> KvResult<Vec<String>> {
        if count == 0 {
            return Err(KvError::invalid_argument("Dequeue count must be at least 1"));
        }

        let mut conn = self.core.lease().await?;
        let available = conn.llen(self.name()).await? as usize;
        let mut taken = Vec::with_capacity(count.min(available));
        for _ in 0..count.min(available) {
            match conn.lpop(self.name()).await? {
                Some(value) => {
                    self.notify(QueueEventKind::Dequeued, vec![value.clone()], false);
                    taken.push(value);
                }
                None => break,
            }
        }
        debug!(queue = %self.name(), requested = count, taken = taken.len(), "Dequeued batch");
        Ok(taken)
    }

    /// The first `length` values without removing them.
    pub async fn peek(&self, length: usize) -> KvResult<Vec<String>> {
        if length == 0 {
            return Err(KvError::invalid_argument("Peek length must be at least 1"));
        }
        self.take(0, length).await
    }

    /// The head without removing it.
    pub async fn peek_one(&self) -> KvResult<Option<String>> {
        self.take_at(0).await
    }

    /// `length` values starting at `index`, without removing them.
    ///
    /// A `length` of 0 reads to the end of the queue.
    pub async fn take(&self, index: usize, length: usize) -> KvResult<Vec<String>> {
        let start = to_index(index)?;
        let stop = if length == 0 {
            -1
        } else {
            start
                .checked_add(to_index(length)? - 1)
                .ok_or_else(|| KvError::invalid_argument("Range exceeds queue bounds"))?
        };
        let mut conn = self.core.lease().await?;
        conn.lrange(self.name(), start, stop).await
    }

    /// The value at `index`, without removing it.
    pub async fn take_at(&self, index: usize) -> KvResult<Option<String>> {
        let index = to_index(index)?;
        let mut conn = self.core.lease().await?;
        conn.lindex(self.name(), index).await
    }

    /// Every queued value, head first.
    pub async fn items(&self) -> KvResult<Vec<String>> {
        self.take(0, 0).await
    }

    pub async fn count(&self) -> KvResult<u64> {
        let mut conn = self.core.lease().await?;
        conn.llen(self.name()).await
    }

    /// Delete the queue. Returns whether it existed.
    pub async fn clear(&self) -> KvResult<bool> {
        let mut conn = self.core.lease().await?;
        Ok(conn.del(&[self.name().to_string()]).await? > 0)
    }

    fn notify(&self, kind: QueueEventKind, values: Vec<String>, batch: bool) {
        // Err only means nobody is listening.
        let _ = self.events.send(QueueEvent {
            queue: self.name().to_string(),
            kind,
            values,
            batch,
        });
    }
}

fn to_index(value: usize) -> KvResult<i64> {
    i64::try_from(value).map_err(|_| KvError::invalid_argument("Index out of range"))
}
