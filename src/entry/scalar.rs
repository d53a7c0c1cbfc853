use super::{entry_basics, Entry, EntryCore, EntryView, ViewKind};
use crate::error::{KvError, KvResult};
use crate::store::SetCondition;
use std::sync::Arc;
use std::time::Duration;

/// A single string value under one key.
#[derive(Debug)]
pub struct ScalarEntry {
    core: EntryCore,
}

entry_basics!(ScalarEntry);

impl EntryView for ScalarEntry {
    const KIND: ViewKind = ViewKind::Scalar;

    fn from_core(core: EntryCore) -> Self {
        Self { core }
    }

    fn core(&self) -> &EntryCore {
        &self.core
    }

    fn into_entry(this: Arc<Self>) -> Entry {
        Entry::Scalar(this)
    }

    fn from_entry(entry: &Entry) -> Option<Arc<Self>> {
        match entry {
            Entry::Scalar(e) => Some(Arc::clone(e)),
            _ => None,
        }
    }
}

impl ScalarEntry {
    pub async fn get(&self) -> KvResult<Option<String>> {
        let mut conn = self.core.lease().await?;
        conn.get(self.name()).await
    }

    /// Overwrite the value; any previous expiry is replaced by `expiry`.
    pub async fn set(&self, value: &str, expiry: Option<Duration>) -> KvResult<()> {
        let mut conn = self.core.lease().await?;
        conn.set(self.name(), value, expiry, SetCondition::Always)
            .await?;
        Ok(())
    }

    /// Write only if absent. Returns whether the write happened.
    pub async fn set_if_absent(&self, value: &str, expiry: Option<Duration>) -> KvResult<bool> {
        let mut conn = self.core.lease().await?;
        conn.set(self.name(), value, expiry, SetCondition::NotExists)
            .await
    }

    /// Replace the value and return the previous one in a single round trip.
    pub async fn exchange(&self, value: &str) -> KvResult<Option<String>> {
        let mut conn = self.core.lease().await?;
        conn.getset(self.name(), value).await
    }

    pub async fn increment(&self, step: i64) -> KvResult<i64> {
        if step == 0 {
            return Err(KvError::invalid_argument("Increment step cannot be zero"));
        }
        let mut conn = self.core.lease().await?;
        conn.incr_by(self.name(), step).await
    }

    pub async fn decrement(&self, step: i64) -> KvResult<i64> {
        if step <= 0 {
            return Err(KvError::invalid_argument(
                "Decrement step must be greater than zero",
            ));
        }
        let mut conn = self.core.lease().await?;
        conn.decr_by(self.name(), step).await
    }

    /// Remaining time to live, `None` when the key has no expiry or is absent.
    pub async fn expiry(&self) -> KvResult<Option<Duration>> {
        let mut conn = self.core.lease().await?;
        conn.pttl(self.name()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{ConnectionPool, PoolConfig};
    use crate::store::{Connector, MemoryStore};

    fn scalar(name: &str) -> ScalarEntry {
        let pool = ConnectionPool::new(
            Connector::Memory(MemoryStore::new()),
            PoolConfig {
                capacity: 1,
                max_idle: 1,
                acquire_timeout: Duration::from_secs(1),
            },
        )
        .unwrap();
        ScalarEntry::from_core(EntryCore::new(name, 0, pool))
    }

    #[tokio::test]
    async fn test_exchange_returns_previous() {
        let entry = scalar("greeting");
        assert_eq!(entry.exchange("hello").await.unwrap(), None);
        assert_eq!(entry.exchange("bye").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(entry.get().await.unwrap().as_deref(), Some("bye"));
    }

    #[tokio::test]
    async fn test_counter_steps() {
        let entry = scalar("hits");
        assert_eq!(entry.increment(5).await.unwrap(), 5);
        assert_eq!(entry.decrement(2).await.unwrap(), 3);
        assert!(entry.increment(0).await.is_err());
        assert!(entry.decrement(0).await.is_err());
        assert!(entry.decrement(-1).await.is_err());
    }

    #[tokio::test]
    async fn test_set_with_expiry() {
        let entry = scalar("session");
        entry.set("x", Some(Duration::from_secs(60))).await.unwrap();
        let ttl = entry.expiry().await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(50));

        entry.set("y", None).await.unwrap();
        assert_eq!(entry.expiry().await.unwrap(), None);
        assert!(!entry.set_if_absent("z", None).await.unwrap());
    }
}
