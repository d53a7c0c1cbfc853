//! The single entry point applications use.
//!
//! `KvFacade` owns one connection pool and one `EntryRegistry` per logical
//! database. Typed accessors route through the registry of the currently
//! selected database; everything else leases a connection directly.
//!
//! # Lifecycle
//!
//! `dispose` is idempotent. The first call shuts the pool down and clears every
//! registry; after that every facade operation fails with `Disposed`, and
//! wrappers handed out earlier fail with `PoolClosed`.

use crate::config::StoreSettings;
use crate::entry::{
    validate_name, validate_names, DictionaryEntry, Entry, QueueEntry, ScalarEntry, SetEntry,
};
use crate::error::{KvError, KvResult};
use crate::pool::{ConnectionPool, PoolStats, PooledConnection};
use crate::registry::EntryRegistry;
use crate::store::{Connector, EntryType, SetCondition, SetOperation};
use crate::subscriber::Subscriber;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Keys requested per `SCAN` round trip in `find`.
const FIND_PAGE_SIZE: usize = 100;

pub struct KvFacade {
    address: String,
    pool: ConnectionPool,
    registries: Vec<EntryRegistry>,
    database: AtomicU32,
    disposed: AtomicBool,
}

impl std::fmt::Debug for KvFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvFacade")
            .field("name", &self.name())
            .field("databases", &self.registries.len())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl KvFacade {
    /// Build a facade from parsed settings. No connection is opened yet.
    pub fn new(settings: &StoreSettings) -> KvResult<Self> {
        Self::with_connector(settings.connector(), settings)
    }

    /// Build a facade over an explicit connector, e.g. a shared `MemoryStore`.
    pub fn with_connector(connector: Connector, settings: &StoreSettings) -> KvResult<Self> {
        if settings.database >= settings.databases {
            return Err(KvError::invalid_argument(format!(
                "Database {} is out of range (0..{})",
                settings.database, settings.databases
            )));
        }

        let address = connector.address().to_string();
        let pool = ConnectionPool::new(connector, settings.pool_config())?;
        let registries = (0..settings.databases)
            .map(|db| EntryRegistry::new(pool.clone(), db))
            .collect();

        Ok(Self {
            address,
            pool,
            registries,
            database: AtomicU32::new(settings.database),
            disposed: AtomicBool::new(false),
        })
    }

    /// Build a facade and verify the store answers a `PING`.
    pub async fn connect(settings: &StoreSettings) -> KvResult<Self> {
        let facade = Self::new(settings)?;
        facade.lease().await?.ping().await?;
        info!(name = %facade.name(), "Connected to store");
        Ok(facade)
    }

    /// `address#database`, e.g. `127.0.0.1:6379#0`.
    pub fn name(&self) -> String {
        format!("{}#{}", self.address, self.database())
    }

    /// The logical database operations currently target.
    pub fn database(&self) -> u32 {
        self.database.load(Ordering::Acquire)
    }

    /// Number of logical databases this facade has registries for.
    pub fn database_count(&self) -> u32 {
        self.registries.len() as u32
    }

    /// Switch the logical database for subsequent operations.
    pub fn use_database(&self, database: u32) -> KvResult<()> {
        self.ensure_open()?;
        if database >= self.database_count() {
            return Err(KvError::invalid_argument(format!(
                "Database {} is out of range (0..{})",
                database,
                self.database_count()
            )));
        }
        let previous = self.database.swap(database, Ordering::AcqRel);
        if previous != database {
            debug!(from = previous, to = database, "Switched database");
        }
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Shut the pool down and clear every registry. Later calls are no-ops.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pool.shutdown();
        for registry in &self.registries {
            registry.clear();
        }
        info!(address = %self.address, "Facade disposed");
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // --- scalars ---

    pub async fn get_value(&self, name: &str) -> KvResult<Option<String>> {
        validate_name(name)?;
        self.lease().await?.get(name).await
    }

    /// Values for several keys in one round trip, in request order.
    pub async fn get_values(&self, names: &[String]) -> KvResult<Vec<Option<String>>> {
        validate_names(names)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        self.lease().await?.mget(names).await
    }

    pub async fn set_value(&self, name: &str, value: &str) -> KvResult<()> {
        self.set_value_with(name, value, None, SetCondition::Always)
            .await?;
        Ok(())
    }

    /// Write with an optional expiry and a write condition.
    /// Returns whether the write happened.
    pub async fn set_value_with(
        &self,
        name: &str,
        value: &str,
        expiry: Option<Duration>,
        condition: SetCondition,
    ) -> KvResult<bool> {
        validate_name(name)?;
        validate_expiry(expiry)?;
        self.lease()
            .await?
            .set(name, value, expiry, condition)
            .await
    }

    /// Replace the value and return the previous one in one round trip.
    pub async fn exchange_value(&self, name: &str, value: &str) -> KvResult<Option<String>> {
        validate_name(name)?;
        self.lease().await?.getset(name, value).await
    }

    /// Like `exchange_value`, also setting an expiry on the new value.
    pub async fn exchange_value_with_expiry(
        &self,
        name: &str,
        value: &str,
        expiry: Duration,
    ) -> KvResult<Option<String>> {
        validate_name(name)?;
        validate_expiry(Some(expiry))?;
        self.lease()
            .await?
            .set_get(name, value, Some(expiry))
            .await
    }

    /// Atomically add `step` to a scalar counter.
    pub async fn increment(&self, name: &str, step: i64) -> KvResult<i64> {
        validate_name(name)?;
        if step == 0 {
            return Err(KvError::invalid_argument("Increment step cannot be zero"));
        }
        self.lease().await?.incr_by(name, step).await
    }

    /// Atomically subtract a positive `step` from a scalar counter.
    pub async fn decrement(&self, name: &str, step: i64) -> KvResult<i64> {
        validate_name(name)?;
        if step <= 0 {
            return Err(KvError::invalid_argument(
                "Decrement step must be greater than zero",
            ));
        }
        self.lease().await?.decr_by(name, step).await
    }

    // --- introspection ---

    pub async fn get_entry_type(&self, name: &str) -> KvResult<EntryType> {
        self.registry()?.probe(name).await
    }

    /// A typed handle for whatever `name` currently holds, `None` if absent.
    ///
    /// The key's type is read once and the view is chosen from that reading.
    pub async fn get_entry(&self, name: &str) -> KvResult<Option<Entry>> {
        self.registry()?.resolve(name).await
    }

    // --- expiry ---

    /// Remaining time to live, `None` for keys without expiry or absent keys.
    pub async fn get_entry_expiry(&self, name: &str) -> KvResult<Option<Duration>> {
        validate_name(name)?;
        self.lease().await?.pttl(name).await
    }

    /// Expire `name` after `ttl`. Returns false when the key does not exist.
    pub async fn set_entry_expiry(&self, name: &str, ttl: Duration) -> KvResult<bool> {
        validate_name(name)?;
        validate_expiry(Some(ttl))?;
        self.lease().await?.pexpire(name, ttl).await
    }

    /// Expire `name` at an absolute instant.
    pub async fn set_entry_expiry_at(&self, name: &str, at: DateTime<Utc>) -> KvResult<bool> {
        validate_name(name)?;
        self.lease()
            .await?
            .pexpire_at(name, at.timestamp_millis())
            .await
    }

    // --- key management ---

    /// Rename a key. Returns false when `from` does not exist.
    pub async fn rename(&self, from: &str, to: &str) -> KvResult<bool> {
        validate_name(from)?;
        validate_name(to)?;
        self.lease().await?.rename(from, to).await
    }

    pub async fn remove(&self, name: &str) -> KvResult<bool> {
        validate_name(name)?;
        Ok(self.lease().await?.del(&[name.to_string()]).await? > 0)
    }

    /// Delete several keys, returning how many existed.
    pub async fn remove_many(&self, names: &[String]) -> KvResult<u64> {
        validate_names(names)?;
        if names.is_empty() {
            return Ok(0);
        }
        self.lease().await?.del(names).await
    }

    pub async fn exists(&self, name: &str) -> KvResult<bool> {
        validate_name(name)?;
        self.lease().await?.exists(name).await
    }

    /// Delete every key in the current database.
    pub async fn clear(&self) -> KvResult<()> {
        self.lease().await?.flushdb().await?;
        self.registry()?.clear();
        info!(database = self.database(), "Database flushed");
        Ok(())
    }

    /// Keys matching a glob `pattern`, sorted and without duplicates.
    ///
    /// Iterates with `SCAN`, so a key created or deleted meanwhile may or may
    /// not be reported.
    pub async fn find(&self, pattern: &str) -> KvResult<Vec<String>> {
        if pattern.trim().is_empty() {
            return Err(KvError::invalid_argument("Search pattern cannot be empty"));
        }
        let mut conn = self.lease().await?;
        let mut keys = BTreeSet::new();
        let mut cursor = 0;
        loop {
            let (next, page) = conn.scan(cursor, pattern, FIND_PAGE_SIZE).await?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys.into_iter().collect())
    }

    // --- typed accessors ---

    pub async fn get_scalar(&self, name: &str) -> KvResult<Arc<ScalarEntry>> {
        self.registry()?.get_or_create(name).await
    }

    pub async fn get_dictionary(&self, name: &str) -> KvResult<Arc<DictionaryEntry>> {
        self.registry()?.get_or_create(name).await
    }

    /// Like `get_dictionary`, seeding `items` when the key did not exist.
    ///
    /// Seeding never overwrites: each field is written only if absent, so a
    /// concurrent writer that got there first wins.
    pub async fn get_dictionary_with(
        &self,
        name: &str,
        items: &[(String, String)],
    ) -> KvResult<Arc<DictionaryEntry>> {
        let lookup = self.registry()?.lookup::<DictionaryEntry>(name).await?;
        if lookup.observed == EntryType::None {
            for (field, value) in items {
                lookup.entry.try_add(field, value).await?;
            }
            debug!(name = %name, fields = items.len(), "Seeded dictionary");
        }
        Ok(lookup.entry)
    }

    pub async fn get_hashset(&self, name: &str) -> KvResult<Arc<SetEntry>> {
        self.registry()?.get_or_create(name).await
    }

    pub async fn get_queue(&self, name: &str) -> KvResult<Arc<QueueEntry>> {
        self.registry()?.get_or_create(name).await
    }

    // --- set algebra over named sets ---

    /// Members of any of `names`.
    pub async fn get_union(&self, names: &[String]) -> KvResult<HashSet<String>> {
        self.combine(SetOperation::Union, names).await
    }

    /// Members present in every one of `names`.
    pub async fn get_intersect(&self, names: &[String]) -> KvResult<HashSet<String>> {
        self.combine(SetOperation::Intersect, names).await
    }

    /// Members of the first set absent from all the others.
    pub async fn get_except(&self, names: &[String]) -> KvResult<HashSet<String>> {
        self.combine(SetOperation::Difference, names).await
    }

    /// Store the union of `names` in `destination`, returning its size.
    pub async fn set_union(&self, destination: &str, names: &[String]) -> KvResult<u64> {
        self.combine_store(SetOperation::Union, destination, names)
            .await
    }

    pub async fn set_intersect(&self, destination: &str, names: &[String]) -> KvResult<u64> {
        self.combine_store(SetOperation::Intersect, destination, names)
            .await
    }

    pub async fn set_except(&self, destination: &str, names: &[String]) -> KvResult<u64> {
        self.combine_store(SetOperation::Difference, destination, names)
            .await
    }

    // --- pub/sub ---

    /// Publish `message` on `channel`, returning how many subscribers got it.
    ///
    /// An empty message is not sent.
    pub async fn publish(&self, channel: &str, message: &str) -> KvResult<u64> {
        if channel.is_empty() {
            return Err(KvError::invalid_argument("Channel name cannot be empty"));
        }
        self.ensure_open()?;
        if message.is_empty() {
            return Ok(0);
        }
        self.lease().await?.publish(channel, message).await
    }

    /// Listen on `channels` over a dedicated connection.
    pub async fn subscribe(&self, channels: Vec<String>) -> KvResult<Subscriber> {
        self.ensure_open()?;
        Subscriber::open(self.pool.connector(), channels).await
    }

    // --- internals ---

    fn ensure_open(&self) -> KvResult<()> {
        if self.is_disposed() {
            return Err(KvError::disposed(format!("facade {}", self.address)));
        }
        Ok(())
    }

    fn registry(&self) -> KvResult<&EntryRegistry> {
        self.ensure_open()?;
        let database = self.database();
        self.registries
            .get(database as usize)
            .ok_or_else(|| KvError::internal(format!("No registry for database {database}")))
    }

    async fn lease(&self) -> KvResult<PooledConnection> {
        self.ensure_open()?;
        self.pool.acquire(self.database()).await
    }

    async fn combine(&self, operation: SetOperation, names: &[String]) -> KvResult<HashSet<String>> {
        validate_names(names)?;
        if names.is_empty() {
            return Err(KvError::invalid_argument("At least one set name is required"));
        }
        self.lease().await?.set_combine(operation, names).await
    }

    async fn combine_store(
        &self,
        operation: SetOperation,
        destination: &str,
        names: &[String],
    ) -> KvResult<u64> {
        validate_name(destination)?;
        validate_names(names)?;
        if names.is_empty() {
            return Err(KvError::invalid_argument("At least one set name is required"));
        }
        self.lease()
            .await?
            .set_combine_store(operation, destination, names)
            .await
    }
}

impl Drop for KvFacade {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn validate_expiry(expiry: Option<Duration>) -> KvResult<()> {
    match expiry {
        Some(ttl) if ttl.as_millis() == 0 => Err(KvError::invalid_argument(
            "Expiry must be at least one millisecond",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn facade() -> (KvFacade, MemoryStore) {
        let store = MemoryStore::new();
        let facade =
            KvFacade::with_connector(Connector::Memory(store.clone()), &StoreSettings::memory())
                .unwrap();
        (facade, store)
    }

    #[tokio::test]
    async fn test_name_and_database_switch() {
        let (facade, _) = facade();
        assert_eq!(facade.name(), "memory#0");
        facade.use_database(3).unwrap();
        assert_eq!(facade.name(), "memory#3");
        assert!(matches!(
            facade.use_database(16),
            Err(KvError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_databases_are_isolated() {
        let (facade, _) = facade();
        facade.set_value("k", "zero").await.unwrap();
        facade.use_database(1).unwrap();
        assert_eq!(facade.get_value("k").await.unwrap(), None);

        let q1 = facade.get_queue("jobs").await.unwrap();
        facade.use_database(0).unwrap();
        let q0 = facade.get_queue("jobs").await.unwrap();
        assert!(!Arc::ptr_eq(&q0, &q1));
        assert_eq!(q0.database(), 0);
        assert_eq!(q1.database(), 1);
    }

    #[tokio::test]
    async fn test_get_entry_dispatches_on_type() {
        let (facade, _) = facade();
        assert!(facade.get_entry("missing").await.unwrap().is_none());

        facade.set_value("s", "v").await.unwrap();
        facade.get_queue("q").await.unwrap().enqueue("x").await.unwrap();

        let scalar = facade.get_entry("s").await.unwrap().unwrap();
        assert_eq!(scalar.entry_type(), EntryType::Scalar);
        let queue = facade.get_entry("q").await.unwrap().unwrap();
        assert!(matches!(queue, Entry::Queue(_)));
    }

    #[tokio::test]
    async fn test_dictionary_seeded_only_when_absent() {
        let (facade, _) = facade();
        let seed = vec![("Value".to_string(), "0".to_string())];

        let dict = facade.get_dictionary_with("seq", &seed).await.unwrap();
        assert_eq!(dict.get("Value").await.unwrap().as_deref(), Some("0"));

        dict.set("Value", "7").await.unwrap();
        facade.get_dictionary_with("seq", &seed).await.unwrap();
        assert_eq!(dict.get("Value").await.unwrap().as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_publish_empty_message_is_skipped() {
        let (facade, _) = facade();
        let mut sub = facade.subscribe(vec!["news".to_string()]).await.unwrap();
        assert_eq!(facade.publish("news", "").await.unwrap(), 0);
        assert_eq!(facade.publish("news", "hi").await.unwrap(), 1);
        let message = sub.recv().await.unwrap();
        assert_eq!(message.payload, "hi");
    }

    #[tokio::test]
    async fn test_zero_expiry_rejected() {
        let (facade, _) = facade();
        assert!(matches!(
            facade
                .set_value_with("k", "v", Some(Duration::ZERO), SetCondition::Always)
                .await,
            Err(KvError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_final() {
        let (facade, _) = facade();
        let queue = facade.get_queue("jobs").await.unwrap();
        facade.dispose();
        facade.dispose();

        assert!(facade.is_disposed());
        assert!(matches!(
            facade.get_value("k").await,
            Err(KvError::Disposed { .. })
        ));
        assert!(matches!(
            facade.get_queue("jobs").await,
            Err(KvError::Disposed { .. })
        ));
        assert!(matches!(queue.count().await, Err(KvError::PoolClosed)));
    }
}
