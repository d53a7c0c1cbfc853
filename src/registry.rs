//! Per-database registry of live entry wrappers.
//!
//! # Design Decisions
//!
//! - **`OnceCell` per name**: single-flight wrapper creation, so concurrent first
//!   accessors share one probe and one wrapper instead of racing to build two
//! - **`std::sync::RwLock` for the map**: held only to look up or insert a cell,
//!   never across an await
//! - **Weak back-reference in the dispose hook**: a wrapper that outlives its
//!   registry does not keep it alive
//!
//! # Validation
//!
//! Every lookup validates the key's current remote type. The creating caller
//! probes inside the single-flight initializer; callers that find an existing
//! wrapper probe again, because the key may have been deleted and recreated as
//! another type since the wrapper was built.

use crate::entry::{
    validate_name, DictionaryEntry, Entry, EntryCore, EntryView, QueueEntry, ScalarEntry,
    SetEntry,
};
use crate::error::{KvError, KvResult};
use crate::pool::ConnectionPool;
use crate::probe::EntryTypeProbe;
use crate::store::EntryType;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::OnceCell;
use tracing::debug;

type Slot = Arc<OnceCell<Entry>>;

struct RegistryInner {
    probe: EntryTypeProbe,
    pool: ConnectionPool,
    entries: RwLock<HashMap<String, Slot>>,
}

/// Outcome of a registry lookup.
#[derive(Debug)]
pub struct Lookup<V> {
    pub entry: Arc<V>,
    /// True when this call built the wrapper.
    pub created: bool,
    /// Remote type observed by this call's probe.
    pub observed: EntryType,
}

/// Maps key names to their single live wrapper for one logical database.
#[derive(Clone)]
pub struct EntryRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for EntryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryRegistry")
            .field("database", &self.database())
            .field("len", &self.len())
            .finish()
    }
}

impl EntryRegistry {
    pub fn new(pool: ConnectionPool, database: u32) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                probe: EntryTypeProbe::new(pool.clone(), database),
                pool,
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn database(&self) -> u32 {
        self.inner.probe.database()
    }

    /// Get the live wrapper for `name`, creating it on first access.
    ///
    /// Fails with `TypeMismatch` when the key holds another type than the view
    /// expects, or when a wrapper of another view kind is already registered.
    pub async fn get_or_create<V: EntryView>(&self, name: &str) -> KvResult<Arc<V>> {
        Ok(self.lookup::<V>(name).await?.entry)
    }

    /// Like `get_or_create`, also reporting whether this call built the wrapper.
    pub async fn lookup<V: EntryView>(&self, name: &str) -> KvResult<Lookup<V>> {
        validate_name(name)?;
        self.lookup_with::<V>(name, None).await
    }

    /// Read the type of `name` once and return a wrapper of the view that fits it.
    ///
    /// `None` when the key is absent. Sorted sets have no view and come back
    /// as `Entry::SortedSet`.
    pub async fn resolve(&self, name: &str) -> KvResult<Option<Entry>> {
        validate_name(name)?;
        let observed = self.inner.probe.probe(name).await?;
        let known = Some(observed);
        let entry = match observed {
            EntryType::None => None,
            EntryType::Scalar => Some(Entry::Scalar(
                self.lookup_with::<ScalarEntry>(name, known).await?.entry,
            )),
            EntryType::Dictionary => Some(Entry::Dictionary(
                self.lookup_with::<DictionaryEntry>(name, known).await?.entry,
            )),
            EntryType::List => Some(Entry::Queue(
                self.lookup_with::<QueueEntry>(name, known).await?.entry,
            )),
            EntryType::Set => Some(Entry::Set(
                self.lookup_with::<SetEntry>(name, known).await?.entry,
            )),
            EntryType::SortedSet => Some(Entry::SortedSet(name.to_string())),
        };
        Ok(entry)
    }

    /// Shared lookup path. `known` is a type the caller has already read;
    /// when set, no further round trip is made.
    async fn lookup_with<V: EntryView>(
        &self,
        name: &str,
        known: Option<EntryType>,
    ) -> KvResult<Lookup<V>> {
        let expected = V::KIND.expected_type();
        let slot = VacantSlot {
            registry: self,
            name,
            cell: self.cell(name),
        };

        let mut probed = None;
        let probed_ref = &mut probed;
        let entry = slot
            .cell
            .get_or_try_init(|| async move {
                let actual = match known {
                    Some(actual) => actual,
                    None => self.inner.probe.probe(name).await?,
                };
                check_type(name, expected, actual)?;
                *probed_ref = Some(actual);

                let wrapper = Arc::new(V::from_core(EntryCore::new(
                    name,
                    self.database(),
                    self.inner.pool.clone(),
                )));
                wrapper.core().set_dispose_hook(self.eviction_hook());
                debug!(name = %name, database = self.database(), kind = %V::KIND, "Created entry wrapper");
                Ok::<_, KvError>(V::into_entry(wrapper))
            })
            .await?;

        let (created, observed) = match probed {
            Some(actual) => (true, actual),
            None => {
                let actual = match known {
                    Some(actual) => actual,
                    None => self.inner.probe.probe(name).await?,
                };
                check_type(name, expected, actual)?;
                (false, actual)
            }
        };

        let typed = V::from_entry(entry).ok_or_else(|| {
            let registered = entry
                .view_kind()
                .map_or(EntryType::None, |kind| kind.expected_type());
            KvError::type_mismatch(name, expected, registered)
        })?;

        Ok(Lookup {
            entry: typed,
            created,
            observed,
        })
    }

    /// Current remote type of `name`, uncached.
    pub async fn probe(&self, name: &str) -> KvResult<EntryType> {
        validate_name(name)?;
        self.inner.probe.probe(name).await
    }

    /// The registered wrapper for `name`, if any.
    pub fn get(&self, name: &str) -> Option<Entry> {
        self.read()
            .get(name)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of live wrappers.
    pub fn len(&self) -> usize {
        self.read()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registered wrapper. Wrappers already handed out stay usable.
    pub fn clear(&self) {
        let drained = {
            let mut entries = self.write();
            let count = entries.len();
            entries.clear();
            count
        };
        debug!(database = self.database(), drained, "Registry cleared");
    }

    /// Remove `name` if its registered wrapper is still the one with `id`.
    fn evict(&self, name: &str, id: u64) {
        let mut entries = self.write();
        let current = entries
            .get(name)
            .and_then(|cell| cell.get())
            .and_then(Entry::id);
        if current == Some(id) {
            entries.remove(name);
            debug!(name = %name, database = self.database(), id, "Evicted entry wrapper");
        }
    }

    fn eviction_hook(&self) -> Box<dyn FnOnce(&str, u64) + Send> {
        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        Box::new(move |name, id| {
            if let Some(inner) = weak.upgrade() {
                EntryRegistry { inner }.evict(name, id);
            }
        })
    }

    /// Get or insert the cell for `name` (double-checked under the write lock).
    fn cell(&self, name: &str) -> Slot {
        if let Some(cell) = self.read().get(name) {
            return Arc::clone(cell);
        }
        let mut entries = self.write();
        Arc::clone(
            entries
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Number of cells in the map, including ones still being initialized.
    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.inner
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A cell handed out for one lookup.
///
/// When the lookup ends without filling the cell (an error, or the caller was
/// dropped) and no other lookup is waiting on it, the cell leaves the map.
struct VacantSlot<'a> {
    registry: &'a EntryRegistry,
    name: &'a str,
    cell: Slot,
}

impl Drop for VacantSlot<'_> {
    fn drop(&mut self) {
        if self.cell.initialized() {
            return;
        }
        let cell = std::mem::take(&mut self.cell);
        let mut entries = self.registry.write();
        // map + this guard; other lookups release their clone under the lock too
        let unshared = entries
            .get(self.name)
            .is_some_and(|held| Arc::ptr_eq(held, &cell) && Arc::strong_count(held) == 2);
        if unshared {
            entries.remove(self.name);
        }
        drop(cell);
        drop(entries);
    }
}

fn check_type(name: &str, expected: EntryType, actual: EntryType) -> KvResult<()> {
    if actual == EntryType::None || actual == expected {
        Ok(())
    } else {
        Err(KvError::type_mismatch(name, expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::store::{Connector, MemoryStore};
    use std::time::Duration;

    fn registry() -> (EntryRegistry, ConnectionPool) {
        let pool = ConnectionPool::new(
            Connector::Memory(MemoryStore::new()),
            PoolConfig {
                capacity: 4,
                max_idle: 4,
                acquire_timeout: Duration::from_secs(1),
            },
        )
        .unwrap();
        (EntryRegistry::new(pool.clone(), 0), pool)
    }

    #[tokio::test]
    async fn test_same_name_returns_same_instance() {
        let (registry, _) = registry();
        let a = registry.get_or_create::<QueueEntry>("jobs").await.unwrap();
        let b = registry.get_or_create::<QueueEntry>("jobs").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_reports_creation() {
        let (registry, _) = registry();
        let first = registry.lookup::<DictionaryEntry>("d").await.unwrap();
        assert!(first.created);
        assert_eq!(first.observed, EntryType::None);
        let second = registry.lookup::<DictionaryEntry>("d").await.unwrap();
        assert!(!second.created);
    }

    #[tokio::test]
    async fn test_remote_type_mismatch() {
        let (registry, pool) = registry();
        {
            let mut conn = pool.acquire(0).await.unwrap();
            conn.rpush("jobs", &["a".to_string()]).await.unwrap();
        }
        let err = registry
            .get_or_create::<DictionaryEntry>("jobs")
            .await
            .unwrap_err();
        match err {
            KvError::TypeMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, EntryType::Dictionary);
                assert_eq!(actual, EntryType::List);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_registered_kind_mismatch() {
        let (registry, _) = registry();
        registry.get_or_create::<ScalarEntry>("k").await.unwrap();
        let err = registry.get_or_create::<SetEntry>("k").await.unwrap_err();
        assert!(matches!(err, KvError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_existing_wrapper_is_revalidated() {
        let (registry, pool) = registry();
        registry.get_or_create::<SetEntry>("k").await.unwrap();
        {
            let mut conn = pool.acquire(0).await.unwrap();
            conn.hset("k", &[("f".to_string(), "v".to_string())])
                .await
                .unwrap();
        }
        let err = registry.get_or_create::<SetEntry>("k").await.unwrap_err();
        assert!(matches!(err, KvError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_dispose_evicts_and_recreates() {
        let (registry, _) = registry();
        let first = registry.get_or_create::<QueueEntry>("jobs").await.unwrap();
        first.dispose();
        assert!(registry.get("jobs").is_none());

        let second = registry.get_or_create::<QueueEntry>("jobs").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_disposed());
    }

    #[tokio::test]
    async fn test_stale_dispose_does_not_evict_replacement() {
        let (registry, _) = registry();
        let first = registry.get_or_create::<QueueEntry>("jobs").await.unwrap();
        registry.clear();
        let second = registry.get_or_create::<QueueEntry>("jobs").await.unwrap();

        first.dispose();
        let current = registry.get_or_create::<QueueEntry>("jobs").await.unwrap();
        assert!(Arc::ptr_eq(&second, &current));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (registry, _) = registry();
        let err = registry.get_or_create::<SetEntry>("").await.unwrap_err();
        assert!(matches!(err, KvError::InvalidArgument { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_builds_one_wrapper() {
        let (registry, _) = registry();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_create::<DictionaryEntry>("shared").await
            }));
        }

        let mut wrappers = Vec::new();
        for handle in handles {
            wrappers.push(handle.await.unwrap().unwrap());
        }
        assert!(wrappers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_failed_lookups_leave_no_slots() {
        let (registry, pool) = registry();
        {
            let mut conn = pool.acquire(0).await.unwrap();
            for i in 0..100 {
                conn.rpush(&format!("list:{i}"), &["a".to_string()])
                    .await
                    .unwrap();
            }
        }
        for i in 0..100 {
            let result = registry
                .get_or_create::<DictionaryEntry>(&format!("list:{i}"))
                .await;
            assert!(matches!(result, Err(KvError::TypeMismatch { .. })));
        }
        assert_eq!(registry.slot_count(), 0);

        registry.get_or_create::<QueueEntry>("list:0").await.unwrap();
        assert_eq!(registry.slot_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_lookup_leaves_no_slot() {
        let (registry, pool) = registry();
        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(pool.acquire(0).await.unwrap());
        }

        // the type check waits for a lease that never frees up
        let lookup = registry.get_or_create::<SetEntry>("pending");
        let cancelled = tokio::time::timeout(Duration::from_millis(20), lookup).await;
        assert!(cancelled.is_err());
        assert_eq!(registry.slot_count(), 0);
        drop(held);
    }

    #[tokio::test]
    async fn test_resolve_builds_view_for_observed_type() {
        let (registry, pool) = registry();
        {
            let mut conn = pool.acquire(0).await.unwrap();
            conn.hset("d", &[("f".to_string(), "v".to_string())])
                .await
                .unwrap();
            conn.rpush("q", &["a".to_string()]).await.unwrap();
        }

        assert!(matches!(registry.resolve("d").await.unwrap(), Some(Entry::Dictionary(_))));
        assert!(matches!(registry.resolve("q").await.unwrap(), Some(Entry::Queue(_))));
        assert!(registry.resolve("missing").await.unwrap().is_none());
        assert_eq!(registry.slot_count(), 2);
    }

    #[tokio::test]
    async fn test_known_type_skips_type_query() {
        let (registry, pool) = registry();
        {
            let mut conn = pool.acquire(0).await.unwrap();
            conn.rpush("k", &["a".to_string()]).await.unwrap();
        }

        // the key holds a list, but the caller already observed a set
        let lookup = registry
            .lookup_with::<SetEntry>("k", Some(EntryType::Set))
            .await
            .unwrap();
        assert!(lookup.created);
        assert_eq!(lookup.observed, EntryType::Set);

        let again = registry
            .lookup_with::<SetEntry>("k", Some(EntryType::Set))
            .await
            .unwrap();
        assert!(!again.created);
        assert!(Arc::ptr_eq(&lookup.entry, &again.entry));
    }
}
