//! Typed wrappers over named store entries.
//!
//! Each wrapper binds a name and a logical database, and leases a pooled
//! connection per operation. No wrapper holds a connection between calls.

pub mod dictionary;
pub mod queue;
pub mod scalar;
pub mod set;

pub use dictionary::{DictionaryEntry, DEFAULT_SCAN_PAGE};
pub use queue::{QueueEntry, QueueEvent, QueueEventKind};
pub use scalar::ScalarEntry;
pub use set::SetEntry;

use crate::error::{KvError, KvResult};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::store::EntryType;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Which typed view a caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Scalar,
    Dictionary,
    Set,
    Queue,
}

impl ViewKind {
    /// The entry type a key must hold (or be absent) for this view.
    pub fn expected_type(self) -> EntryType {
        match self {
            ViewKind::Scalar => EntryType::Scalar,
            ViewKind::Dictionary => EntryType::Dictionary,
            ViewKind::Set => EntryType::Set,
            ViewKind::Queue => EntryType::List,
        }
    }
}

impl std::fmt::Display for ViewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewKind::Scalar => write!(f, "scalar"),
            ViewKind::Dictionary => write!(f, "dictionary"),
            ViewKind::Set => write!(f, "set"),
            ViewKind::Queue => write!(f, "queue"),
        }
    }
}

/// A typed handle on a named entry, as returned by `KvFacade::get_entry`.
///
/// Sorted sets have no wrapper; only their name is reported.
#[derive(Debug, Clone)]
pub enum Entry {
    Scalar(Arc<ScalarEntry>),
    Dictionary(Arc<DictionaryEntry>),
    Set(Arc<SetEntry>),
    Queue(Arc<QueueEntry>),
    SortedSet(String),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Scalar(e) => e.name(),
            Entry::Dictionary(e) => e.name(),
            Entry::Set(e) => e.name(),
            Entry::Queue(e) => e.name(),
            Entry::SortedSet(name) => name,
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            Entry::Scalar(_) => EntryType::Scalar,
            Entry::Dictionary(_) => EntryType::Dictionary,
            Entry::Set(_) => EntryType::Set,
            Entry::Queue(_) => EntryType::List,
            Entry::SortedSet(_) => EntryType::SortedSet,
        }
    }

    /// The wrapper's view kind, `None` for sorted sets.
    pub fn view_kind(&self) -> Option<ViewKind> {
        match self {
            Entry::Scalar(_) => Some(ViewKind::Scalar),
            Entry::Dictionary(_) => Some(ViewKind::Dictionary),
            Entry::Set(_) => Some(ViewKind::Set),
            Entry::Queue(_) => Some(ViewKind::Queue),
            Entry::SortedSet(_) => None,
        }
    }

    pub(crate) fn id(&self) -> Option<u64> {
        match self {
            Entry::Scalar(e) => Some(e.core().id()),
            Entry::Dictionary(e) => Some(e.core().id()),
            Entry::Set(e) => Some(e.core().id()),
            Entry::Queue(e) => Some(e.core().id()),
            Entry::SortedSet(_) => None,
        }
    }
}

/// Implemented by every wrapper the registry can hold.
pub trait EntryView: Send + Sync + Sized + 'static {
    const KIND: ViewKind;

    fn from_core(core: EntryCore) -> Self;

    fn core(&self) -> &EntryCore;

    fn into_entry(this: Arc<Self>) -> Entry;

    fn from_entry(entry: &Entry) -> Option<Arc<Self>>;
}

type DisposeHook = Box<dyn FnOnce(&str, u64) + Send>;

/// State shared by every wrapper: identity, target database, pool, and the
/// disposal flag.
pub struct EntryCore {
    id: u64,
    name: String,
    database: u32,
    pool: ConnectionPool,
    disposed: AtomicBool,
    on_dispose: Mutex<Option<DisposeHook>>,
}

impl std::fmt::Debug for EntryCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("database", &self.database)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl EntryCore {
    pub(crate) fn new(name: &str, database: u32, pool: ConnectionPool) -> Self {
        Self {
            id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            database,
            pool,
            disposed: AtomicBool::new(false),
            on_dispose: Mutex::new(None),
        }
    }

    /// Install the callback run once when the wrapper is disposed.
    pub(crate) fn set_dispose_hook(&self, hook: DisposeHook) {
        if let Ok(mut slot) = self.on_dispose.lock() {
            *slot = Some(hook);
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> u32 {
        self.database
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Lease a connection for one operation.
    pub(crate) async fn lease(&self) -> KvResult<PooledConnection> {
        if self.is_disposed() {
            return Err(KvError::disposed(format!("entry '{}'", self.name)));
        }
        self.pool.acquire(self.database).await
    }

    /// Mark disposed and run the hook. Later calls are no-ops.
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(name = %self.name, database = self.database, id = self.id, "Entry disposed");
        let hook = self.on_dispose.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hook) = hook {
            hook(&self.name, self.id);
        }
    }
}

/// Inherent accessors shared by every wrapper.
macro_rules! entry_basics {
    ($ty:ty) => {
        impl $ty {
            /// Key name this wrapper is bound to.
            pub fn name(&self) -> &str {
                self.core.name()
            }

            /// Logical database this wrapper targets.
            pub fn database(&self) -> u32 {
                self.core.database()
            }

            pub fn is_disposed(&self) -> bool {
                self.core.is_disposed()
            }

            /// Dispose the wrapper and evict it from its registry.
            ///
            /// Later operations on this instance fail with `Disposed`; the next
            /// registry lookup for the name builds a fresh wrapper.
            pub fn dispose(&self) {
                self.core.dispose();
            }
        }
    };
}

pub(crate) use entry_basics;

/// Reject empty names before any round trip.
pub(crate) fn validate_name(name: &str) -> KvResult<()> {
    if name.is_empty() {
        return Err(KvError::invalid_argument("Entry name cannot be empty"));
    }
    Ok(())
}

pub(crate) fn validate_names(names: &[String]) -> KvResult<()> {
    names.iter().try_for_each(|name| validate_name(name))
}

pub(crate) fn validate_field(field: &str) -> KvResult<()> {
    if field.is_empty() {
        return Err(KvError::invalid_argument("Field name cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::store::{Connector, MemoryStore};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn pool() -> ConnectionPool {
        ConnectionPool::new(
            Connector::Memory(MemoryStore::new()),
            PoolConfig {
                capacity: 2,
                max_idle: 2,
                acquire_timeout: Duration::from_secs(1),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_queue_view_expects_list() {
        assert_eq!(ViewKind::Queue.expected_type(), EntryType::List);
        assert_eq!(ViewKind::Dictionary.expected_type(), EntryType::Dictionary);
    }

    #[test]
    fn test_ids_are_unique() {
        let pool = pool();
        let a = EntryCore::new("a", 0, pool.clone());
        let b = EntryCore::new("a", 0, pool);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_dispose_runs_hook_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let core = EntryCore::new("jobs", 0, pool());
        let counter = Arc::clone(&calls);
        core.set_dispose_hook(Box::new(move |name, _| {
            assert_eq!(name, "jobs");
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        core.dispose();
        core.dispose();
        assert!(core.is_disposed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lease_after_dispose_fails() {
        let core = EntryCore::new("jobs", 0, pool());
        core.dispose();
        assert!(matches!(core.lease().await, Err(KvError::Disposed { .. })));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("").is_err());
        assert!(validate_name("k").is_ok());
        assert!(validate_names(&["a".to_string(), String::new()]).is_err());
    }
}
