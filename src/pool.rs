//! Bounded connection pool.
//!
//! # Design Decisions
//!
//! - **`Semaphore` for capacity**: one permit per leasable connection, so the number of
//!   concurrently leased connections can never exceed `capacity`
//! - **Lazy construction**: connections are opened through the `Connector` only when no
//!   idle one is available, up to capacity
//! - **`std::sync::Mutex` for the idle queue**: never held across an await, and usable
//!   from `Drop`
//! - **RAII lease**: `PooledConnection` returns its connection on drop, so release happens
//!   on every exit path including early `?` returns and panics
//!
//! A connection that saw a transport failure is discarded instead of being returned;
//! the next acquire opens a fresh one.

use crate::error::{KvError, KvResult};
use crate::store::{Connection, Connector};
use serde::Serialize;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Sizing and timeout settings for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of connections leased at once.
    pub capacity: usize,
    /// Idle connections kept for reuse; extra returned connections are closed.
    pub max_idle: usize,
    /// How long `acquire` waits for a free slot.
    pub acquire_timeout: Duration,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub leased: usize,
    pub idle: usize,
    pub opened: usize,
}

struct PoolInner {
    connector: Connector,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<Connection>>,
    closed: AtomicBool,
    leased: AtomicUsize,
    opened: AtomicUsize,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, VecDeque<Connection>> {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A bounded pool of store connections. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.inner.connector.address())
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Create a pool. No connection is opened until the first `acquire`.
    pub fn new(connector: Connector, config: PoolConfig) -> KvResult<Self> {
        if config.capacity == 0 {
            return Err(KvError::invalid_argument("Pool capacity must be at least 1"));
        }

        info!(
            address = %connector.address(),
            capacity = config.capacity,
            max_idle = config.max_idle,
            "Created connection pool"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(config.capacity)),
                connector,
                config,
                idle: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
                leased: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
            }),
        })
    }

    /// Lease a connection targeting `database`.
    ///
    /// Waits up to the configured acquire timeout for a free slot, then fails with
    /// `PoolExhausted`. Fails with `PoolClosed` once `shutdown` has run.
    pub async fn acquire(&self, database: u32) -> KvResult<PooledConnection> {
        if self.is_closed() {
            return Err(KvError::PoolClosed);
        }

        let started = Instant::now();
        let permit = match tokio::time::timeout(
            self.inner.config.acquire_timeout,
            Arc::clone(&self.inner.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(KvError::PoolClosed),
            Err(_) => {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                warn!(
                    waited_ms,
                    capacity = self.inner.config.capacity,
                    "Connection pool exhausted"
                );
                return Err(KvError::PoolExhausted { waited_ms });
            }
        };

        // Shutdown may have started while we waited.
        if self.is_closed() {
            return Err(KvError::PoolClosed);
        }

        let reused = self.inner.idle().pop_front();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                let conn = self.inner.connector.connect().await?;
                let opened = self.inner.opened.fetch_add(1, Ordering::AcqRel) + 1;
                debug!(opened, "Opened pooled connection");
                conn
            }
        };

        self.inner.leased.fetch_add(1, Ordering::AcqRel);
        let mut lease = PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        };
        lease.select(database).await?;
        Ok(lease)
    }

    /// Return a lease explicitly.
    ///
    /// Equivalent to dropping it, except that a lease from another pool is rejected.
    /// Releasing twice cannot happen: the lease is consumed.
    pub fn release(&self, lease: PooledConnection) -> KvResult<()> {
        if !Arc::ptr_eq(&lease.pool, &self.inner) {
            return Err(KvError::invalid_argument(
                "Connection was not leased from this pool",
            ));
        }
        drop(lease);
        Ok(())
    }

    /// Close the pool: pending and future acquires fail with `PoolClosed` and idle
    /// connections are dropped. Leased connections are closed when returned.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.semaphore.close();
        let drained = {
            let mut idle = self.inner.idle();
            let count = idle.len();
            idle.clear();
            count
        };
        info!(
            address = %self.inner.connector.address(),
            drained,
            leased = self.inner.leased.load(Ordering::Acquire),
            "Connection pool shut down"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.inner.config.capacity,
            leased: self.inner.leased.load(Ordering::Acquire),
            idle: self.inner.idle().len(),
            opened: self.inner.opened.load(Ordering::Acquire),
        }
    }

    /// The connector new connections are opened with.
    pub fn connector(&self) -> &Connector {
        &self.inner.connector
    }
}

/// A leased connection. Returned to its pool when dropped.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    // Released after `Drop::drop` has put the connection back.
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.leased.fetch_sub(1, Ordering::AcqRel);

        let Some(conn) = self.conn.take() else {
            return;
        };
        if conn.is_broken() {
            warn!(database = conn.database(), "Discarding broken connection");
            return;
        }
        if self.pool.closed.load(Ordering::Acquire) {
            return;
        }

        let mut idle = self.pool.idle();
        if idle.len() < self.pool.config.max_idle {
            idle.push_back(conn);
        }
    }
}
