//! Entry type introspection.

use crate::error::KvResult;
use crate::pool::ConnectionPool;
use crate::store::EntryType;
use tracing::debug;

/// Asks the store which type a key holds.
///
/// Results are never cached: a key can be deleted and recreated as another
/// type between two calls.
#[derive(Debug, Clone)]
pub struct EntryTypeProbe {
    pool: ConnectionPool,
    database: u32,
}

impl EntryTypeProbe {
    pub fn new(pool: ConnectionPool, database: u32) -> Self {
        Self { pool, database }
    }

    /// One `TYPE` round trip through a leased connection.
    pub async fn probe(&self, name: &str) -> KvResult<EntryType> {
        let mut conn = self.pool.acquire(self.database).await?;
        let entry_type = conn.key_type(name).await?;
        debug!(name = %name, database = self.database, entry_type = %entry_type, "Probed entry type");
        Ok(entry_type)
    }

    pub fn database(&self) -> u32 {
        self.database
    }
}
