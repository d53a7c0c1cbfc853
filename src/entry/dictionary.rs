//! Hash-backed dictionary wrapper.

use super::{entry_basics, validate_field, Entry, EntryCore, EntryView, ViewKind};
use crate::error::{KvError, KvResult};
use futures_util::stream::{self, Stream, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;

/// Default number of fields fetched per scan round trip.
pub const DEFAULT_SCAN_PAGE: usize = 100;

/// Field/value pairs stored in one hash.
#[derive(Debug)]
pub struct DictionaryEntry {
    core: EntryCore,
}

entry_basics!(DictionaryEntry);

impl EntryView for DictionaryEntry {
    const KIND: ViewKind = ViewKind::Dictionary;

    fn from_core(core: EntryCore) -> Self {
        Self { core }
    }

    fn core(&self) -> &EntryCore {
        &self.core
    }

    fn into_entry(this: Arc<Self>) -> Entry {
        Entry::Dictionary(this)
    }

    fn from_entry(entry: &Entry) -> Option<Arc<Self>> {
        match entry {
            Entry::Dictionary(e) => Some(Arc::clone(e)),
            _ => None,
        }
    }
}

impl DictionaryEntry {
    pub async fn get(&self, field: &str) -> KvResult<Option<String>> {
        validate_field(field)?;
        let mut conn = self.core.lease().await?;
        conn.hget(self.name(), field).await
    }

    /// Values for several fields in one round trip, in request order.
    pub async fn get_values(&self, fields: &[String]) -> KvResult<Vec<Option<String>>> {
        fields.iter().try_for_each(|f| validate_field(f))?;
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.core.lease().await?;
        conn.hmget(self.name(), fields).await
    }

    /// Overwrite one field. Returns true if the field was new.
    pub async fn set(&self, field: &str, value: &str) -> KvResult<bool> {
        validate_field(field)?;
        let mut conn = self.core.lease().await?;
        let created = conn
            .hset(self.name(), &[(field.to_string(), value.to_string())])
            .await?;
        Ok(created > 0)
    }

    /// Overwrite many fields in one round trip. An empty batch is a no-op.
    pub async fn set_range(&self, entries: &[(String, String)]) -> KvResult<()> {
        entries.iter().try_for_each(|(f, _)| validate_field(f))?;
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.core.lease().await?;
        conn.hset(self.name(), entries).await?;
        Ok(())
    }

    /// Write only if the field is absent. Returns whether the write happened.
    pub async fn try_add(&self, field: &str, value: &str) -> KvResult<bool> {
        validate_field(field)?;
        let mut conn = self.core.lease().await?;
        conn.hsetnx(self.name(), field, value).await
    }

    /// Like `try_add`, but an existing field is an error.
    pub async fn add(&self, field: &str, value: &str) -> KvResult<()> {
        if self.try_add(field, value).await? {
            Ok(())
        } else {
            Err(KvError::invalid_argument(format!(
                "Field '{}' already exists in '{}'",
                field,
                self.name()
            )))
        }
    }

    pub async fn remove(&self, field: &str) -> KvResult<bool> {
        validate_field(field)?;
        let mut conn = self.core.lease().await?;
        Ok(conn.hdel(self.name(), &[field.to_string()]).await? > 0)
    }

    /// Remove several fields, returning how many existed.
    pub async fn remove_range(&self, fields: &[String]) -> KvResult<u64> {
        fields.iter().try_for_each(|f| validate_field(f))?;
        if fields.is_empty() {
            return Ok(0);
        }
        let mut conn = self.core.lease().await?;
        conn.hdel(self.name(), fields).await
    }

    pub async fn contains_key(&self, field: &str) -> KvResult<bool> {
        validate_field(field)?;
        let mut conn = self.core.lease().await?;
        conn.hexists(self.name(), field).await
    }

    /// Atomically add `step` to a numeric field and return the new value.
    pub async fn increment(&self, field: &str, step: i64) -> KvResult<i64> {
        validate_field(field)?;
        if step == 0 {
            return Err(KvError::invalid_argument("Increment step cannot be zero"));
        }
        let mut conn = self.core.lease().await?;
        conn.hincr_by(self.name(), field, step).await
    }

    /// Atomically subtract a positive `step` and return the new value.
    pub async fn decrement(&self, field: &str, step: i64) -> KvResult<i64> {
        validate_field(field)?;
        if step <= 0 {
            return Err(KvError::invalid_argument(
                "Decrement step must be greater than zero",
            ));
        }
        let mut conn = self.core.lease().await?;
        conn.hincr_by(self.name(), field, -step).await
    }

    pub async fn count(&self) -> KvResult<u64> {
        let mut conn = self.core.lease().await?;
        conn.hlen(self.name()).await
    }

    pub async fn keys(&self) -> KvResult<Vec<String>> {
        let mut conn = self.core.lease().await?;
        conn.hkeys(self.name()).await
    }

    pub async fn values(&self) -> KvResult<Vec<String>> {
        let mut conn = self.core.lease().await?;
        conn.hvals(self.name()).await
    }

    /// Every field in one round trip. Prefer `scan` for large hashes.
    pub async fn get_all(&self) -> KvResult<HashMap<String, String>> {
        let mut conn = self.core.lease().await?;
        conn.hgetall(self.name()).await
    }

    /// Stream every field/value pair, one `HSCAN` page per round trip.
    ///
    /// A connection is leased per page, not for the life of the stream.
    pub fn scan(
        &self,
        page_size: usize,
    ) -> impl Stream<Item = KvResult<(String, String)>> + Send + '_ {
        let page_size = page_size.max(1);
        stream::try_unfold(Some(0u64), move |cursor| async move {
            let Some(cursor) = cursor else {
                return Ok(None);
            };
            let mut conn = self.core.lease().await?;
            let (next, page) = conn.hscan(self.name(), cursor, page_size).await?;
            let next = (next != 0).then_some(next);
            Ok::<_, KvError>(Some((
                stream::iter(page.into_iter().map(Ok::<_, KvError>)),
                next,
            )))
        })
        .try_flatten()
    }

    /// Collect `scan` into a vector.
    pub async fn entries(&self) -> KvResult<Vec<(String, String)>> {
        self.scan(DEFAULT_SCAN_PAGE).try_collect().await
    }

    /// Delete the whole hash. Returns whether it existed.
    pub async fn clear(&self) -> KvResult<bool> {
        let mut conn = self.core.lease().await?;
        Ok(conn.del(&[self.name().to_string()]).await? > 0)
    }
}
