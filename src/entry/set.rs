//! Unordered set wrapper.

use super::{entry_basics, validate_name, validate_names, Entry, EntryCore, EntryView, ViewKind};
use crate::error::{KvError, KvResult};
use crate::store::SetOperation;
use futures_util::stream::{self, Stream, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;

/// Unique members stored under one key.
#[derive(Debug)]
pub struct SetEntry {
    core: EntryCore,
}

entry_basics!(SetEntry);

impl EntryView for SetEntry {
    const KIND: ViewKind = ViewKind::Set;

    fn from_core(core: EntryCore) -> Self {
        Self { core }
    }

    fn core(&self) -> &EntryCore {
        &self.core
    }

    fn into_entry(this: Arc<Self>) -> Entry {
        Entry::Set(this)
    }

    fn from_entry(entry: &Entry) -> Option<Arc<Self>> {
        match entry {
            Entry::Set(e) => Some(Arc::clone(e)),
            _ => None,
        }
    }
}

impl SetEntry {
    /// Returns true if the member was not already present.
    pub async fn add(&self, member: &str) -> KvResult<bool> {
        let mut conn = self.core.lease().await?;
        Ok(conn.sadd(self.name(), &[member.to_string()]).await? > 0)
    }

    /// Add many members in one round trip, returning how many were new.
    pub async fn add_range(&self, members: &[String]) -> KvResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.core.lease().await?;
        conn.sadd(self.name(), members).await
    }

    pub async fn remove(&self, member: &str) -> KvResult<bool> {
        let mut conn = self.core.lease().await?;
        Ok(conn.srem(self.name(), &[member.to_string()]).await? > 0)
    }

    pub async fn remove_range(&self, members: &[String]) -> KvResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.core.lease().await?;
        conn.srem(self.name(), members).await
    }

    pub async fn contains(&self, member: &str) -> KvResult<bool> {
        let mut conn = self.core.lease().await?;
        conn.sismember(self.name(), member).await
    }

    pub async fn count(&self) -> KvResult<u64> {
        let mut conn = self.core.lease().await?;
        conn.scard(self.name()).await
    }

    /// Up to `count` distinct members picked at random.
    pub async fn random_values(&self, count: usize) -> KvResult<Vec<String>> {
        if count == 0 {
            return Err(KvError::invalid_argument("Sample size must be at least 1"));
        }
        let mut conn = self.core.lease().await?;
        conn.srandmember(self.name(), count).await
    }

    pub async fn members(&self) -> KvResult<HashSet<String>> {
        let mut conn = self.core.lease().await?;
        conn.smembers(self.name()).await
    }

    /// Stream members, one `SSCAN` page per round trip.
    pub fn scan(&self, page_size: usize) -> impl Stream<Item = KvResult<String>> + Send + '_ {
        let page_size = page_size.max(1);
        stream::try_unfold(Some(0u64), move |cursor| async move {
            let Some(cursor) = cursor else {
                return Ok(None);
            };
            let mut conn = self.core.lease().await?;
            let (next, page) = conn.sscan(self.name(), cursor, page_size).await?;
            let next = (next != 0).then_some(next);
            Ok::<_, KvError>(Some((
                stream::iter(page.into_iter().map(Ok::<_, KvError>)),
                next,
            )))
        })
        .try_flatten()
    }

    /// Members of this set or any of `others`.
    pub async fn get_union(&self, others: &[String]) -> KvResult<HashSet<String>> {
        self.combine(SetOperation::Union, others).await
    }

    /// Members of this set present in every one of `others`.
    pub async fn get_intersect(&self, others: &[String]) -> KvResult<HashSet<String>> {
        self.combine(SetOperation::Intersect, others).await
    }

    /// Members of this set absent from all of `others`.
    pub async fn get_except(&self, others: &[String]) -> KvResult<HashSet<String>> {
        self.combine(SetOperation::Difference, others).await
    }

    /// Store the union in `destination` (which may be this set), returning its size.
    pub async fn set_union(&self, destination: &str, others: &[String]) -> KvResult<u64> {
        self.combine_store(SetOperation::Union, destination, others)
            .await
    }

    pub async fn set_intersect(&self, destination: &str, others: &[String]) -> KvResult<u64> {
        self.combine_store(SetOperation::Intersect, destination, others)
            .await
    }

    pub async fn set_except(&self, destination: &str, others: &[String]) -> KvResult<u64> {
        self.combine_store(SetOperation::Difference, destination, others)
            .await
    }

    /// Atomically move `member` into the `destination` set.
    pub async fn move_to(&self, destination: &str, member: &str) -> KvResult<bool> {
        validate_name(destination)?;
        let mut conn = self.core.lease().await?;
        conn.smove(self.name(), destination, member).await
    }

    /// Delete the whole set. Returns whether it existed.
    pub async fn clear(&self) -> KvResult<bool> {
        let mut conn = self.core.lease().await?;
        Ok(conn.del(&[self.name().to_string()]).await? > 0)
    }

    async fn combine(&self, operation: SetOperation, others: &[String]) -> KvResult<HashSet<String>> {
        let keys = self.with_others(others)?;
        let mut conn = self.core.lease().await?;
        conn.set_combine(operation, &keys).await
    }

    async fn combine_store(
        &self,
        operation: SetOperation,
        destination: &str,
        others: &[String],
    ) -> KvResult<u64> {
        validate_name(destination)?;
        let keys = self.with_others(others)?;
        let mut conn = self.core.lease().await?;
        conn.set_combine_store(operation, destination, &keys).await
    }

    fn with_others(&self, others: &[String]) -> KvResult<Vec<String>> {
        validate_names(others)?;
        let mut keys = Vec::with_capacity(others.len() + 1);
        keys.push(self.name().to_string());
        keys.extend_from_slice(others);
        Ok(keys)
    }
}
