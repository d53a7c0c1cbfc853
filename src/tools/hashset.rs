//! Set tools.
//!
//! This module implements the `hashset_*` MCP tools over set entries.

use crate::entry::DEFAULT_SCAN_PAGE;
use crate::error::{KvError, KvResult};
use crate::facade::KvFacade;
use futures_util::TryStreamExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input for the hashset_get tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HashsetGetInput {
    pub name: String,
    /// Return this many random members instead of all of them
    #[serde(default)]
    pub random: Option<usize>,
}

/// Output from the hashset_get tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct HashsetGetOutput {
    pub name: String,
    /// Members, sorted
    pub members: Vec<String>,
    pub count: usize,
}

/// Input for the hashset_add and hashset_remove tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HashsetMembersInput {
    pub name: String,
    pub members: Vec<String>,
}

/// Output from the hashset_add and hashset_remove tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct HashsetMembersOutput {
    /// Number of members actually added or removed
    pub changed: u64,
}

/// Input for the hashset_count tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HashsetCountInput {
    pub name: String,
}

/// Output from the hashset_count tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct HashsetCountOutput {
    pub name: String,
    pub count: u64,
}

pub struct HashsetToolHandler {
    facade: Arc<KvFacade>,
}

impl HashsetToolHandler {
    pub fn new(facade: Arc<KvFacade>) -> Self {
        Self { facade }
    }

    pub async fn get(&self, input: HashsetGetInput) -> KvResult<HashsetGetOutput> {
        let set = self.facade.get_hashset(&input.name).await?;
        let mut members: Vec<String> = match input.random {
            Some(count) => set.random_values(count).await?,
            None => set.scan(DEFAULT_SCAN_PAGE).try_collect().await?,
        };
        members.sort();
        Ok(HashsetGetOutput {
            name: input.name,
            count: members.len(),
            members,
        })
    }

    pub async fn add(&self, input: HashsetMembersInput) -> KvResult<HashsetMembersOutput> {
        require_members(&input.members)?;
        let set = self.facade.get_hashset(&input.name).await?;
        let changed = set.add_range(&input.members).await?;
        Ok(HashsetMembersOutput { changed })
    }

    pub async fn remove(&self, input: HashsetMembersInput) -> KvResult<HashsetMembersOutput> {
        require_members(&input.members)?;
        let set = self.facade.get_hashset(&input.name).await?;
        let changed = set.remove_range(&input.members).await?;
        Ok(HashsetMembersOutput { changed })
    }

    pub async fn count(&self, input: HashsetCountInput) -> KvResult<HashsetCountOutput> {
        let set = self.facade.get_hashset(&input.name).await?;
        let count = set.count().await?;
        Ok(HashsetCountOutput {
            name: input.name,
            count,
        })
    }
}

fn require_members(members: &[String]) -> KvResult<()> {
    if members.is_empty() {
        return Err(KvError::invalid_argument("At least one member is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::store::{Connector, MemoryStore};

    fn handler() -> HashsetToolHandler {
        let facade = KvFacade::with_connector(
            Connector::Memory(MemoryStore::new()),
            &StoreSettings::memory(),
        )
        .unwrap();
        HashsetToolHandler::new(Arc::new(facade))
    }

    fn members(name: &str, items: &[&str]) -> HashsetMembersInput {
        HashsetMembersInput {
            name: name.to_string(),
            members: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_add_get_count_remove() {
        let handler = handler();
        assert_eq!(handler.add(members("tags", &["b", "a", "b"])).await.unwrap().changed, 2);

        let out = handler
            .get(HashsetGetInput {
                name: "tags".to_string(),
                random: None,
            })
            .await
            .unwrap();
        assert_eq!(out.members, vec!["a".to_string(), "b".to_string()]);

        assert_eq!(handler.remove(members("tags", &["a", "z"])).await.unwrap().changed, 1);
        let count = handler
            .count(HashsetCountInput {
                name: "tags".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(count.count, 1);
    }

    #[tokio::test]
    async fn test_random_sample() {
        let handler = handler();
        handler.add(members("s", &["x", "y", "z"])).await.unwrap();
        let out = handler
            .get(HashsetGetInput {
                name: "s".to_string(),
                random: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(out.count, 2);
    }

    #[tokio::test]
    async fn test_empty_members_rejected() {
        let handler = handler();
        let err = handler.add(members("s", &[])).await.unwrap_err();
        assert!(matches!(err, KvError::InvalidArgument { .. }));
    }
}
