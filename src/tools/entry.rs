//! Key-level tools.
//!
//! This module implements the MCP tools that work on whole keys:
//! `get`, `set`, `remove`, `increment`, `decrement`, `find`, `expire` and `publish`.

use crate::entry::{Entry, DEFAULT_SCAN_PAGE};
use crate::error::{KvError, KvResult};
use crate::facade::KvFacade;
use crate::store::{EntryType, SetCondition};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn default_step() -> i64 {
    1
}

/// Input for the get tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetInput {
    /// Keys to read. Each key is reported with its type and its content.
    pub names: Vec<String>,
}

/// One key as reported by the get tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct EntryOutput {
    pub name: String,
    /// What the key holds: none, scalar, dictionary, list, set or sorted_set
    pub entry_type: EntryType,
    /// String for scalars, object for dictionaries, array for lists and sets, null otherwise
    pub value: serde_json::Value,
    /// Remaining time to live in milliseconds, absent when the key never expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

/// Output from the get tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetOutput {
    pub entries: Vec<EntryOutput>,
}

/// Write condition for the set tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteCondition {
    /// Always write
    #[default]
    Always,
    /// Write only if the key does not exist
    IfAbsent,
    /// Write only if the key already exists
    IfExists,
}

impl From<WriteCondition> for SetCondition {
    fn from(condition: WriteCondition) -> Self {
        match condition {
            WriteCondition::Always => SetCondition::Always,
            WriteCondition::IfAbsent => SetCondition::NotExists,
            WriteCondition::IfExists => SetCondition::Exists,
        }
    }
}

/// Input for the set tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetInput {
    pub name: String,
    pub value: String,
    /// Expire after this many seconds. Cannot be combined with expires_at.
    #[serde(default)]
    pub expiry_secs: Option<u64>,
    /// Expire at this RFC 3339 timestamp. Cannot be combined with expiry_secs.
    #[serde(default)]
    pub expires_at: Option<String>,
    /// always (default), if_absent or if_exists
    #[serde(default)]
    pub condition: WriteCondition,
}

/// Output from the set tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SetOutput {
    /// False when the write condition was not met
    pub written: bool,
}

/// Input for the remove tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemoveInput {
    /// Keys to delete
    pub names: Vec<String>,
}

/// Output from the remove tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RemoveOutput {
    /// Number of keys that existed and were deleted
    pub removed: u64,
}

/// Input for the increment and decrement tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CounterInput {
    pub name: String,
    /// Amount to add or subtract. Default: 1
    #[serde(default = "default_step")]
    pub step: i64,
}

/// Output from the increment and decrement tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CounterOutput {
    pub name: String,
    /// Counter value after the update
    pub value: i64,
}

/// Input for the find tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindInput {
    /// Glob pattern: * matches any run, ? one character, [abc] a class
    pub pattern: String,
}

/// Output from the find tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FindOutput {
    /// Matching keys, sorted
    pub keys: Vec<String>,
    pub count: usize,
}

/// Input for the expire tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExpireInput {
    pub name: String,
    /// Expire after this many seconds
    #[serde(default)]
    pub seconds: Option<u64>,
    /// Expire at this RFC 3339 timestamp
    #[serde(default)]
    pub at: Option<String>,
}

/// Output from the expire tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExpireOutput {
    /// False when the key does not exist
    pub applied: bool,
    /// Remaining time to live in milliseconds after the update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

/// Input for the publish tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PublishInput {
    pub channel: String,
    pub message: String,
}

/// Output from the publish tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PublishOutput {
    /// Number of subscribers that received the message
    pub receivers: u64,
}

pub struct EntryToolHandler {
    facade: Arc<KvFacade>,
}

impl EntryToolHandler {
    pub fn new(facade: Arc<KvFacade>) -> Self {
        Self { facade }
    }

    pub async fn get(&self, input: GetInput) -> KvResult<GetOutput> {
        if input.names.is_empty() {
            return Err(KvError::invalid_argument("At least one name is required"));
        }
        let mut entries = Vec::with_capacity(input.names.len());
        for name in input.names {
            entries.push(self.describe(name).await?);
        }
        Ok(GetOutput { entries })
    }

    pub async fn set(&self, input: SetInput) -> KvResult<SetOutput> {
        let expires_at = input.expires_at.as_deref().map(parse_timestamp).transpose()?;
        if input.expiry_secs.is_some() && expires_at.is_some() {
            return Err(KvError::invalid_argument(
                "expiry_secs and expires_at cannot be combined",
            ));
        }

        let expiry = input.expiry_secs.map(Duration::from_secs);
        let written = self
            .facade
            .set_value_with(&input.name, &input.value, expiry, input.condition.into())
            .await?;
        if let (true, Some(at)) = (written, expires_at) {
            self.facade.set_entry_expiry_at(&input.name, at).await?;
        }

        info!(name = %input.name, written, "Value set");
        Ok(SetOutput { written })
    }

    pub async fn remove(&self, input: RemoveInput) -> KvResult<RemoveOutput> {
        let removed = self.facade.remove_many(&input.names).await?;
        info!(requested = input.names.len(), removed, "Keys removed");
        Ok(RemoveOutput { removed })
    }

    pub async fn increment(&self, input: CounterInput) -> KvResult<CounterOutput> {
        let value = self.facade.increment(&input.name, input.step).await?;
        Ok(CounterOutput {
            name: input.name,
            value,
        })
    }

    pub async fn decrement(&self, input: CounterInput) -> KvResult<CounterOutput> {
        let value = self.facade.decrement(&input.name, input.step).await?;
        Ok(CounterOutput {
            name: input.name,
            value,
        })
    }

    pub async fn find(&self, input: FindInput) -> KvResult<FindOutput> {
        let keys = self.facade.find(&input.pattern).await?;
        Ok(FindOutput {
            count: keys.len(),
            keys,
        })
    }

    pub async fn expire(&self, input: ExpireInput) -> KvResult<ExpireOutput> {
        let applied = match (input.seconds, input.at.as_deref()) {
            (Some(secs), None) => {
                self.facade
                    .set_entry_expiry(&input.name, Duration::from_secs(secs))
                    .await?
            }
            (None, Some(at)) => {
                self.facade
                    .set_entry_expiry_at(&input.name, parse_timestamp(at)?)
                    .await?
            }
            _ => {
                return Err(KvError::invalid_argument(
                    "Provide exactly one of seconds or at",
                ));
            }
        };
        let ttl_ms = self
            .facade
            .get_entry_expiry(&input.name)
            .await?
            .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        Ok(ExpireOutput { applied, ttl_ms })
    }

    pub async fn publish(&self, input: PublishInput) -> KvResult<PublishOutput> {
        let receivers = self.facade.publish(&input.channel, &input.message).await?;
        Ok(PublishOutput { receivers })
    }

    async fn describe(&self, name: String) -> KvResult<EntryOutput> {
        let entry = self.facade.get_entry(&name).await?;
        let entry_type = entry.as_ref().map_or(EntryType::None, Entry::entry_type);
        let value = match entry {
            None | Some(Entry::SortedSet(_)) => serde_json::Value::Null,
            Some(Entry::Scalar(scalar)) => scalar
                .get()
                .await?
                .map_or(serde_json::Value::Null, serde_json::Value::String),
            Some(Entry::Dictionary(dictionary)) => {
                let fields: BTreeMap<String, String> =
                    dictionary.scan(DEFAULT_SCAN_PAGE).try_collect().await?;
                serde_json::json!(fields)
            }
            Some(Entry::Set(set)) => {
                let mut members: Vec<String> = set.scan(DEFAULT_SCAN_PAGE).try_collect().await?;
                members.sort();
                serde_json::json!(members)
            }
            Some(Entry::Queue(queue)) => serde_json::json!(queue.items().await?),
        };
        let ttl_ms = self
            .facade
            .get_entry_expiry(&name)
            .await?
            .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));

        Ok(EntryOutput {
            name,
            entry_type,
            value,
            ttl_ms,
        })
    }
}

fn parse_timestamp(raw: &str) -> KvResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| KvError::invalid_argument(format!("Invalid timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::store::{Connector, MemoryStore};

    fn handler() -> EntryToolHandler {
        let facade = KvFacade::with_connector(
            Connector::Memory(MemoryStore::new()),
            &StoreSettings::memory(),
        )
        .unwrap();
        EntryToolHandler::new(Arc::new(facade))
    }

    #[test]
    fn test_set_input_defaults() {
        let json = r#"{"name": "k", "value": "v"}"#;
        let input: SetInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.condition, WriteCondition::Always);
        assert!(input.expiry_secs.is_none());
        assert!(input.expires_at.is_none());
    }

    #[test]
    fn test_counter_input_default_step() {
        let input: CounterInput = serde_json::from_str(r#"{"name": "hits"}"#).unwrap();
        assert_eq!(input.step, 1);
    }

    #[test]
    fn test_write_condition_names() {
        let input: SetInput =
            serde_json::from_str(r#"{"name": "k", "value": "v", "condition": "if_absent"}"#)
                .unwrap();
        assert_eq!(input.condition, WriteCondition::IfAbsent);
    }

    #[tokio::test]
    async fn test_set_then_get_reports_type_and_value() {
        let handler = handler();
        let out = handler
            .set(SetInput {
                name: "greeting".to_string(),
                value: "hello".to_string(),
                expiry_secs: Some(60),
                expires_at: None,
                condition: WriteCondition::Always,
            })
            .await
            .unwrap();
        assert!(out.written);

        let out = handler
            .get(GetInput {
                names: vec!["greeting".to_string(), "missing".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(out.entries[0].entry_type, EntryType::Scalar);
        assert_eq!(out.entries[0].value, serde_json::json!("hello"));
        assert!(out.entries[0].ttl_ms.is_some());
        assert_eq!(out.entries[1].entry_type, EntryType::None);
        assert!(out.entries[1].value.is_null());
    }

    #[tokio::test]
    async fn test_set_rejects_two_expiries() {
        let handler = handler();
        let err = handler
            .set(SetInput {
                name: "k".to_string(),
                value: "v".to_string(),
                expiry_secs: Some(1),
                expires_at: Some("2030-01-01T00:00:00Z".to_string()),
                condition: WriteCondition::Always,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_expire_requires_exactly_one_option() {
        let handler = handler();
        let err = handler
            .expire(ExpireInput {
                name: "k".to_string(),
                seconds: None,
                at: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_counters_and_find() {
        let handler = handler();
        let input = |name: &str, step| CounterInput {
            name: name.to_string(),
            step,
        };
        assert_eq!(handler.increment(input("hits:a", 5)).await.unwrap().value, 5);
        assert_eq!(handler.decrement(input("hits:a", 2)).await.unwrap().value, 3);
        handler.increment(input("hits:b", 1)).await.unwrap();

        let found = handler
            .find(FindInput {
                pattern: "hits:*".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(found.keys, vec!["hits:a".to_string(), "hits:b".to_string()]);
    }
}
