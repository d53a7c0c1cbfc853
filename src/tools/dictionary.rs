//! Dictionary tools.
//!
//! This module implements the `dictionary_*` MCP tools over hash entries.

use crate::entry::DEFAULT_SCAN_PAGE;
use crate::error::{KvError, KvResult};
use crate::facade::KvFacade;
use futures_util::TryStreamExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

fn default_step() -> i64 {
    1
}

/// Input for the dictionary_get tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DictionaryGetInput {
    /// Dictionary key
    pub name: String,
    /// Fields to read. Omit to read every field.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Output from the dictionary_get tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DictionaryGetOutput {
    pub name: String,
    /// Field values; requested fields that do not exist are null
    pub values: BTreeMap<String, Option<String>>,
}

/// Input for the dictionary_set tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DictionarySetInput {
    pub name: String,
    /// Field/value pairs to write
    pub entries: BTreeMap<String, String>,
    /// Only write fields that do not exist yet. Default: false (overwrite)
    #[serde(default)]
    pub only_if_absent: bool,
}

/// Output from the dictionary_set tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DictionarySetOutput {
    /// Number of fields written
    pub written: u64,
}

/// Input for the dictionary_remove tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DictionaryRemoveInput {
    pub name: String,
    /// Fields to delete. Omit to delete the whole dictionary.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Output from the dictionary_remove tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DictionaryRemoveOutput {
    /// Number of fields (or dictionaries, when clearing) that existed
    pub removed: u64,
}

/// Input for the dictionary_increment and dictionary_decrement tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DictionaryCounterInput {
    pub name: String,
    pub field: String,
    /// Amount to add or subtract. Default: 1
    #[serde(default = "default_step")]
    pub step: i64,
}

/// Output from the dictionary_increment and dictionary_decrement tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DictionaryCounterOutput {
    pub name: String,
    pub field: String,
    /// Field value after the update
    pub value: i64,
}

pub struct DictionaryToolHandler {
    facade: Arc<KvFacade>,
}

impl DictionaryToolHandler {
    pub fn new(facade: Arc<KvFacade>) -> Self {
        Self { facade }
    }

    pub async fn get(&self, input: DictionaryGetInput) -> KvResult<DictionaryGetOutput> {
        let dictionary = self.facade.get_dictionary(&input.name).await?;
        let values: BTreeMap<String, Option<String>> = if input.fields.is_empty() {
            dictionary
                .scan(DEFAULT_SCAN_PAGE)
                .map_ok(|(field, value)| (field, Some(value)))
                .try_collect()
                .await?
        } else {
            let found = dictionary.get_values(&input.fields).await?;
            input.fields.into_iter().zip(found).collect()
        };
        Ok(DictionaryGetOutput {
            name: input.name,
            values,
        })
    }

    pub async fn set(&self, input: DictionarySetInput) -> KvResult<DictionarySetOutput> {
        if input.entries.is_empty() {
            return Err(KvError::invalid_argument("At least one entry is required"));
        }
        let dictionary = self.facade.get_dictionary(&input.name).await?;

        let written = if input.only_if_absent {
            let mut written = 0;
            for (field, value) in &input.entries {
                if dictionary.try_add(field, value).await? {
                    written += 1;
                }
            }
            written
        } else {
            let entries: Vec<(String, String)> = input.entries.into_iter().collect();
            dictionary.set_range(&entries).await?;
            entries.len() as u64
        };

        info!(name = %input.name, written, "Dictionary updated");
        Ok(DictionarySetOutput { written })
    }

    pub async fn remove(&self, input: DictionaryRemoveInput) -> KvResult<DictionaryRemoveOutput> {
        let dictionary = self.facade.get_dictionary(&input.name).await?;
        let removed = if input.fields.is_empty() {
            u64::from(dictionary.clear().await?)
        } else {
            dictionary.remove_range(&input.fields).await?
        };
        Ok(DictionaryRemoveOutput { removed })
    }

    pub async fn increment(
        &self,
        input: DictionaryCounterInput,
    ) -> KvResult<DictionaryCounterOutput> {
        let dictionary = self.facade.get_dictionary(&input.name).await?;
        let value = dictionary.increment(&input.field, input.step).await?;
        Ok(DictionaryCounterOutput {
            name: input.name,
            field: input.field,
            value,
        })
    }

    pub async fn decrement(
        &self,
        input: DictionaryCounterInput,
    ) -> KvResult<DictionaryCounterOutput> {
        let dictionary = self.facade.get_dictionary(&input.name).await?;
        let value = dictionary.decrement(&input.field, input.step).await?;
        Ok(DictionaryCounterOutput {
            name: input.name,
            field: input.field,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::store::{Connector, MemoryStore};

    fn handler() -> DictionaryToolHandler {
        let facade = KvFacade::with_connector(
            Connector::Memory(MemoryStore::new()),
            &StoreSettings::memory(),
        )
        .unwrap();
        DictionaryToolHandler::new(Arc::new(facade))
    }

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_get_input_fields_optional() {
        let input: DictionaryGetInput = serde_json::from_str(r#"{"name": "d"}"#).unwrap();
        assert!(input.fields.is_empty());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let handler = handler();
        let out = handler
            .set(DictionarySetInput {
                name: "user:1".to_string(),
                entries: entries(&[("name", "ada"), ("lang", "rust")]),
                only_if_absent: false,
            })
            .await
            .unwrap();
        assert_eq!(out.written, 2);

        let all = handler
            .get(DictionaryGetInput {
                name: "user:1".to_string(),
                fields: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(all.values.len(), 2);
        assert_eq!(all.values["name"].as_deref(), Some("ada"));

        let some = handler
            .get(DictionaryGetInput {
                name: "user:1".to_string(),
                fields: vec!["lang".to_string(), "age".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(some.values["lang"].as_deref(), Some("rust"));
        assert_eq!(some.values["age"], None);
    }

    #[tokio::test]
    async fn test_only_if_absent_keeps_existing() {
        let handler = handler();
        handler
            .set(DictionarySetInput {
                name: "d".to_string(),
                entries: entries(&[("a", "1")]),
                only_if_absent: false,
            })
            .await
            .unwrap();
        let out = handler
            .set(DictionarySetInput {
                name: "d".to_string(),
                entries: entries(&[("a", "9"), ("b", "2")]),
                only_if_absent: true,
            })
            .await
            .unwrap();
        assert_eq!(out.written, 1);
    }

    #[tokio::test]
    async fn test_remove_fields_then_whole() {
        let handler = handler();
        handler
            .set(DictionarySetInput {
                name: "d".to_string(),
                entries: entries(&[("a", "1"), ("b", "2")]),
                only_if_absent: false,
            })
            .await
            .unwrap();
        let out = handler
            .remove(DictionaryRemoveInput {
                name: "d".to_string(),
                fields: vec!["a".to_string(), "zz".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(out.removed, 1);

        let out = handler
            .remove(DictionaryRemoveInput {
                name: "d".to_string(),
                fields: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(out.removed, 1);
    }

    #[tokio::test]
    async fn test_counters() {
        let handler = handler();
        let input = |step| DictionaryCounterInput {
            name: "stats".to_string(),
            field: "views".to_string(),
            step,
        };
        assert_eq!(handler.increment(input(10)).await.unwrap().value, 10);
        assert_eq!(handler.decrement(input(4)).await.unwrap().value, 6);
        assert!(handler.decrement(input(0)).await.is_err());
    }
}
