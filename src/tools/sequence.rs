//! Sequence tools.
//!
//! This module implements the `sequence_next` and `sequence_info` MCP tools.

use crate::error::KvResult;
use crate::facade::KvFacade;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input for the sequence_next tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SequenceNextInput {
    pub name: String,
    /// Step to advance by. Omit to use the stored interval.
    #[serde(default)]
    pub interval: Option<i64>,
    /// Starting value when the sequence does not exist yet. Default: 0
    #[serde(default)]
    pub seed: i64,
    /// Render the new value through the sequence's format string
    #[serde(default)]
    pub formatted: bool,
}

/// Output from the sequence_next tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SequenceNextOutput {
    pub name: String,
    /// New value, present unless formatted output was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    /// Formatted value, present when formatted output was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Input for the sequence_info tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SequenceInfoInput {
    pub name: String,
}

/// Output from the sequence_info tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SequenceInfoOutput {
    pub name: String,
    /// False when the sequence has never been used
    pub exists: bool,
    pub value: i64,
    pub interval: i64,
    pub format_string: String,
}

pub struct SequenceToolHandler {
    facade: Arc<KvFacade>,
}

impl SequenceToolHandler {
    pub fn new(facade: Arc<KvFacade>) -> Self {
        Self { facade }
    }

    pub async fn next(&self, input: SequenceNextInput) -> KvResult<SequenceNextOutput> {
        let sequences = self.facade.sequences();
        let (value, text) = match (input.formatted, input.interval) {
            (true, _) => (None, Some(sequences.next_string(&input.name).await?)),
            (false, Some(interval)) => (
                Some(sequences.next_with(&input.name, interval, input.seed).await?),
                None,
            ),
            (false, None) => (Some(sequences.next(&input.name).await?), None),
        };
        Ok(SequenceNextOutput {
            name: input.name,
            value,
            text,
        })
    }

    pub async fn info(&self, input: SequenceInfoInput) -> KvResult<SequenceInfoOutput> {
        let output = match self.facade.sequences().info(&input.name).await? {
            Some(info) => SequenceInfoOutput {
                name: info.name,
                exists: true,
                value: info.value,
                interval: info.interval,
                format_string: info.format_string,
            },
            None => SequenceInfoOutput {
                name: input.name,
                exists: false,
                value: 0,
                interval: 1,
                format_string: String::new(),
            },
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::store::{Connector, MemoryStore};

    #[tokio::test]
    async fn test_next_and_info() {
        let facade = KvFacade::with_connector(
            Connector::Memory(MemoryStore::new()),
            &StoreSettings::memory(),
        )
        .unwrap();
        let handler = SequenceToolHandler::new(Arc::new(facade));

        let before = handler
            .info(SequenceInfoInput {
                name: "orders".to_string(),
            })
            .await
            .unwrap();
        assert!(!before.exists);

        let next = handler
            .next(SequenceNextInput {
                name: "orders".to_string(),
                interval: Some(2),
                seed: 100,
                formatted: false,
            })
            .await
            .unwrap();
        assert_eq!(next.value, Some(102));
        assert!(next.text.is_none());

        let info = handler
            .info(SequenceInfoInput {
                name: "orders".to_string(),
            })
            .await
            .unwrap();
        assert!(info.exists);
        assert_eq!(info.value, 102);
        assert_eq!(info.interval, 2);
    }
}
