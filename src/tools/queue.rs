//! Queue tools.
//!
//! This module implements the `queue_*` MCP tools over FIFO list entries.

use crate::error::{KvError, KvResult};
use crate::facade::KvFacade;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

fn default_count() -> usize {
    1
}

/// Input for the queue_enqueue tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueueEnqueueInput {
    pub name: String,
    /// Values appended to the tail, in order
    pub values: Vec<String>,
}

/// Output from the queue_enqueue tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueueEnqueueOutput {
    /// Queue length after the append
    pub length: u64,
}

/// Input for the queue_dequeue tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueueDequeueInput {
    pub name: String,
    /// Maximum number of values to remove from the head. Default: 1
    #[serde(default = "default_count")]
    pub count: usize,
}

/// Input for the queue_take tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueueTakeInput {
    pub name: String,
    /// Zero-based start position. Default: 0
    #[serde(default)]
    pub index: usize,
    /// Number of values to read. Default: 0 (to the end)
    #[serde(default)]
    pub length: usize,
}

/// Output from the queue_dequeue and queue_take tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueueValuesOutput {
    pub name: String,
    /// Values, head first
    pub values: Vec<String>,
}

/// Input for the queue_count and queue_clear tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueueNameInput {
    pub name: String,
}

/// Output from the queue_count tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueueCountOutput {
    pub name: String,
    pub count: u64,
}

/// Output from the queue_clear tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueueClearOutput {
    /// False when the queue did not exist
    pub cleared: bool,
}

pub struct QueueToolHandler {
    facade: Arc<KvFacade>,
}

impl QueueToolHandler {
    pub fn new(facade: Arc<KvFacade>) -> Self {
        Self { facade }
    }

    pub async fn enqueue(&self, input: QueueEnqueueInput) -> KvResult<QueueEnqueueOutput> {
        if input.values.is_empty() {
            return Err(KvError::invalid_argument("At least one value is required"));
        }
        let queue = self.facade.get_queue(&input.name).await?;
        let length = queue.enqueue_many(&input.values).await?;
        info!(name = %input.name, added = input.values.len(), length, "Enqueued");
        Ok(QueueEnqueueOutput { length })
    }

    pub async fn dequeue(&self, input: QueueDequeueInput) -> KvResult<QueueValuesOutput> {
        let queue = self.facade.get_queue(&input.name).await?;
        let values = queue.dequeue_many(input.count).await?;
        Ok(QueueValuesOutput {
            name: input.name,
            values,
        })
    }

    pub async fn take(&self, input: QueueTakeInput) -> KvResult<QueueValuesOutput> {
        let queue = self.facade.get_queue(&input.name).await?;
        let values = queue.take(input.index, input.length).await?;
        Ok(QueueValuesOutput {
            name: input.name,
            values,
        })
    }

    pub async fn count(&self, input: QueueNameInput) -> KvResult<QueueCountOutput> {
        let queue = self.facade.get_queue(&input.name).await?;
        let count = queue.count().await?;
        Ok(QueueCountOutput {
            name: input.name,
            count,
        })
    }

    pub async fn clear(&self, input: QueueNameInput) -> KvResult<QueueClearOutput> {
        let queue = self.facade.get_queue(&input.name).await?;
        let cleared = queue.clear().await?;
        Ok(QueueClearOutput { cleared })
    }
}
