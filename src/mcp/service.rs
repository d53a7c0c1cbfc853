//! MCP service implementation using rmcp.
//!
//! This module defines the KvService struct with all store tools
//! exposed via the MCP protocol using the rmcp framework's macros.

use crate::facade::KvFacade;
use crate::pool::PoolStats;
use crate::tools::dictionary::{
    DictionaryCounterInput, DictionaryCounterOutput, DictionaryGetInput, DictionaryGetOutput,
    DictionaryRemoveInput, DictionaryRemoveOutput, DictionarySetInput, DictionarySetOutput,
    DictionaryToolHandler,
};
use crate::tools::entry::{
    CounterInput, CounterOutput, EntryToolHandler, ExpireInput, ExpireOutput, FindInput,
    FindOutput, GetInput, GetOutput, PublishInput, PublishOutput, RemoveInput, RemoveOutput,
    SetInput, SetOutput,
};
use crate::tools::hashset::{
    HashsetCountInput, HashsetCountOutput, HashsetGetInput, HashsetGetOutput,
    HashsetMembersInput, HashsetMembersOutput, HashsetToolHandler,
};
use crate::tools::queue::{
    QueueClearOutput, QueueCountOutput, QueueDequeueInput, QueueEnqueueInput,
    QueueEnqueueOutput, QueueNameInput, QueueTakeInput, QueueToolHandler, QueueValuesOutput,
};
use crate::tools::sequence::{
    SequenceInfoInput, SequenceInfoOutput, SequenceNextInput, SequenceNextOutput,
    SequenceToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use std::sync::Arc;

/// Output for the store_info tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct StoreInfoOutput {
    /// Store address and selected database, e.g. 127.0.0.1:6379#0
    pub name: String,
    pub database: u32,
    pub databases: u32,
    pub capacity: usize,
    pub leased: usize,
    pub idle: usize,
    pub opened: usize,
}

impl StoreInfoOutput {
    fn new(facade: &KvFacade, stats: PoolStats) -> Self {
        Self {
            name: facade.name(),
            database: facade.database(),
            databases: facade.database_count(),
            capacity: stats.capacity,
            leased: stats.leased,
            idle: stats.idle,
            opened: stats.opened,
        }
    }
}

#[derive(Clone)]
pub struct KvService {
    /// Shared facade for all store operations
    facade: Arc<KvFacade>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl KvService {
    /// Create a new KvService instance.
    pub fn new(facade: Arc<KvFacade>) -> Self {
        Self {
            facade,
            tool_router: Self::tool_router(),
        }
    }

    fn entries(&self) -> EntryToolHandler {
        EntryToolHandler::new(self.facade.clone())
    }

    fn dictionaries(&self) -> DictionaryToolHandler {
        DictionaryToolHandler::new(self.facade.clone())
    }

    fn hashsets(&self) -> HashsetToolHandler {
        HashsetToolHandler::new(self.facade.clone())
    }

    fn queues(&self) -> QueueToolHandler {
        QueueToolHandler::new(self.facade.clone())
    }
}

#[tool_router]
impl KvService {
    #[tool(description = "Show the store address, selected database, and connection pool usage.")]
    async fn store_info(&self) -> Json<StoreInfoOutput> {
        Json(StoreInfoOutput::new(&self.facade, self.facade.pool_stats()))
    }

    #[tool(
        description = "Read one or more keys.\nEach key is reported with its type (none, scalar, dictionary, list, set, sorted_set), its content, and its remaining TTL."
    )]
    async fn get(&self, Parameters(input): Parameters<GetInput>) -> Result<Json<GetOutput>, McpError> {
        self.entries().get(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(
        description = "Write a scalar value.\nOptional expiry (expiry_secs or expires_at) and write condition (always, if_absent, if_exists)."
    )]
    async fn set(&self, Parameters(input): Parameters<SetInput>) -> Result<Json<SetOutput>, McpError> {
        self.entries().set(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "Delete keys of any type. Returns how many existed.")]
    async fn remove(
        &self,
        Parameters(input): Parameters<RemoveInput>,
    ) -> Result<Json<RemoveOutput>, McpError> {
        self.entries().remove(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "Atomically add to a scalar counter. Missing keys start at 0.")]
    async fn increment(
        &self,
        Parameters(input): Parameters<CounterInput>,
    ) -> Result<Json<CounterOutput>, McpError> {
        self.entries()
            .increment(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Atomically subtract a positive step from a scalar counter.")]
    async fn decrement(
        &self,
        Parameters(input): Parameters<CounterInput>,
    ) -> Result<Json<CounterOutput>, McpError> {
        self.entries()
            .decrement(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "List keys matching a glob pattern (*, ?, [abc]).")]
    async fn find(&self, Parameters(input): Parameters<FindInput>) -> Result<Json<FindOutput>, McpError> {
        self.entries().find(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(
        description = "Set a key's expiry, either relative (seconds) or absolute (at, RFC 3339)."
    )]
    async fn expire(
        &self,
        Parameters(input): Parameters<ExpireInput>,
    ) -> Result<Json<ExpireOutput>, McpError> {
        self.entries().expire(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "Publish a message on a channel. Empty messages are not sent.")]
    async fn publish(
        &self,
        Parameters(input): Parameters<PublishInput>,
    ) -> Result<Json<PublishOutput>, McpError> {
        self.entries().publish(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(
        description = "Read fields of a dictionary (hash).\nOmit fields to read all of them. Fails if the key holds another type."
    )]
    async fn dictionary_get(
        &self,
        Parameters(input): Parameters<DictionaryGetInput>,
    ) -> Result<Json<DictionaryGetOutput>, McpError> {
        self.dictionaries()
            .get(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Write fields of a dictionary.\nSet only_if_absent to keep fields that already exist."
    )]
    async fn dictionary_set(
        &self,
        Parameters(input): Parameters<DictionarySetInput>,
    ) -> Result<Json<DictionarySetOutput>, McpError> {
        self.dictionaries()
            .set(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Delete dictionary fields, or the whole dictionary when fields is omitted.")]
    async fn dictionary_remove(
        &self,
        Parameters(input): Parameters<DictionaryRemoveInput>,
    ) -> Result<Json<DictionaryRemoveOutput>, McpError> {
        self.dictionaries()
            .remove(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Atomically add to a numeric dictionary field.")]
    async fn dictionary_increment(
        &self,
        Parameters(input): Parameters<DictionaryCounterInput>,
    ) -> Result<Json<DictionaryCounterOutput>, McpError> {
        self.dictionaries()
            .increment(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Atomically subtract a positive step from a numeric dictionary field.")]
    async fn dictionary_decrement(
        &self,
        Parameters(input): Parameters<DictionaryCounterInput>,
    ) -> Result<Json<DictionaryCounterOutput>, McpError> {
        self.dictionaries()
            .decrement(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Read the members of a set, or a random sample of them.")]
    async fn hashset_get(
        &self,
        Parameters(input): Parameters<HashsetGetInput>,
    ) -> Result<Json<HashsetGetOutput>, McpError> {
        self.hashsets().get(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "Add members to a set. Returns how many were new.")]
    async fn hashset_add(
        &self,
        Parameters(input): Parameters<HashsetMembersInput>,
    ) -> Result<Json<HashsetMembersOutput>, McpError> {
        self.hashsets().add(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "Remove members from a set. Returns how many were present.")]
    async fn hashset_remove(
        &self,
        Parameters(input): Parameters<HashsetMembersInput>,
    ) -> Result<Json<HashsetMembersOutput>, McpError> {
        self.hashsets()
            .remove(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Count the members of a set.")]
    async fn hashset_count(
        &self,
        Parameters(input): Parameters<HashsetCountInput>,
    ) -> Result<Json<HashsetCountOutput>, McpError> {
        self.hashsets().count(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "Append values to the tail of a queue in one call.")]
    async fn queue_enqueue(
        &self,
        Parameters(input): Parameters<QueueEnqueueInput>,
    ) -> Result<Json<QueueEnqueueOutput>, McpError> {
        self.queues()
            .enqueue(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Remove up to count values from the head of a queue.\nReturns fewer values when the queue runs out."
    )]
    async fn queue_dequeue(
        &self,
        Parameters(input): Parameters<QueueDequeueInput>,
    ) -> Result<Json<QueueValuesOutput>, McpError> {
        self.queues()
            .dequeue(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Read a range of a queue without removing anything.")]
    async fn queue_take(
        &self,
        Parameters(input): Parameters<QueueTakeInput>,
    ) -> Result<Json<QueueValuesOutput>, McpError> {
        self.queues().take(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "Count the values in a queue.")]
    async fn queue_count(
        &self,
        Parameters(input): Parameters<QueueNameInput>,
    ) -> Result<Json<QueueCountOutput>, McpError> {
        self.queues().count(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "Delete a queue and everything in it.")]
    async fn queue_clear(
        &self,
        Parameters(input): Parameters<QueueNameInput>,
    ) -> Result<Json<QueueClearOutput>, McpError> {
        self.queues().clear(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(
        description = "Advance a named sequence and return the new value.\nSet formatted to render it through the sequence's format string."
    )]
    async fn sequence_next(
        &self,
        Parameters(input): Parameters<SequenceNextInput>,
    ) -> Result<Json<SequenceNextOutput>, McpError> {
        SequenceToolHandler::new(self.facade.clone())
            .next(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Show a sequence's current value, interval, and format string.")]
    async fn sequence_info(
        &self,
        Parameters(input): Parameters<SequenceInfoInput>,
    ) -> Result<Json<SequenceInfoOutput>, McpError> {
        SequenceToolHandler::new(self.facade.clone())
            .info(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for KvService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "kv-mcp-server".to_owned(),
                title: Some("KV MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Typed tools for a Redis-compatible key-value store.\n\
                \n\
                ## Workflow\n\
                1. Call `find` to discover keys, then `get` to see each key's type and content\n\
                2. Use the tool family matching the type: `dictionary_*` for dictionaries,\n\
                   `hashset_*` for sets, `queue_*` for lists, `get`/`set`/`increment` for scalars\n\
                \n\
                ## Types\n\
                A key holds exactly one type. Using a dictionary tool on a list (or any other\n\
                mismatched pair) fails with a type mismatch instead of converting the value.\n\
                Missing keys are created by the first write.\n\
                \n\
                ## Queues\n\
                `queue_enqueue` appends to the tail, `queue_dequeue` removes from the head.\n\
                `queue_take` reads without removing."
                    .to_string(),
            ),
        }
    }
}
