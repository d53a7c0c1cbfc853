//! MCP tool implementations.
//!
//! This module contains all store tool handlers. Every handler goes through
//! `KvFacade` and never touches the pool or the registries directly.
//! - `entry`: whole-key tools (get, set, remove, counters, find, expire, publish)
//! - `dictionary`: hash field tools
//! - `hashset`: set member tools
//! - `queue`: FIFO queue tools
//! - `sequence`: named counter tools

pub mod dictionary;
pub mod entry;
pub mod hashset;
pub mod queue;
pub mod sequence;

pub use dictionary::{
    DictionaryCounterInput, DictionaryCounterOutput, DictionaryGetInput, DictionaryGetOutput,
    DictionaryRemoveInput, DictionaryRemoveOutput, DictionarySetInput, DictionarySetOutput,
    DictionaryToolHandler,
};
pub use entry::{
    CounterInput, CounterOutput, EntryToolHandler, ExpireInput, ExpireOutput, FindInput,
    FindOutput, GetInput, GetOutput, PublishInput, PublishOutput, RemoveInput, RemoveOutput,
    SetInput, SetOutput,
};
pub use hashset::{
    HashsetCountInput, HashsetCountOutput, HashsetGetInput, HashsetGetOutput,
    HashsetMembersInput, HashsetMembersOutput, HashsetToolHandler,
};
pub use queue::{
    QueueClearOutput, QueueCountOutput, QueueDequeueInput, QueueEnqueueInput,
    QueueEnqueueOutput, QueueNameInput, QueueTakeInput, QueueToolHandler, QueueValuesOutput,
};
pub use sequence::{
    SequenceInfoInput, SequenceInfoOutput, SequenceNextInput, SequenceNextOutput,
    SequenceToolHandler,
};
