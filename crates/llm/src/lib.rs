//! Provider-neutral LLM client: one message model, one calling contract,
//! per-provider wire codecs underneath.
//!
//! The crate exposes two operations on every model ([`LanguageModel`]):
//! a buffered [`generate`](LanguageModel::generate) and a streaming
//! [`stream`](LanguageModel::stream) producing [`StreamEvent`]s in wire
//! order. All provider-specific request shaping, SSE decoding and error
//! mapping happens inside `provider::{openai,anthropic,google}`.

mod catalog;
mod error;
mod http_client;
mod messages;
pub mod provider;
mod request;
pub mod token_counter;

pub use catalog::{CatalogModel, CatalogProvider, CatalogSync, Fetched};
pub use error::{Error, Result};
pub use messages::{
    FinishReason, Message, Part, ReasoningMetadata, Response, Role, ToolCall, ToolOutput,
    ToolResult, Usage, validate,
};
pub use provider::{
    EventStream, LanguageModel, Provider, ProviderSet, StreamAccumulator, StreamEvent,
    collect_response,
};
pub use request::{CallOptions, ToolDefinition};
