//! Protocol-agnostic message model shared by every provider codec.
//!
//! A conversation is an ordered list of [`Message`]s, each a role plus a
//! sequence of typed [`Part`]s. The part set is closed: providers that
//! cannot express a part (e.g. reasoning on a non-reasoning model) skip it
//! during request shaping rather than failing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Carries tool results back to the model. Only [`Part::ToolResult`]
    /// parts are valid here.
    Tool,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![Part::text(text)],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::text(text)],
        }
    }

    /// A tool-role message carrying the given results.
    pub fn tool_results(results: impl IntoIterator<Item = ToolResult>) -> Self {
        Self {
            role: Role::Tool,
            parts: results.into_iter().map(Part::ToolResult).collect(),
        }
    }

    /// Concatenated text of all [`Part::Text`] parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A single typed chunk of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Free text.
    Text { text: String },

    /// Binary payload with a media type, carried base64 on the wire.
    File {
        media_type: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    /// A model-emitted request to run a named tool.
    ToolCall(ToolCall),

    /// The outcome of a prior tool call, matched by id.
    ToolResult(ToolResult),

    /// Intermediate "thinking" text plus opaque provider metadata.
    Reasoning {
        text: String,
        #[serde(default)]
        metadata: ReasoningMetadata,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A model-emitted tool invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable id the matching [`ToolResult`] must echo.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// JSON-encoded input, exactly as the provider streamed it.
    pub input: String,
    /// True when the provider executed the tool server-side and the call
    /// is informational only.
    #[serde(default)]
    pub provider_executed: bool,
}

/// Result of one tool invocation, matched to its call by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub output: ToolOutput,
}

/// Payload of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    Text { text: String },
    Error { message: String },
    Media {
        media_type: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Opaque provider metadata attached to reasoning parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningMetadata {
    /// Provider signature over the reasoning text (Anthropic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Anything else the provider attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Token accounting for one call. All counters are non-negative; `total`
/// may exceed `input + output` when the provider bills reasoning tokens
/// separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
    pub total: u64,
}

impl Usage {
    /// Merge an observation from a later stream chunk. Counters only move
    /// forward; a provider re-sending a smaller intermediate value never
    /// decreases the running totals.
    pub fn merge_max(&mut self, other: Usage) {
        self.input = self.input.max(other.input);
        self.output = self.output.max(other.output);
        self.cache_creation = self.cache_creation.max(other.cache_creation);
        self.cache_read = self.cache_read.max(other.cache_read);
        self.total = self.total.max(other.total).max(self.input + self.output);
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ToolCalls,
}

impl FinishReason {
    /// Maps a provider's stop reason to the neutral enum. Unknown values
    /// fall back to [`FinishReason::Stop`].
    pub fn from_wire(value: &str) -> Self {
        match value {
            "stop" | "end_turn" | "STOP" | "stop_sequence" => Self::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" => Self::Length,
            "tool_calls" | "tool_use" | "FUNCTION_CALL" => Self::ToolCalls,
            other => {
                log::warn!("unknown finish reason '{other}', treating as stop");
                Self::Stop
            }
        }
    }
}

/// Terminal outcome of one model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub parts: Vec<Part>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    /// Opaque provider metadata (message id, model echo, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Response {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All tool calls the model requested, in emission order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.parts.iter().filter_map(|part| match part {
            Part::ToolCall(call) => Some(call),
            _ => None,
        })
    }
}

/// Checks the conversation invariants before any bytes hit the wire:
/// every tool result references an earlier tool call, tool-role messages
/// carry only tool results, and assistant messages carry none.
pub fn validate(messages: &[Message]) -> Result<()> {
    let mut seen_call_ids: HashSet<&str> = HashSet::new();

    for (index, message) in messages.iter().enumerate() {
        for part in &message.parts {
            match part {
                Part::ToolCall(call) => {
                    if message.role == Role::Tool {
                        return Err(Error::InvalidMessages(format!(
                            "tool message at index {index} contains a non-result part"
                        )));
                    }
                    seen_call_ids.insert(call.id.as_str());
                }
                Part::ToolResult(result) => {
                    if message.role == Role::Assistant {
                        return Err(Error::InvalidMessages(format!(
                            "assistant message at index {index} contains a tool result"
                        )));
                    }
                    if !seen_call_ids.contains(result.call_id.as_str()) {
                        return Err(Error::InvalidMessages(format!(
                            "tool result references unknown call id '{}'",
                            result.call_id
                        )));
                    }
                }
                _ => {
                    if message.role == Role::Tool {
                        return Err(Error::InvalidMessages(format!(
                            "tool message at index {index} contains a non-result part"
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
