//! Response and stream decoding for the Anthropic Messages API.
//!
//! Streaming is a typed event state machine: `message_start` opens the
//! exchange, content blocks start/delta/stop by index, `message_delta`
//! carries the stop reason and final usage, `message_stop` ends it.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::messages::{
    FinishReason, Part, ReasoningMetadata, Response, ToolCall, Usage,
};
use crate::provider::StreamEvent;
use crate::provider::sse::EventProcessor;

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub content: Vec<AnthropicContent>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    pub usage: AnthropicUsage,
}

/// One response content block. A plain struct rather than a tagged enum
/// so unknown block types degrade instead of failing the whole decode.
#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
}

impl From<AnthropicUsage> for Usage {
    fn from(usage: AnthropicUsage) -> Self {
        Self {
            input: usage.input_tokens,
            output: usage.output_tokens,
            cache_creation: usage.cache_creation_input_tokens.unwrap_or(0),
            cache_read: usage.cache_read_input_tokens.unwrap_or(0),
            total: usage.input_tokens + usage.output_tokens,
        }
    }
}

impl AnthropicResponse {
    pub fn into_response(self) -> Response {
        let mut parts = Vec::new();

        for block in self.content {
            match block.kind.as_str() {
                "text" => parts.push(Part::Text {
                    text: block.text.unwrap_or_default(),
                }),
                "thinking" => parts.push(Part::Reasoning {
                    text: block.thinking.unwrap_or_default(),
                    metadata: ReasoningMetadata {
                        signature: block.signature,
                        extra: None,
                    },
                }),
                "tool_use" => parts.push(Part::ToolCall(ToolCall {
                    id: block
                        .id
                        .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4())),
                    name: block.name.unwrap_or_default(),
                    input: block
                        .input
                        .map(|input| input.to_string())
                        .unwrap_or_else(|| "{}".to_string()),
                    provider_executed: false,
                })),
                other => log::warn!("skipping unsupported Anthropic content block '{other}'"),
            }
        }

        Response {
            parts,
            finish_reason: self
                .stop_reason
                .as_deref()
                .map(FinishReason::from_wire)
                .unwrap_or_default(),
            usage: self.usage.into(),
            metadata: self.id.map(|id| serde_json::json!({ "id": id })),
        }
    }
}

// Streaming event types.

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AnthropicStreamEvent {
    MessageStart { message: MessageStart },
    ContentBlockStart {
        index: u32,
        content_block: StartBlock,
    },
    ContentBlockDelta { index: u32, delta: BlockDelta },
    ContentBlockStop { index: u32 },
    MessageDelta {
        delta: MessageDeltaData,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error { error: StreamError },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageStart {
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageDeltaData {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug)]
enum OpenBlock {
    Text,
    Thinking { signature: Option<String> },
    ToolUse { id: String, name: String, arguments: String },
}

/// State machine turning Anthropic stream events into neutral events.
pub(crate) struct AnthropicStreamProcessor {
    provider: String,
    blocks: HashMap<u32, OpenBlock>,
    finished_tools: Vec<ToolCall>,
    usage: Usage,
    finish: Option<FinishReason>,
}

impl AnthropicStreamProcessor {
    pub fn new(provider: String) -> Self {
        Self {
            provider,
            blocks: HashMap::new(),
            finished_tools: Vec::new(),
            usage: Usage::default(),
            finish: None,
        }
    }

    fn process_event(&mut self, event: AnthropicStreamEvent) -> Vec<StreamEvent> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.usage.merge_max(usage.into());
                }
                Vec::new()
            }

            AnthropicStreamEvent::ContentBlockStart { index, content_block } => {
                let block = match content_block.kind.as_str() {
                    "text" => OpenBlock::Text,
                    "thinking" => OpenBlock::Thinking { signature: None },
                    "tool_use" => OpenBlock::ToolUse {
                        id: content_block
                            .id
                            .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4())),
                        name: content_block.name.unwrap_or_default(),
                        arguments: String::new(),
                    },
                    other => {
                        log::warn!("unknown Anthropic content block type '{other}' in stream");
                        return Vec::new();
                    }
                };

                self.blocks.insert(index, block);
                Vec::new()
            }

            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => vec![StreamEvent::TextDelta {
                    id: index.to_string(),
                    text,
                }],
                BlockDelta::ThinkingDelta { thinking } => vec![StreamEvent::ReasoningDelta {
                    id: index.to_string(),
                    text: thinking,
                }],
                BlockDelta::SignatureDelta { signature } => {
                    if let Some(OpenBlock::Thinking { signature: slot }) = self.blocks.get_mut(&index) {
                        match slot {
                            Some(existing) => existing.push_str(&signature),
                            None => *slot = Some(signature),
                        }
                    }
                    Vec::new()
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(OpenBlock::ToolUse { arguments, .. }) = self.blocks.get_mut(&index) {
                        arguments.push_str(&partial_json);
                    }
                    Vec::new()
                }
                BlockDelta::Unknown => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockStop { index } => {
                match self.blocks.remove(&index) {
                    Some(OpenBlock::ToolUse { id, name, arguments }) => {
                        self.finished_tools.push(ToolCall {
                            id,
                            name,
                            input: arguments,
                            provider_executed: false,
                        });
                        Vec::new()
                    }
                    Some(OpenBlock::Thinking { signature }) => vec![StreamEvent::ReasoningEnd {
                        id: index.to_string(),
                        metadata: ReasoningMetadata {
                            signature,
                            extra: None,
                        },
                    }],
                    _ => Vec::new(),
                }
            }

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    self.usage.merge_max(usage.into());
                }
                if let Some(reason) = delta.stop_reason.as_deref() {
                    self.finish = Some(FinishReason::from_wire(reason));
                }
                Vec::new()
            }

            AnthropicStreamEvent::Error { error } => {
                log::error!(
                    "{} stream error event: {} - {}",
                    self.provider,
                    error.kind,
                    error.message
                );
                Vec::new()
            }

            AnthropicStreamEvent::MessageStop
            | AnthropicStreamEvent::Ping
            | AnthropicStreamEvent::Unknown => Vec::new(),
        }
    }
}

impl EventProcessor for AnthropicStreamProcessor {
    fn process_data(&mut self, data: &str) -> Vec<StreamEvent> {
        match sonic_rs::from_str::<AnthropicStreamEvent>(data) {
            Ok(event) => self.process_event(event),
            Err(error) => {
                log::warn!("failed to parse {} streaming event: {error}", self.provider);
                Vec::new()
            }
        }
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        // Blocks the provider never closed still flush their tool calls.
        let mut stragglers: Vec<(u32, OpenBlock)> = self.blocks.drain().collect();
        stragglers.sort_by_key(|(index, _)| *index);

        for (index, block) in stragglers {
            match block {
                OpenBlock::ToolUse { id, name, arguments } => self.finished_tools.push(ToolCall {
                    id,
                    name,
                    input: arguments,
                    provider_executed: false,
                }),
                OpenBlock::Thinking { signature } => events.push(StreamEvent::ReasoningEnd {
                    id: index.to_string(),
                    metadata: ReasoningMetadata {
                        signature,
                        extra: None,
                    },
                }),
                OpenBlock::Text => {}
            }
        }

        for call in std::mem::take(&mut self.finished_tools) {
            events.push(StreamEvent::ToolCall(call));
        }

        events.push(StreamEvent::Usage(self.usage));
        events.push(StreamEvent::Finish(self.finish.take().unwrap_or_default()));
        events
    }
}
