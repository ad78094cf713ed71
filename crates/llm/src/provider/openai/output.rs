//! Response and stream decoding for the OpenAI chat completions dialect.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::messages::{FinishReason, Part, ReasoningMetadata, Response, ToolCall, Usage};
use crate::provider::StreamEvent;
use crate::provider::sse::EventProcessor;

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiChoice {
    pub message: OpenAiChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ResponseToolCall>>,
    /// DeepSeek-style reasoning channel; `reasoning` is the OpenRouter
    /// spelling.
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseToolCall {
    pub id: String,
    pub function: ResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        let cache_read = usage.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or(0);

        Self {
            input: usage.prompt_tokens,
            output: usage.completion_tokens,
            cache_creation: 0,
            cache_read,
            total: usage.total_tokens.max(usage.prompt_tokens + usage.completion_tokens),
        }
    }
}

impl OpenAiResponse {
    pub fn into_response(mut self) -> Response {
        let mut parts = Vec::new();
        let mut finish_reason = FinishReason::Stop;

        if !self.choices.is_empty() {
            let choice = self.choices.swap_remove(0);

            let reasoning = choice.message.reasoning_content.or(choice.message.reasoning);
            if let Some(text) = reasoning.filter(|text| !text.is_empty()) {
                parts.push(Part::Reasoning {
                    text,
                    metadata: ReasoningMetadata::default(),
                });
            }

            if let Some(text) = choice.message.content.filter(|text| !text.is_empty()) {
                parts.push(Part::Text { text });
            }

            for call in choice.message.tool_calls.unwrap_or_default() {
                parts.push(Part::ToolCall(ToolCall {
                    id: call.id,
                    name: call.function.name,
                    input: call.function.arguments,
                    provider_executed: false,
                }));
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                finish_reason = FinishReason::from_wire(reason);
            }
        }

        Response {
            parts,
            finish_reason,
            usage: self.usage.map(Into::into).unwrap_or_default(),
            metadata: self.id.map(|id| serde_json::json!({ "id": id })),
        }
    }
}

// Streaming chunk types.

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<StreamToolCall>>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamToolCall {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<StreamFunction>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Reassembles OpenAI stream chunks into neutral events.
///
/// Tool-call deltas sharing an index concatenate only the `arguments`
/// field; `id` and `name` are fixed on first occurrence. Reassembled
/// calls are flushed once, when the stream terminates.
pub(crate) struct OpenAiStreamProcessor {
    provider: String,
    builders: BTreeMap<u32, ToolCallBuilder>,
    usage: Usage,
    finish: Option<FinishReason>,
    reasoning_open: bool,
}

impl OpenAiStreamProcessor {
    pub fn new(provider: String) -> Self {
        Self {
            provider,
            builders: BTreeMap::new(),
            usage: Usage::default(),
            finish: None,
            reasoning_open: false,
        }
    }
}

impl EventProcessor for OpenAiStreamProcessor {
    fn process_data(&mut self, data: &str) -> Vec<StreamEvent> {
        let chunk: OpenAiStreamChunk = match sonic_rs::from_str(data) {
            Ok(chunk) => chunk,
            Err(error) => {
                log::warn!("failed to parse {} streaming chunk: {error}", self.provider);
                return Vec::new();
            }
        };

        let mut events = Vec::new();

        if let Some(usage) = chunk.usage {
            self.usage.merge_max(usage.into());
        }

        for choice in chunk.choices {
            let reasoning = choice.delta.reasoning_content.or(choice.delta.reasoning);
            if let Some(text) = reasoning.filter(|text| !text.is_empty()) {
                self.reasoning_open = true;
                events.push(StreamEvent::ReasoningDelta {
                    id: "reasoning".to_string(),
                    text,
                });
            }

            if let Some(text) = choice.delta.content.filter(|text| !text.is_empty()) {
                events.push(StreamEvent::TextDelta {
                    id: "0".to_string(),
                    text,
                });
            }

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let builder = self.builders.entry(delta.index).or_default();

                if builder.id.is_none() {
                    builder.id = delta.id;
                }
                if let Some(function) = delta.function {
                    if builder.name.is_none() {
                        builder.name = function.name;
                    }
                    if let Some(arguments) = function.arguments {
                        builder.arguments.push_str(&arguments);
                    }
                }
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                self.finish = Some(FinishReason::from_wire(reason));
            }
        }

        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if self.reasoning_open {
            self.reasoning_open = false;
            events.push(StreamEvent::ReasoningEnd {
                id: "reasoning".to_string(),
                metadata: ReasoningMetadata::default(),
            });
        }

        for (index, builder) in std::mem::take(&mut self.builders) {
            let Some(name) = builder.name else {
                log::warn!(
                    "dropping incomplete tool call at index {index} from {} stream",
                    self.provider
                );
                continue;
            };

            events.push(StreamEvent::ToolCall(ToolCall {
                id: builder
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4())),
                name,
                input: builder.arguments,
                provider_executed: false,
            }));
        }

        events.push(StreamEvent::Usage(self.usage));
        events.push(StreamEvent::Finish(self.finish.take().unwrap_or_default()));
        events
    }
}
