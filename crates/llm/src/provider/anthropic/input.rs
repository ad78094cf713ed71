//! Request shaping for the Anthropic Messages API.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;

use crate::messages::{Message, Part, Role, ToolOutput};
use crate::request::CallOptions;

const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicRequest {
    pub model: String,
    /// Required by the API; defaulted when the caller leaves it unset.
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

impl AnthropicRequest {
    pub fn new(model: &str, messages: &[Message], options: &CallOptions, stream: bool) -> Self {
        let system = collect_system(messages);

        let tools = if options.tools.is_empty() {
            None
        } else {
            Some(
                options
                    .tools
                    .iter()
                    .map(|tool| AnthropicTool {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        input_schema: tool.parameters.clone(),
                    })
                    .collect(),
            )
        };

        Self {
            model: model.to_string(),
            max_tokens: options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: build_messages(messages),
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            stream: stream.then_some(true),
            tools,
            thinking: options.thinking_budget().map(|budget_tokens| ThinkingConfig {
                kind: "enabled",
                budget_tokens,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ThinkingConfig {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub budget_tokens: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicMessage {
    pub role: &'static str,
    pub content: AnthropicContent,
}

/// Plain string when the message is pure text, typed blocks otherwise.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AnthropicContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageSource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media_type: String,
    pub data: String,
}

/// System messages are carried in the sibling `system` field, joined in
/// order when there is more than one.
fn collect_system(messages: &[Message]) -> Option<String> {
    let system: Vec<String> = messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(Message::text)
        .filter(|text| !text.is_empty())
        .collect();

    (!system.is_empty()).then(|| system.join("\n\n"))
}

fn build_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::System => {}
            Role::User => out.push(AnthropicMessage {
                role: "user",
                content: convert_content(message),
            }),
            Role::Assistant => out.push(AnthropicMessage {
                role: "assistant",
                content: convert_content(message),
            }),
            // Anthropic carries tool results as user-role messages.
            Role::Tool => out.push(AnthropicMessage {
                role: "user",
                content: convert_content(message),
            }),
        }
    }

    out
}

fn convert_content(message: &Message) -> AnthropicContent {
    let all_text = message
        .parts
        .iter()
        .all(|part| matches!(part, Part::Text { .. }));

    if all_text {
        return AnthropicContent::Text(message.text());
    }

    let blocks = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(AnthropicContentBlock::Text { text: text.clone() }),
            Part::File { media_type, data } => Some(AnthropicContentBlock::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: media_type.clone(),
                    data: STANDARD.encode(data),
                },
            }),
            Part::ToolCall(call) if !call.provider_executed => Some(AnthropicContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: sonic_rs::from_str(&call.input).unwrap_or(Value::Null),
            }),
            Part::ToolCall(_) => None,
            Part::ToolResult(result) => {
                let (content, is_error) = match &result.output {
                    ToolOutput::Text { text } => (text.clone(), None),
                    ToolOutput::Error { message } => (message.clone(), Some(true)),
                    ToolOutput::Media { media_type, .. } => {
                        (format!("[media output: {media_type}]"), None)
                    }
                };
                Some(AnthropicContentBlock::ToolResult {
                    tool_use_id: result.call_id.clone(),
                    content,
                    is_error,
                })
            }
            // Thinking blocks are only replayable with their signature.
            Part::Reasoning { text, metadata } => {
                metadata.signature.as_ref().map(|signature| AnthropicContentBlock::Thinking {
                    thinking: text.clone(),
                    signature: signature.clone(),
                })
            }
        })
        .collect();

    AnthropicContent::Blocks(blocks)
}
