//! Request shaping for the OpenAI chat completions dialect, shared by
//! plain OpenAI, Azure deployments, OpenRouter and any OpenAI-compatible
//! endpoint.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;

use crate::messages::{Message, Part, Role, ToolOutput};
use crate::request::CallOptions;

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl OpenAiRequest {
    pub fn new(model: &str, messages: &[Message], options: &CallOptions, stream: bool) -> Self {
        let tools = if options.tools.is_empty() {
            None
        } else {
            Some(
                options
                    .tools
                    .iter()
                    .map(|tool| OpenAiTool {
                        kind: "function",
                        function: OpenAiFunctionDef {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.parameters.clone(),
                        },
                    })
                    .collect(),
            )
        };

        Self {
            model: model.to_string(),
            messages: build_messages(messages),
            stream,
            // Without include_usage the final usage block never arrives.
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
            max_tokens: options.max_output_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
            tools,
            reasoning_effort: options.reasoning_effort().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<OpenAiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Message content is either a plain string (all parts are text) or a
/// typed part array (any file present). Serializes as whichever form it
/// holds.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: OpenAiFunctionDef,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn data_uri(media_type: &str, data: &[u8]) -> String {
    format!("data:{media_type};base64,{}", STANDARD.encode(data))
}

/// Converts neutral messages into the OpenAI shape. System messages stay
/// inline; tool results fan out into one `tool`-role message per result.
fn build_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::System => out.push(OpenAiMessage {
                role: "system",
                content: Some(OpenAiContent::Text(message.text())),
                tool_calls: None,
                tool_call_id: None,
            }),
            Role::User => out.push(OpenAiMessage {
                role: "user",
                content: Some(user_content(message)),
                tool_calls: None,
                tool_call_id: None,
            }),
            Role::Assistant => out.push(assistant_message(message)),
            Role::Tool => {
                for part in &message.parts {
                    if let Part::ToolResult(result) = part {
                        out.push(OpenAiMessage {
                            role: "tool",
                            content: Some(OpenAiContent::Text(tool_result_text(&result.output))),
                            tool_calls: None,
                            tool_call_id: Some(result.call_id.clone()),
                        });
                    }
                }
            }
        }
    }

    out
}

fn user_content(message: &Message) -> OpenAiContent {
    let has_files = message
        .parts
        .iter()
        .any(|part| matches!(part, Part::File { .. }));

    if !has_files {
        return OpenAiContent::Text(message.text());
    }

    let parts = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(OpenAiContentPart::Text { text: text.clone() }),
            Part::File { media_type, data } => Some(OpenAiContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: data_uri(media_type, data),
                },
            }),
            _ => None,
        })
        .collect();

    OpenAiContent::Parts(parts)
}

fn assistant_message(message: &Message) -> OpenAiMessage {
    let text = message.text();

    let tool_calls: Vec<OpenAiToolCall> = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::ToolCall(call) if !call.provider_executed => Some(OpenAiToolCall {
                id: call.id.clone(),
                kind: "function",
                function: OpenAiFunctionCall {
                    name: call.name.clone(),
                    arguments: call.input.clone(),
                },
            }),
            _ => None,
        })
        .collect();

    OpenAiMessage {
        role: "assistant",
        content: (!text.is_empty()).then_some(OpenAiContent::Text(text)),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    }
}

fn tool_result_text(output: &ToolOutput) -> String {
    match output {
        ToolOutput::Text { text } => text.clone(),
        ToolOutput::Error { message } => format!("Error: {message}"),
        ToolOutput::Media { media_type, data } => data_uri(media_type, data),
    }
}
