//! Request shaping for the Google Gemini `generateContent` API, shared by
//! the generative language endpoint and Vertex publisher models.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::{Message, Part, Role, ToolOutput};
use crate::request::CallOptions;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleRequest {
    pub contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GoogleTools>>,
}

impl GoogleRequest {
    pub fn new(messages: &[Message], options: &CallOptions) -> Self {
        let system = collect_system(messages);

        let generation_config = GenerationConfig {
            max_output_tokens: options.max_output_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            thinking_config: options
                .thinking_budget()
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
        };

        let tools = if options.tools.is_empty() {
            None
        } else {
            Some(vec![GoogleTools {
                function_declarations: options
                    .tools
                    .iter()
                    .map(|tool| FunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    })
                    .collect(),
            }])
        };

        Self {
            contents: build_contents(messages),
            system_instruction: system.map(|text| GoogleContent {
                role: None,
                parts: vec![GooglePart::text(text)],
            }),
            generation_config: Some(generation_config),
            tools,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GoogleContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GooglePart>,
}

/// One content part. The same shape serves requests and responses, so
/// every field is optional and skipped when absent.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GooglePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GoogleFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GoogleFunctionResponse>,
    /// True on reasoning parts in thinking-enabled responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl GooglePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GoogleFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GoogleFunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThinkingConfig {
    pub thinking_budget: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleTools {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn collect_system(messages: &[Message]) -> Option<String> {
    let system: Vec<String> = messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(Message::text)
        .filter(|text| !text.is_empty())
        .collect();

    (!system.is_empty()).then(|| system.join("\n\n"))
}

/// Google has no tool-call ids; function responses are matched by name.
/// The id-to-name map is built from the assistant's prior calls while
/// walking the conversation in order.
fn build_contents(messages: &[Message]) -> Vec<GoogleContent> {
    let mut call_names: HashMap<String, String> = HashMap::new();
    let mut contents = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::System => {}
            Role::User => contents.push(GoogleContent {
                role: Some("user".to_string()),
                parts: convert_parts(message, &mut call_names),
            }),
            Role::Assistant => contents.push(GoogleContent {
                role: Some("model".to_string()),
                parts: convert_parts(message, &mut call_names),
            }),
            Role::Tool => contents.push(GoogleContent {
                role: Some("user".to_string()),
                parts: convert_parts(message, &mut call_names),
            }),
        }
    }

    contents
}

fn convert_parts(message: &Message, call_names: &mut HashMap<String, String>) -> Vec<GooglePart> {
    message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(GooglePart::text(text.clone())),
            Part::File { media_type, data } => Some(GooglePart {
                inline_data: Some(InlineData {
                    mime_type: media_type.clone(),
                    data: STANDARD.encode(data),
                }),
                ..Default::default()
            }),
            Part::ToolCall(call) if !call.provider_executed => {
                call_names.insert(call.id.clone(), call.name.clone());
                Some(GooglePart {
                    function_call: Some(GoogleFunctionCall {
                        name: call.name.clone(),
                        args: sonic_rs::from_str(&call.input).unwrap_or(Value::Null),
                    }),
                    ..Default::default()
                })
            }
            Part::ToolCall(_) => None,
            Part::ToolResult(result) => {
                let name = call_names
                    .get(&result.call_id)
                    .cloned()
                    .unwrap_or_else(|| result.call_id.clone());

                let response = match &result.output {
                    ToolOutput::Text { text } => serde_json::json!({ "result": text }),
                    ToolOutput::Error { message } => serde_json::json!({ "error": message }),
                    ToolOutput::Media { media_type, .. } => {
                        serde_json::json!({ "result": format!("[media output: {media_type}]") })
                    }
                };

                Some(GooglePart {
                    function_response: Some(GoogleFunctionResponse { name, response }),
                    ..Default::default()
                })
            }
            Part::Reasoning { .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use insta::assert_json_snapshot;

    use super::*;
    use crate::messages::{ToolCall, ToolResult};

    #[test]
    fn tool_results_resolve_names_from_prior_calls() {
        let messages = vec![
            Message {
                role: Role::Assistant,
                parts: vec![Part::ToolCall(ToolCall {
                    id: "call_7".to_string(),
                    name: "add".to_string(),
                    input: r#"{"a":2,"b":3}"#.to_string(),
                    provider_executed: false,
                })],
            },
            Message::tool_results([ToolResult {
                call_id: "call_7".to_string(),
                output: ToolOutput::text("5"),
            }]),
        ];

        let request = GoogleRequest::new(&messages, &CallOptions::default());

        assert_json_snapshot!(request.contents, @r#"
        [
          {
            "role": "model",
            "parts": [
              {
                "functionCall": {
                  "name": "add",
                  "args": {
                    "a": 2,
                    "b": 3
                  }
                }
              }
            ]
          },
          {
            "role": "user",
            "parts": [
              {
                "functionResponse": {
                  "name": "add",
                  "response": {
                    "result": "5"
                  }
                }
              }
            ]
          }
        ]
        "#);
    }

    #[test]
    fn system_instruction_and_thinking_config() {
        let mut options = CallOptions {
            max_output_tokens: Some(512),
            ..Default::default()
        };
        options
            .provider_options
            .insert("thinking_budget".to_string(), serde_json::json!(256));

        let messages = vec![Message::system("be terse"), Message::user("hi")];
        let request = GoogleRequest::new(&messages, &options);

        assert!(request.system_instruction.is_some());
        let config = request.generation_config.unwrap();
        assert_eq!(config.max_output_tokens, Some(512));
        assert_eq!(config.thinking_config.unwrap().thinking_budget, 256);
        assert_eq!(request.contents.len(), 1);
    }
}
