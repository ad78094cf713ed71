//! Response and stream decoding for Google `generateContent`.
//!
//! Streamed chunks reuse the buffered response shape; each chunk carries
//! a partial candidate plus, eventually, `usageMetadata` and a
//! `finishReason`.

use serde::Deserialize;

use super::input::{GoogleContent, GooglePart};
use crate::messages::{FinishReason, Part, ReasoningMetadata, Response, ToolCall, Usage};
use crate::provider::StreamEvent;
use crate::provider::sse::EventProcessor;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleResponse {
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleCandidate {
    #[serde(default)]
    pub content: Option<GoogleContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
    #[serde(default)]
    pub cached_content_token_count: Option<u64>,
}

impl From<UsageMetadata> for Usage {
    fn from(usage: UsageMetadata) -> Self {
        Self {
            input: usage.prompt_token_count,
            output: usage.candidates_token_count,
            cache_creation: 0,
            cache_read: usage.cached_content_token_count.unwrap_or(0),
            total: usage
                .total_token_count
                .max(usage.prompt_token_count + usage.candidates_token_count),
        }
    }
}

fn synthesize_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4())
}

fn part_from_google(part: GooglePart) -> Option<Part> {
    if let Some(call) = part.function_call {
        // Google assigns no call ids; synthesize stable ones so tool
        // results can still be matched within the conversation.
        return Some(Part::ToolCall(ToolCall {
            id: synthesize_call_id(),
            name: call.name,
            input: call.args.to_string(),
            provider_executed: false,
        }));
    }

    let text = part.text?;
    if text.is_empty() {
        return None;
    }

    if part.thought.unwrap_or(false) {
        Some(Part::Reasoning {
            text,
            metadata: ReasoningMetadata::default(),
        })
    } else {
        Some(Part::Text { text })
    }
}

impl GoogleResponse {
    pub fn into_response(mut self) -> Response {
        let mut parts = Vec::new();
        let mut finish_reason = FinishReason::Stop;

        if !self.candidates.is_empty() {
            let candidate = self.candidates.swap_remove(0);

            if let Some(content) = candidate.content {
                parts.extend(content.parts.into_iter().filter_map(part_from_google));
            }

            if let Some(reason) = candidate.finish_reason.as_deref() {
                finish_reason = FinishReason::from_wire(reason);
            }
        }

        Response {
            parts,
            finish_reason,
            usage: self.usage_metadata.map(Into::into).unwrap_or_default(),
            metadata: None,
        }
    }
}

/// Turns streamed `generateContent` chunks into neutral events.
pub(crate) struct GoogleStreamProcessor {
    provider: String,
    pending_tools: Vec<ToolCall>,
    usage: Usage,
    finish: Option<FinishReason>,
    reasoning_open: bool,
}

impl GoogleStreamProcessor {
    pub fn new(provider: String) -> Self {
        Self {
            provider,
            pending_tools: Vec::new(),
            usage: Usage::default(),
            finish: None,
            reasoning_open: false,
        }
    }
}

impl EventProcessor for GoogleStreamProcessor {
    fn process_data(&mut self, data: &str) -> Vec<StreamEvent> {
        let chunk: GoogleResponse = match sonic_rs::from_str(data) {
            Ok(chunk) => chunk,
            Err(error) => {
                log::warn!("failed to parse {} streaming chunk: {error}", self.provider);
                return Vec::new();
            }
        };

        let mut events = Vec::new();

        if let Some(usage) = chunk.usage_metadata {
            self.usage.merge_max(usage.into());
        }

        for candidate in chunk.candidates {
            if let Some(content) = candidate.content {
                for part in content.parts {
                    if let Some(call) = part.function_call {
                        self.pending_tools.push(ToolCall {
                            id: synthesize_call_id(),
                            name: call.name,
                            input: call.args.to_string(),
                            provider_executed: false,
                        });
                        continue;
                    }

                    let Some(text) = part.text.filter(|text| !text.is_empty()) else {
                        continue;
                    };

                    if part.thought.unwrap_or(false) {
                        self.reasoning_open = true;
                        events.push(StreamEvent::ReasoningDelta {
                            id: "thought".to_string(),
                            text,
                        });
                    } else {
                        events.push(StreamEvent::TextDelta {
                            id: "0".to_string(),
                            text,
                        });
                    }
                }
            }

            if let Some(reason) = candidate.finish_reason.as_deref() {
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
                id: "thought".to_string(),
                metadata: ReasoningMetadata::default(),
            });
        }

        for call in std::mem::take(&mut self.pending_tools) {
            events.push(StreamEvent::ToolCall(call));
        }

        events.push(StreamEvent::Usage(self.usage));
        events.push(StreamEvent::Finish(self.finish.take().unwrap_or_default()));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::sse::tests::decode_bytes;

    fn processor() -> GoogleStreamProcessor {
        GoogleStreamProcessor::new("google".to_string())
    }

    #[tokio::test]
    async fn streamed_chunks_decode_text_function_call_and_usage() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Sure\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"functionCall\":{\"name\":\"add\",\"args\":{\"a\":2,\"b\":3}}}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":8,\"candidatesTokenCount\":5,\"totalTokenCount\":13}}\n\n",
        );

        let events: Vec<_> = decode_bytes(body, 40, processor())
            .await
            .into_iter()
            .map(|event| event.unwrap())
            .collect();

        assert!(matches!(&events[0], StreamEvent::TextDelta { text, .. } if text == "Sure"));

        let StreamEvent::ToolCall(call) = &events[1] else {
            unreachable!("expected function call event");
        };
        assert_eq!(call.name, "add");
        assert!(call.id.starts_with("call_"));

        let StreamEvent::Usage(usage) = &events[2] else {
            unreachable!("expected usage event");
        };
        assert_eq!(usage.total, 13);
    }

    #[tokio::test]
    async fn thought_parts_stream_as_reasoning() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"planning\",\"thought\":true}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"done\"}]},\"finishReason\":\"STOP\"}]}\n\n",
        );

        let events: Vec<_> = decode_bytes(body, 1024, processor())
            .await
            .into_iter()
            .map(|event| event.unwrap())
            .collect();

        assert!(matches!(&events[0], StreamEvent::ReasoningDelta { text, .. } if text == "planning"));
        assert!(matches!(&events[1], StreamEvent::TextDelta { text, .. } if text == "done"));
        assert!(matches!(&events[2], StreamEvent::ReasoningEnd { .. }));
    }

    #[test]
    fn buffered_response_maps_finish_reason() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "answer"}]},
                "finishReason": "MAX_TOKENS"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 9, "totalTokenCount": 12}
        }"#;

        let response: GoogleResponse = sonic_rs::from_str(body).unwrap();
        let response = response.into_response();

        assert_eq!(response.finish_reason, FinishReason::Length);
        assert_eq!(response.text(), "answer");
        assert_eq!(response.usage.output, 9);
    }
}
