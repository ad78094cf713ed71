pub(crate) mod input;
pub(crate) mod output;

use async_trait::async_trait;
use config::ProviderConfig;
use eventsource_stream::Eventsource;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};

use self::input::AnthropicRequest;
use self::output::{AnthropicResponse, AnthropicStreamProcessor};
use crate::error::{Error, Result};
use crate::messages::{Message, Response, validate};
use crate::provider::sse::decode_events;
use crate::provider::{EventStream, LanguageModel};
use crate::request::CallOptions;

const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";

/// Pinned protocol version, sent on every request.
pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) struct AnthropicModel {
    client: reqwest::Client,
    provider_name: String,
    model: String,
    api_key: Option<SecretString>,
    base_url: String,
}

impl AnthropicModel {
    pub fn new(
        provider_name: String,
        model: String,
        config: &ProviderConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            provider_name,
            model,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_URL.to_string()),
        }
    }

    async fn send(&self, request: &AnthropicRequest) -> Result<reqwest::Response> {
        let url = format!("{}/messages", self.base_url);

        let body = sonic_rs::to_vec(request)
            .map_err(|e| Error::decode(&self.provider_name, format!("failed to serialize request: {e}")))?;

        let mut builder = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::connection(&self.provider_name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("{} API error ({status}): {body}", self.provider_name);
            return Err(Error::from_error_body(&self.provider_name, status.as_u16(), body));
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<Response> {
        validate(messages)?;

        let request = AnthropicRequest::new(&self.model, messages, options, false);
        let response = self.send(&request).await?;

        let text = response
            .text()
            .await
            .map_err(|e| Error::connection(&self.provider_name, e))?;

        let decoded: AnthropicResponse = sonic_rs::from_str(&text).map_err(|e| {
            log::error!("failed to parse {} messages response: {e}", self.provider_name);
            Error::decode(&self.provider_name, e)
        })?;

        Ok(decoded.into_response())
    }

    async fn stream(&self, messages: &[Message], options: &CallOptions) -> Result<EventStream> {
        validate(messages)?;

        let request = AnthropicRequest::new(&self.model, messages, options, true);
        let response = self.send(&request).await?;

        let events = Box::pin(response.bytes_stream().eventsource());
        let processor = AnthropicStreamProcessor::new(self.provider_name.clone());

        Ok(decode_events(events, processor))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;
    use crate::provider::Provider;

    #[derive(Clone, Default)]
    struct CaptureState {
        captured: Arc<Mutex<Option<(HeaderMap, Value)>>>,
    }

    async fn handle_messages(
        State(state): State<CaptureState>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        *state.captured.lock().unwrap() = Some((headers, body));

        Json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "hello"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 9, "output_tokens": 2}
        }))
    }

    #[tokio::test]
    async fn generate_sends_api_key_and_version_headers() {
        let state = CaptureState::default();
        let router = Router::new()
            .route("/v1/messages", post(handle_messages))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let config: ProviderConfig = toml::from_str(&format!(
            "type = \"anthropic\"\napi_key = \"test-key\"\nbase_url = \"http://{address}/v1\"\n"
        ))
        .unwrap();

        let provider = Provider::new("anthropic", config, &config::HttpConfig::default()).unwrap();
        let model = provider.language_model("claude-sonnet-4");

        let options = CallOptions {
            max_output_tokens: Some(128),
            ..Default::default()
        };

        let response = model
            .generate(&[Message::system("be brief"), Message::user("hi")], &options)
            .await
            .unwrap();

        assert_eq!(response.text(), "hello");
        assert_eq!(response.usage.input, 9);

        let (headers, body) = state.captured.lock().unwrap().clone().unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "test-key");
        assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");

        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("stream").is_none());
    }
}
