pub(crate) mod input;
pub(crate) mod output;

use async_trait::async_trait;
use config::{ProviderConfig, ProviderKind};
use eventsource_stream::Eventsource;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};

use self::input::OpenAiRequest;
use self::output::{OpenAiResponse, OpenAiStreamProcessor};
use crate::error::{Error, Result};
use crate::messages::{Message, Response, validate};
use crate::provider::sse::decode_events;
use crate::provider::{EventStream, LanguageModel};
use crate::request::CallOptions;

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// How requests are addressed and authenticated. Azure deploys models
/// under its own URL scheme and authenticates with an `api-key` header;
/// everyone else shares the chat-completions path and a bearer token.
enum Endpoint {
    Chat { base_url: String },
    AzureDeployment { base_url: String, api_version: String },
}

pub(crate) struct OpenAiModel {
    client: reqwest::Client,
    provider_name: String,
    model: String,
    api_key: Option<SecretString>,
    endpoint: Endpoint,
}

impl OpenAiModel {
    pub fn new(
        provider_name: String,
        model: String,
        config: &ProviderConfig,
        client: reqwest::Client,
    ) -> Self {
        let endpoint = match config.kind {
            ProviderKind::Azure => Endpoint::AzureDeployment {
                // Presence checked by Provider::new.
                base_url: config.base_url.clone().unwrap_or_default(),
                api_version: config
                    .api_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            },
            ProviderKind::Openrouter => Endpoint::Chat {
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENROUTER_API_URL.to_string()),
            },
            _ => Endpoint::Chat {
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_API_URL.to_string()),
            },
        };

        Self {
            client,
            provider_name,
            model,
            api_key: config.api_key.clone(),
            endpoint,
        }
    }

    fn url(&self) -> String {
        match &self.endpoint {
            Endpoint::Chat { base_url } => format!("{base_url}/chat/completions"),
            Endpoint::AzureDeployment { base_url, api_version } => format!(
                "{base_url}/openai/deployments/{}/chat/completions?api-version={api_version}",
                self.model
            ),
        }
    }

    fn request_builder(&self, body: Vec<u8>) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(self.url())
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(key) = &self.api_key {
            builder = match self.endpoint {
                Endpoint::AzureDeployment { .. } => builder.header("api-key", key.expose_secret()),
                Endpoint::Chat { .. } => {
                    builder.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()))
                }
            };
        }

        builder
    }

    async fn send(&self, request: &OpenAiRequest) -> Result<reqwest::Response> {
        let body = sonic_rs::to_vec(request)
            .map_err(|e| Error::decode(&self.provider_name, format!("failed to serialize request: {e}")))?;

        let response = self
            .request_builder(body)
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
impl LanguageModel for OpenAiModel {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<Response> {
        validate(messages)?;

        let request = OpenAiRequest::new(&self.model, messages, options, false);
        let response = self.send(&request).await?;

        let text = response
            .text()
            .await
            .map_err(|e| Error::connection(&self.provider_name, e))?;

        let decoded: OpenAiResponse = sonic_rs::from_str(&text).map_err(|e| {
            log::error!("failed to parse {} chat completion response: {e}", self.provider_name);
            Error::decode(&self.provider_name, e)
        })?;

        Ok(decoded.into_response())
    }

    async fn stream(&self, messages: &[Message], options: &CallOptions) -> Result<EventStream> {
        validate(messages)?;

        let request = OpenAiRequest::new(&self.model, messages, options, true);
        let response = self.send(&request).await?;

        let events = Box::pin(response.bytes_stream().eventsource());
        let processor = OpenAiStreamProcessor::new(self.provider_name.clone());

        Ok(decode_events(events, processor))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
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

    async fn handle_chat(
        State(state): State<CaptureState>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        *state.captured.lock().unwrap() = Some((headers, body));

        Json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 4, "completion_tokens": 1, "total_tokens": 5}
        }))
    }

    async fn spawn_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{address}")
    }

    fn provider_config(kind: &str, base_url: &str, extra: &[(&str, &str)]) -> ProviderConfig {
        let mut table: BTreeMap<String, toml::Value> = BTreeMap::new();
        table.insert("type".to_string(), toml::Value::String(kind.to_string()));
        table.insert("api_key".to_string(), toml::Value::String("test-key".to_string()));
        table.insert("base_url".to_string(), toml::Value::String(base_url.to_string()));
        for (key, value) in extra {
            table.insert(key.to_string(), toml::Value::String(value.to_string()));
        }

        toml::Value::Table(table.into_iter().collect()).try_into().unwrap()
    }

    #[tokio::test]
    async fn generate_sends_bearer_auth_on_chat_endpoint() {
        let state = CaptureState::default();
        let router = Router::new()
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(state.clone());
        let address = spawn_server(router).await;

        let config = provider_config("openai", &format!("{address}/v1"), &[]);
        let provider = Provider::new("openai", config, &config::HttpConfig::default()).unwrap();
        let model = provider.language_model("gpt-4o");

        let response = model
            .generate(&[Message::user("hi")], &CallOptions::default())
            .await
            .unwrap();

        assert_eq!(response.text(), "hello");
        assert_eq!(response.usage.total, 5);

        let (headers, body) = state.captured.lock().unwrap().clone().unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer test-key");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[tokio::test]
    async fn azure_uses_deployment_url_and_api_key_header() {
        let state = CaptureState::default();
        let router = Router::new()
            .route(
                "/openai/deployments/my-gpt/chat/completions",
                post(handle_chat),
            )
            .with_state(state.clone());
        let address = spawn_server(router).await;

        let config = provider_config("azure", &address, &[("api_version", "2024-06-01")]);
        let provider = Provider::new("azure", config, &config::HttpConfig::default()).unwrap();
        let model = provider.language_model("my-gpt");

        model
            .generate(&[Message::user("hi")], &CallOptions::default())
            .await
            .unwrap();

        let (headers, _body) = state.captured.lock().unwrap().clone().unwrap();
        assert_eq!(headers.get("api-key").unwrap(), "test-key");
        assert!(headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn non_2xx_maps_to_api_error_with_status() {
        async fn handle_error() -> impl IntoResponse {
            (
                axum::http::StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"message": "slow down", "type": "rate_limit_error"}})),
            )
        }

        let router = Router::new().route("/v1/chat/completions", post(handle_error));
        let address = spawn_server(router).await;

        let config = provider_config("openai", &format!("{address}/v1"), &[]);
        let provider = Provider::new("openai", config, &config::HttpConfig::default()).unwrap();
        let model = provider.language_model("gpt-4o");

        let error = model
            .generate(&[Message::user("hi")], &CallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(429));
        let Error::Api { title, message, .. } = error else {
            unreachable!("expected Api error");
        };
        assert_eq!(title.as_deref(), Some("rate_limit_error"));
        assert_eq!(message, "slow down");
    }

    #[tokio::test]
    async fn invalid_message_sequence_fails_before_any_http() {
        // Unroutable base URL proves validation short-circuits the call.
        let config = provider_config("openai", "http://127.0.0.1:1/v1", &[]);
        let provider = Provider::new("openai", config, &config::HttpConfig::default()).unwrap();
        let model = provider.language_model("gpt-4o");

        let bad = vec![Message::tool_results([crate::ToolResult {
            call_id: "nope".to_string(),
            output: crate::ToolOutput::text("x"),
        }])];

        let error = model.generate(&bad, &CallOptions::default()).await.unwrap_err();
        assert!(matches!(error, Error::InvalidMessages(_)));
    }
}
