//! Shared fixtures for the end-to-end tests: a scripted mock provider
//! speaking the OpenAI chat-completions dialect over HTTP, plus config
//! plumbing to point the runtime at it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;

/// One scripted provider response.
pub enum MockResponse {
    /// A buffered chat completion body.
    Json(Value),
    /// A raw SSE body, served as `text/event-stream`.
    Sse(String),
    /// A provider error with status and body.
    Error(u16, Value),
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// An in-process OpenAI-compatible provider that serves a scripted
/// response sequence and records every request body.
pub struct MockProvider {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn handle_chat(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.requests.lock().unwrap().push(body);

    let next = state.responses.lock().unwrap().pop_front();

    match next {
        Some(MockResponse::Json(value)) => Json(value).into_response(),
        Some(MockResponse::Sse(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/event-stream")],
            body,
        )
            .into_response(),
        Some(MockResponse::Error(status, value)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(value),
        )
            .into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": {"message": "mock script exhausted"}})),
        )
            .into_response(),
    }
}

impl MockProvider {
    pub async fn spawn(responses: Vec<MockResponse>) -> Self {
        let state = MockState {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let requests = state.requests.clone();
        let router = Router::new()
            .route("/chat/completions", post(handle_chat))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{address}"),
            requests,
        }
    }

    /// Request bodies received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// A runtime config with this mock as the only provider, serving
    /// every tier.
    pub fn config(&self) -> config::Config {
        let toml = format!(
            r#"
            [providers.mock]
            type = "openai-compatible"
            api_key = "test-key"
            base_url = "{base}"

            [orchestrator.models]
            small = "mock/test-model"
            medium = "mock/test-model"
            large = "mock/test-model"
            "#,
            base = self.base_url
        );

        toml::from_str(&toml).unwrap()
    }

    pub fn provider_set(&self) -> llm::ProviderSet {
        llm::ProviderSet::from_config(&self.config()).unwrap()
    }
}

/// A buffered chat-completion body whose assistant text is `content`.
pub fn chat_completion(content: &str) -> Value {
    serde_json::json!({
        "id": "chatcmpl-mock",
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 30, "completion_tokens": 20, "total_tokens": 50}
    })
}

/// A completed `agent_output` body handing off to `next_agent`.
pub fn agent_output_completion(summary: &str, next_agent: &str) -> Value {
    let content = format!(
        "Work is done.\n\n```yaml\nagent_output:\n  task_completed: true\n  summary: \"{summary}\"\n  handoff:\n    next_agent: {next_agent}\n    context_for_next: \"Carry on from here.\"\n    priority_items:\n      - keep the tests green\n```\n"
    );
    chat_completion(&content)
}
