//! The uniform `LanguageModel` contract and the provider factory above the
//! per-provider wire codecs.

pub(crate) mod anthropic;
pub(crate) mod google;
pub(crate) mod openai;
pub(crate) mod sse;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::ProviderKind;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;

use crate::error::{Error, Result};
use crate::http_client::default_http_client_builder;
use crate::messages::{FinishReason, Message, Part, ReasoningMetadata, Response, ToolCall, Usage};
use crate::request::CallOptions;

/// One decoded stream observation, delivered in wire order.
///
/// Text and reasoning deltas are emitted as they arrive. Tool-call deltas
/// are reassembled inside the codec and surface as a single complete
/// [`StreamEvent::ToolCall`] after the content deltas, before the terminal
/// [`StreamEvent::Usage`] and [`StreamEvent::Finish`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta { id: String, text: String },
    ReasoningDelta { id: String, text: String },
    ReasoningEnd {
        id: String,
        metadata: ReasoningMetadata,
    },
    ToolCall(ToolCall),
    Usage(Usage),
    Finish(FinishReason),
}

/// A pinned stream of decoded events from one model call.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// The uniform contract over heterogeneous provider APIs. All semantics
/// live in the codec behind each implementation; this trait is dispatch
/// only.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Configured provider name this model belongs to.
    fn provider_name(&self) -> &str;

    /// Provider-side model identifier.
    fn model_id(&self) -> &str;

    /// One buffered exchange.
    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<Response>;

    /// One streaming exchange. Events arrive in wire order; dropping the
    /// stream aborts the underlying request.
    async fn stream(&self, messages: &[Message], options: &CallOptions) -> Result<EventStream>;
}

/// Folds stream events into the terminal [`Response`].
///
/// A partially consumed stream folds into a partial response with
/// [`FinishReason::Stop`] and whatever usage was observed.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    parts: Vec<Part>,
    text_blocks: HashMap<String, usize>,
    reasoning_blocks: HashMap<String, usize>,
    usage: Usage,
    finish: Option<FinishReason>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::TextDelta { id, text } => {
                let index = *self.text_blocks.entry(id).or_insert_with(|| {
                    self.parts.push(Part::Text { text: String::new() });
                    self.parts.len() - 1
                });
                if let Some(Part::Text { text: buffer }) = self.parts.get_mut(index) {
                    buffer.push_str(&text);
                }
            }
            StreamEvent::ReasoningDelta { id, text } => {
                let index = *self.reasoning_blocks.entry(id).or_insert_with(|| {
                    self.parts.push(Part::Reasoning {
                        text: String::new(),
                        metadata: ReasoningMetadata::default(),
                    });
                    self.parts.len() - 1
                });
                if let Some(Part::Reasoning { text: buffer, .. }) = self.parts.get_mut(index) {
                    buffer.push_str(&text);
                }
            }
            StreamEvent::ReasoningEnd { id, metadata } => {
                if let Some(index) = self.reasoning_blocks.remove(&id)
                    && let Some(Part::Reasoning { metadata: slot, .. }) = self.parts.get_mut(index)
                {
                    *slot = metadata;
                }
            }
            StreamEvent::ToolCall(call) => self.parts.push(Part::ToolCall(call)),
            StreamEvent::Usage(usage) => self.usage.merge_max(usage),
            StreamEvent::Finish(reason) => self.finish = Some(reason),
        }
    }

    pub fn into_response(self) -> Response {
        Response {
            parts: self.parts,
            finish_reason: self.finish.unwrap_or_default(),
            usage: self.usage,
            metadata: None,
        }
    }
}

/// Drains an event stream into its terminal [`Response`].
pub async fn collect_response(mut stream: EventStream) -> Result<Response> {
    let mut accumulator = StreamAccumulator::new();

    while let Some(event) = stream.next().await {
        accumulator.apply(event?);
    }

    Ok(accumulator.into_response())
}

/// A configured provider; the factory for its [`LanguageModel`]s.
pub struct Provider {
    name: String,
    config: config::ProviderConfig,
    client: reqwest::Client,
}

impl Provider {
    pub fn new(
        name: impl Into<String>,
        config: config::ProviderConfig,
        http: &config::HttpConfig,
    ) -> Result<Self> {
        let name = name.into();

        match config.kind {
            ProviderKind::Azure | ProviderKind::OpenaiCompatible if config.base_url.is_none() => {
                return Err(Error::Configuration(format!(
                    "provider '{name}' requires a base_url"
                )));
            }
            ProviderKind::Vertex if config.project.is_none() || config.location.is_none() => {
                return Err(Error::Configuration(format!(
                    "provider '{name}' requires project and location"
                )));
            }
            _ => {}
        }

        let mut headers = HeaderMap::new();
        if config.kind == ProviderKind::Anthropic {
            headers.insert("anthropic-version", anthropic::ANTHROPIC_VERSION.parse().map_err(|_| {
                Error::Configuration("anthropic version header is not a valid header value".to_string())
            })?);
        }

        let client = default_http_client_builder(headers, Duration::from_secs(http.request_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client for '{name}': {e}")))?;

        Ok(Self { name, config, client })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    /// Constructs the codec driver for one of this provider's models.
    pub fn language_model(&self, model_id: &str) -> Arc<dyn LanguageModel> {
        match self.config.kind {
            ProviderKind::Anthropic => Arc::new(anthropic::AnthropicModel::new(
                self.name.clone(),
                model_id.to_string(),
                &self.config,
                self.client.clone(),
            )),
            ProviderKind::Google | ProviderKind::Vertex => Arc::new(google::GoogleModel::new(
                self.name.clone(),
                model_id.to_string(),
                &self.config,
                self.client.clone(),
            )),
            ProviderKind::Openai
            | ProviderKind::Azure
            | ProviderKind::Openrouter
            | ProviderKind::OpenaiCompatible => Arc::new(openai::OpenAiModel::new(
                self.name.clone(),
                model_id.to_string(),
                &self.config,
                self.client.clone(),
            )),
        }
    }
}

/// Every configured provider, resolvable by `provider/model` reference.
pub struct ProviderSet {
    providers: HashMap<String, Provider>,
}

impl ProviderSet {
    pub fn from_config(config: &config::Config) -> Result<Self> {
        let mut providers = HashMap::new();

        for (name, provider_config) in &config.providers {
            let provider = Provider::new(name.clone(), provider_config.clone(), &config.http)?;
            providers.insert(name.clone(), provider);
        }

        Ok(Self { providers })
    }

    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }

    /// Resolves a `provider/model` reference to a ready model.
    pub fn language_model(&self, reference: &str) -> Result<Arc<dyn LanguageModel>> {
        let Some((provider_name, model_id)) = reference.split_once('/') else {
            return Err(Error::UnknownModel(reference.to_string()));
        };

        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| Error::UnknownModel(reference.to_string()))?;

        Ok(provider.language_model(model_id))
    }
}
