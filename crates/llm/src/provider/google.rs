pub(crate) mod input;
pub(crate) mod output;

use async_trait::async_trait;
use config::{ProviderConfig, ProviderKind};
use eventsource_stream::Eventsource;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};

use self::input::GoogleRequest;
use self::output::{GoogleResponse, GoogleStreamProcessor};
use crate::error::{Error, Result};
use crate::messages::{Message, Response, validate};
use crate::provider::sse::decode_events;
use crate::provider::{EventStream, LanguageModel};
use crate::request::CallOptions;

const DEFAULT_GOOGLE_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini authenticates with a `key` query parameter; Vertex addresses
/// publisher models under a project/location path and uses a bearer
/// token.
enum Endpoint {
    Gemini { base_url: String },
    Vertex {
        base_url: String,
        project: String,
        location: String,
    },
}

pub(crate) struct GoogleModel {
    client: reqwest::Client,
    provider_name: String,
    model: String,
    api_key: Option<SecretString>,
    endpoint: Endpoint,
}

impl GoogleModel {
    pub fn new(
        provider_name: String,
        model: String,
        config: &ProviderConfig,
        client: reqwest::Client,
    ) -> Self {
        let endpoint = match config.kind {
            ProviderKind::Vertex => {
                // Presence checked by Provider::new.
                let location = config.location.clone().unwrap_or_default();
                Endpoint::Vertex {
                    base_url: config
                        .base_url
                        .clone()
                        .unwrap_or_else(|| format!("https://{location}-aiplatform.googleapis.com/v1")),
                    project: config.project.clone().unwrap_or_default(),
                    location,
                }
            }
            _ => Endpoint::Gemini {
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_GOOGLE_API_URL.to_string()),
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

    fn url(&self, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };

        match &self.endpoint {
            Endpoint::Gemini { base_url } => {
                let mut url = format!("{base_url}/models/{}:{method}", self.model);
                if let Some(key) = &self.api_key {
                    url.push(if stream { '&' } else { '?' });
                    url.push_str("key=");
                    url.push_str(key.expose_secret());
                }
                url
            }
            Endpoint::Vertex {
                base_url,
                project,
                location,
            } => format!(
                "{base_url}/projects/{project}/locations/{location}/publishers/google/models/{}:{method}",
                self.model
            ),
        }
    }

    async fn send(&self, request: &GoogleRequest, stream: bool) -> Result<reqwest::Response> {
        let body = sonic_rs::to_vec(request)
            .map_err(|e| Error::decode(&self.provider_name, format!("failed to serialize request: {e}")))?;

        let mut builder = self
            .client
            .post(self.url(stream))
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let (Endpoint::Vertex { .. }, Some(key)) = (&self.endpoint, &self.api_key) {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()));
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
impl LanguageModel for GoogleModel {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<Response> {
        validate(messages)?;

        let request = GoogleRequest::new(messages, options);
        let response = self.send(&request, false).await?;

        let text = response
            .text()
            .await
            .map_err(|e| Error::connection(&self.provider_name, e))?;

        let decoded: GoogleResponse = sonic_rs::from_str(&text).map_err(|e| {
            log::error!("failed to parse {} generateContent response: {e}", self.provider_name);
            Error::decode(&self.provider_name, e)
        })?;

        Ok(decoded.into_response())
    }

    async fn stream(&self, messages: &[Message], options: &CallOptions) -> Result<EventStream> {
        validate(messages)?;

        let request = GoogleRequest::new(messages, options);
        let response = self.send(&request, true).await?;

        let events = Box::pin(response.bytes_stream().eventsource());
        let processor = GoogleStreamProcessor::new(self.provider_name.clone());

        Ok(decode_events(events, processor))
    }
}
