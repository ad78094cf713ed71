//! LLM provider configuration structures.

use secrecy::SecretString;
use serde::Deserialize;

/// The wire dialect a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI chat completions.
    Openai,
    /// Azure OpenAI deployments.
    Azure,
    /// Google Gemini (generative language API).
    Google,
    /// Google Vertex AI publisher models.
    Vertex,
    /// OpenRouter (OpenAI-compatible, hosted).
    Openrouter,
    /// Any other OpenAI-compatible endpoint (LM Studio, vLLM, ...).
    OpenaiCompatible,
}

/// Configuration for a single LLM provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// The wire dialect this provider speaks.
    #[serde(rename = "type")]
    pub kind: ProviderKind,

    /// API key for authentication. Vertex uses ambient credentials and may
    /// omit it.
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Custom base URL. Required for `azure` and `openai-compatible`,
    /// optional elsewhere.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Azure `api-version` query parameter.
    #[serde(default)]
    pub api_version: Option<String>,

    /// Google Cloud project (vertex only).
    #[serde(default)]
    pub project: Option<String>,

    /// Google Cloud location (vertex only).
    #[serde(default)]
    pub location: Option<String>,
}
