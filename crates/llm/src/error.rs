use serde::Deserialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Client errors, surfaced verbatim to the orchestration layer.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider answered with a non-2xx status.
    #[error("{provider} API error ({status}): {message}")]
    Api {
        /// Configured provider name.
        provider: String,
        /// HTTP status of the response.
        status: u16,
        /// Provider-supplied error type, when the body was decodable.
        title: Option<String>,
        /// Provider-supplied message, or the raw body.
        message: String,
    },

    /// The request never produced a response (DNS, TLS, reset, timeout).
    #[error("connection error to {provider}: {message}")]
    Connection { provider: String, message: String },

    /// A 2xx response whose body did not parse.
    #[error("failed to decode {provider} response: {message}")]
    Decode { provider: String, message: String },

    /// The message sequence violates the conversation invariants.
    #[error("invalid message sequence: {0}")]
    InvalidMessages(String),

    /// A `provider/model` reference that no configured provider serves.
    #[error("model reference '{0}' does not match any configured provider")]
    UnknownModel(String),

    /// The provider configuration cannot produce a working client.
    #[error("provider configuration error: {0}")]
    Configuration(String),

    /// The ambient context was cancelled mid-call.
    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    /// The provider this error originated from, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Api { provider, .. } | Self::Connection { provider, .. } | Self::Decode { provider, .. } => {
                Some(provider)
            }
            _ => None,
        }
    }

    /// HTTP status code, for API errors only. Network failures carry none.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn connection(provider: &str, error: reqwest::Error) -> Self {
        Self::Connection {
            provider: provider.to_string(),
            message: error.to_string(),
        }
    }

    pub(crate) fn decode(provider: &str, message: impl ToString) -> Self {
        Self::Decode {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    /// Builds an API error from a non-2xx body, decoding the common
    /// `{"error": {...}}` envelopes where possible and falling back to the
    /// raw body otherwise.
    pub(crate) fn from_error_body(provider: &str, status: u16, body: String) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            error: ErrorBody,
        }

        #[derive(Deserialize)]
        struct ErrorBody {
            message: Option<String>,
            #[serde(rename = "type")]
            kind: Option<String>,
            // Google puts the symbolic name in `status`.
            status: Option<String>,
        }

        match serde_json::from_str::<Envelope>(&body) {
            Ok(Envelope { error }) => Self::Api {
                provider: provider.to_string(),
                status,
                title: error.kind.or(error.status),
                message: error.message.unwrap_or(body),
            },
            Err(_) => Self::Api {
                provider: provider.to_string(),
                status,
                title: None,
                message: body,
            },
        }
    }
}
