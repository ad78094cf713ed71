use std::time::Duration;

use reqwest::Client;
use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};

/// Shared reqwest builder for provider clients. Keep-alive and a short
/// pool idle timeout so DNS changes are picked up between calls; the
/// request timeout covers the whole exchange including streaming reads.
pub(crate) fn default_http_client_builder(
    mut headers: HeaderMap,
    request_timeout: Duration,
) -> reqwest::ClientBuilder {
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    Client::builder()
        .timeout(request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
}
