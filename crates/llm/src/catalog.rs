//! One-shot provider catalog sync with ETag caching.
//!
//! Two views share one fetch-with-cache implementation: the full provider
//! list and an optional curated single-provider record. Both are memoised
//! per [`CatalogSync`] instance, so a process constructs one and threads
//! it through; concurrent first callers trigger exactly one upstream
//! request. There are no globals.
//!
//! Refresh discipline: a 304 keeps the cache, a 200 with content
//! overwrites it atomically, a 200 with an empty list is reported and
//! ignored, and any transport failure falls back to the cached payload
//! silently. A missing or corrupt cache falls back to the embedded
//! default list.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

const PROVIDERS_CACHE_FILE: &str = "providers.json";
const PROVIDER_CACHE_FILE: &str = "provider.json";

static EMBEDDED_CATALOG: &str = include_str!("catalog/default_providers.json");

/// One model advertised by a catalog provider. Unknown fields are
/// ignored so upstream additions never break the sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogModel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub context_window: Option<u64>,
    #[serde(default)]
    pub default_max_tokens: Option<u64>,
}

/// One provider record from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProvider {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub models: Vec<CatalogModel>,
}

/// A memoised catalog result. `warning` carries non-fatal upstream
/// conditions (e.g. an empty list) alongside the served payload.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub warning: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord<T> {
    #[serde(default)]
    etag: Option<String>,
    fetched_at: DateTime<Utc>,
    payload: T,
}

enum FetchOutcome {
    NotModified,
    Fresh { body: String, etag: Option<String> },
    Failed(String),
}

/// The catalog syncer. Construct once per runtime and share.
pub struct CatalogSync {
    client: reqwest::Client,
    url: String,
    provider_url: Option<String>,
    cache_dir: PathBuf,
    fetch_timeout: Duration,
    providers: OnceCell<Fetched<Arc<Vec<CatalogProvider>>>>,
    provider: OnceCell<Fetched<Option<Arc<CatalogProvider>>>>,
}

impl CatalogSync {
    pub fn new(config: &config::CatalogConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            provider_url: config.provider_url.clone(),
            cache_dir: config.cache_dir(),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            providers: OnceCell::new(),
            provider: OnceCell::new(),
        }
    }

    /// The full provider list. Never fails: the worst case is the
    /// embedded default catalog.
    pub async fn providers(&self) -> Fetched<Arc<Vec<CatalogProvider>>> {
        self.providers
            .get_or_init(|| async {
                self.sync_file(&self.url, PROVIDERS_CACHE_FILE, embedded_catalog, |list: &Vec<CatalogProvider>| {
                    list.is_empty()
                        .then(|| "empty providers list from upstream".to_string())
                })
                .await
            })
            .await
            .clone()
    }

    /// The curated single-provider record, when a provider URL is
    /// configured.
    pub async fn default_provider(&self) -> Fetched<Option<Arc<CatalogProvider>>> {
        self.provider
            .get_or_init(|| async {
                let Some(url) = &self.provider_url else {
                    return Fetched {
                        value: None,
                        warning: None,
                    };
                };

                let fetched = self
                    .sync_file(url, PROVIDER_CACHE_FILE, || None, |record: &Option<CatalogProvider>| {
                        record
                            .is_none()
                            .then(|| "empty provider record from upstream".to_string())
                    })
                    .await;

                Fetched {
                    value: fetched.value.as_ref().clone().map(Arc::new),
                    warning: fetched.warning,
                }
            })
            .await
            .clone()
    }

    async fn sync_file<T>(
        &self,
        url: &str,
        file: &str,
        fallback: impl Fn() -> T,
        check_empty: impl Fn(&T) -> Option<String>,
    ) -> Fetched<Arc<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let path = self.cache_dir.join(file);
        let cached = read_cache::<T>(&path);
        let etag = cached.as_ref().and_then(|record| record.etag.clone());

        let serve_cached = |cached: Option<CacheRecord<T>>, warning: Option<String>| Fetched {
            value: Arc::new(cached.map(|record| record.payload).unwrap_or_else(&fallback)),
            warning,
        };

        match self.fetch(url, etag.as_deref()).await {
            FetchOutcome::NotModified => serve_cached(cached, None),
            FetchOutcome::Failed(reason) => {
                log::debug!("catalog fetch from {url} failed, serving cached copy: {reason}");
                serve_cached(cached, None)
            }
            FetchOutcome::Fresh { body, etag } => match serde_json::from_str::<T>(&body) {
                Err(error) => {
                    log::warn!("catalog payload from {url} did not parse: {error}");
                    serve_cached(cached, None)
                }
                Ok(payload) => {
                    if let Some(warning) = check_empty(&payload) {
                        log::warn!("{warning}");
                        return serve_cached(cached, Some(warning));
                    }

                    let record = CacheRecord {
                        etag,
                        fetched_at: Utc::now(),
                        payload,
                    };

                    if let Err(error) = write_cache(&path, &record) {
                        log::warn!("failed to write catalog cache {}: {error}", path.display());
                    }

                    Fetched {
                        value: Arc::new(record.payload),
                        warning: None,
                    }
                }
            },
        }
    }

    async fn fetch(&self, url: &str, etag: Option<&str>) -> FetchOutcome {
        let mut request = self.client.get(url).timeout(self.fetch_timeout);

        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => return FetchOutcome::Failed(error.to_string()),
        };

        let status = response.status();

        if status == reqwest::StatusCode::NOT_MODIFIED {
            return FetchOutcome::NotModified;
        }

        if !status.is_success() {
            return FetchOutcome::Failed(format!("upstream returned {status}"));
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match response.text().await {
            Ok(body) => FetchOutcome::Fresh { body, etag },
            Err(error) => FetchOutcome::Failed(error.to_string()),
        }
    }
}

fn embedded_catalog() -> Vec<CatalogProvider> {
    serde_json::from_str(EMBEDDED_CATALOG).unwrap_or_else(|error| {
        log::error!("embedded catalog is invalid: {error}");
        Vec::new()
    })
}

fn read_cache<T: DeserializeOwned>(path: &Path) -> Option<CacheRecord<T>> {
    let content = std::fs::read_to_string(path).ok()?;

    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(error) => {
            log::warn!("catalog cache {} is corrupt, ignoring: {error}", path.display());
            None
        }
    }
}

/// Writes through a sibling temp file and renames, so a crash mid-write
/// never leaves a truncated cache.
fn write_cache<T: Serialize>(path: &Path, record: &CacheRecord<T>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let body = serde_json::to_vec_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Clone)]
    struct UpstreamState {
        hits: Arc<AtomicUsize>,
        body: String,
        etag: Option<String>,
    }

    async fn serve_catalog(State(state): State<UpstreamState>, headers: HeaderMap) -> impl IntoResponse {
        state.hits.fetch_add(1, Ordering::SeqCst);

        if let Some(etag) = &state.etag
            && headers
                .get("if-none-match")
                .and_then(|value| value.to_str().ok())
                == Some(etag.as_str())
        {
            return (StatusCode::NOT_MODIFIED, HeaderMap::new(), String::new());
        }

        let mut response_headers = HeaderMap::new();
        if let Some(etag) = &state.etag {
            response_headers.insert("etag", etag.parse().unwrap());
        }

        (StatusCode::OK, response_headers, state.body.clone())
    }

    async fn spawn_upstream(state: UpstreamState) -> String {
        let router = Router::new()
            .route("/providers.json", get(serve_catalog))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{address}/providers.json")
    }

    fn catalog_config(url: &str, dir: &Path) -> config::CatalogConfig {
        config::CatalogConfig {
            url: url.to_string(),
            data_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    fn sample_body() -> String {
        r#"[{"id":"openai","name":"OpenAI","models":[{"id":"gpt-4o"}]}]"#.to_string()
    }

    #[tokio::test]
    async fn get_is_memoised_to_a_single_upstream_call() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = spawn_upstream(UpstreamState {
            hits: hits.clone(),
            body: sample_body(),
            etag: None,
        })
        .await;

        let dir = tempfile::tempdir().unwrap();
        let sync = Arc::new(CatalogSync::new(&catalog_config(&url, dir.path())));

        let (a, b, c) = tokio::join!(sync.providers(), sync.providers(), sync.providers());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(a.value.len(), 1);
        assert_eq!(b.value[0].id, "openai");
        assert!(c.warning.is_none());
    }

    #[tokio::test]
    async fn fresh_fetch_overwrites_cache_atomically() {
        let url = spawn_upstream(UpstreamState {
            hits: Arc::new(AtomicUsize::new(0)),
            body: sample_body(),
            etag: Some("\"v1\"".to_string()),
        })
        .await;

        let dir = tempfile::tempdir().unwrap();
        let sync = CatalogSync::new(&catalog_config(&url, dir.path()));
        sync.providers().await;

        let cache_path = dir.path().join("providers.json");
        let record: CacheRecord<Vec<CatalogProvider>> =
            serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();

        assert_eq!(record.etag.as_deref(), Some("\"v1\""));
        assert_eq!(record.payload[0].id, "openai");
        assert!(!cache_path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn not_modified_serves_cached_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cached = CacheRecord {
            etag: Some("\"v1\"".to_string()),
            fetched_at: Utc::now(),
            payload: vec![CatalogProvider {
                id: "cached".to_string(),
                name: None,
                models: Vec::new(),
            }],
        };
        write_cache(&dir.path().join("providers.json"), &cached).unwrap();

        let url = spawn_upstream(UpstreamState {
            hits: Arc::new(AtomicUsize::new(0)),
            body: sample_body(),
            etag: Some("\"v1\"".to_string()),
        })
        .await;

        let sync = CatalogSync::new(&catalog_config(&url, dir.path()));
        let fetched = sync.providers().await;

        assert_eq!(fetched.value[0].id, "cached");
        assert!(fetched.warning.is_none());
    }

    #[tokio::test]
    async fn empty_upstream_list_reports_and_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cached = CacheRecord {
            etag: None,
            fetched_at: Utc::now(),
            payload: vec![CatalogProvider {
                id: "cached".to_string(),
                name: None,
                models: Vec::new(),
            }],
        };
        let cache_path = dir.path().join("providers.json");
        write_cache(&cache_path, &cached).unwrap();
        let before = std::fs::read_to_string(&cache_path).unwrap();

        let url = spawn_upstream(UpstreamState {
            hits: Arc::new(AtomicUsize::new(0)),
            body: "[]".to_string(),
            etag: None,
        })
        .await;

        let sync = CatalogSync::new(&catalog_config(&url, dir.path()));
        let fetched = sync.providers().await;

        assert_eq!(fetched.value[0].id, "cached");
        assert_eq!(
            fetched.warning.as_deref(),
            Some("empty providers list from upstream")
        );
        assert_eq!(std::fs::read_to_string(&cache_path).unwrap(), before);
    }

    #[tokio::test]
    async fn network_failure_serves_cache_silently_or_embedded_default() {
        let dir = tempfile::tempdir().unwrap();

        // Nothing cached: the embedded default list is served.
        let sync = CatalogSync::new(&catalog_config("http://127.0.0.1:1/providers.json", dir.path()));
        let fetched = sync.providers().await;

        assert!(fetched.warning.is_none());
        assert!(fetched.value.iter().any(|provider| provider.id == "anthropic"));
    }
}
