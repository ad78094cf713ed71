//! Catalog, snapshot and HTTP client settings.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_CATALOG_URL: &str = "https://catalog.cadrerun.dev/v1/providers.json";

/// Provider catalog sync settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Upstream URL for the full provider catalog.
    pub url: String,
    /// Upstream URL for the curated single-provider record. When unset,
    /// only the full catalog is synced.
    pub provider_url: Option<String>,
    /// Deadline for a catalog fetch, in seconds.
    pub fetch_timeout_secs: u64,
    /// Override for the cache directory. Defaults to the XDG data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CATALOG_URL.to_string(),
            provider_url: None,
            fetch_timeout_secs: 10,
            data_dir: None,
        }
    }
}

impl CatalogConfig {
    /// Directory holding the cached catalog files.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("cadre")
        })
    }
}

/// Snapshot storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Base directory for persisted snapshots. Defaults to the XDG data
    /// dir under `cadre/snapshots`.
    pub base_path: Option<PathBuf>,
}

impl SnapshotConfig {
    /// Resolved snapshot base directory.
    pub fn base_path(&self) -> PathBuf {
        self.base_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("cadre")
                .join("snapshots")
        })
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout for provider calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 300,
        }
    }
}
