//! Cadre configuration structures mapping the cadre.toml configuration.

#![deny(missing_docs)]

mod loader;
mod orchestrator;
mod providers;
mod storage;

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

pub use orchestrator::{HandoffLevel, ModelTier, OrchestratorConfig, TierModels, TrustLevel};
pub use providers::{ProviderConfig, ProviderKind};
pub use storage::{CatalogConfig, HttpConfig, SnapshotConfig};

/// Main configuration structure for the cadre runtime.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Map of LLM provider configurations, keyed by provider name.
    pub providers: IndexMap<String, ProviderConfig>,
    /// Orchestrator policy knobs.
    pub orchestrator: OrchestratorConfig,
    /// Provider catalog sync settings.
    pub catalog: CatalogConfig,
    /// Snapshot storage settings.
    pub snapshots: SnapshotConfig,
    /// Outbound HTTP settings.
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates that every model tier reference points at a configured provider.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_model_references(self)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::assert_debug_snapshot;

    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        Config {
            providers: {},
            orchestrator: OrchestratorConfig {
                quality_threshold: 0.75,
                relevance_threshold: 0.5,
                max_concurrent_agents: 3,
                handoff_level: Standard,
                initial_trust: Supervised,
                agent_timeout_secs: 300,
                max_tool_rounds: 8,
                models: TierModels {
                    small: None,
                    medium: None,
                    large: None,
                },
            },
            catalog: CatalogConfig {
                url: "https://catalog.cadrerun.dev/v1/providers.json",
                provider_url: None,
                fetch_timeout_secs: 10,
                data_dir: None,
            },
            snapshots: SnapshotConfig {
                base_path: None,
            },
            http: HttpConfig {
                request_timeout_secs: 300,
            },
        }
        "#);
    }

    #[test]
    fn full_provider_table() {
        let config_str = indoc! {r#"
            [providers.anthropic]
            type = "anthropic"
            api_key = "sk-test"

            [providers.azure]
            type = "azure"
            api_key = "azure-key"
            base_url = "https://myaccount.openai.azure.com"
            api_version = "2024-06-01"

            [providers.vertex]
            type = "vertex"
            project = "my-project"
            location = "us-central1"

            [orchestrator.models]
            small = "anthropic/claude-3-5-haiku-latest"
            medium = "anthropic/claude-sonnet-4-20250514"
            large = "anthropic/claude-opus-4-20250514"
        "#};

        let config: Config = toml::from_str(config_str).unwrap();

        assert_eq!(config.providers.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn model_reference_to_unknown_provider_fails() {
        let config_str = indoc! {r#"
            [providers.openai]
            type = "openai"
            api_key = "sk-test"

            [orchestrator.models]
            large = "anthropic/claude-opus-4-20250514"
        "#};

        let config: Config = toml::from_str(config_str).unwrap();
        let error = config.validate().unwrap_err().to_string();

        assert!(error.contains("unknown provider 'anthropic'"));
    }
}
