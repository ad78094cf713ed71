//! Orchestrator policy configuration.

use serde::{Deserialize, Serialize};

/// Model size tier an agent runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheap and fast. Reviews, formatting, small lookups.
    Small,
    /// The default tier for most engineering work.
    Medium,
    /// The strongest configured model. Architecture and hard debugging.
    Large,
}

/// How much context a handoff between agents may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffLevel {
    /// Summary, artifacts and issues only.
    Minimal,
    /// Adds decisions, follow-up context and priority items.
    #[default]
    Standard,
    /// Same sections with larger budgets.
    Extended,
}

/// How much the runtime trusts agent output before validating or rolling
/// back. Ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Every run is snapshotted and rolled back on failure.
    Quarantine,
    /// The starting level. Validation after every agent.
    #[default]
    Supervised,
    /// Snapshots still taken, validation after the task.
    Validated,
    /// Occasional validation only.
    Trusted,
    /// No automatic validation or snapshots.
    Autonomous,
}

/// Model identifiers per tier, in `provider/model` form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TierModels {
    /// Model for [`ModelTier::Small`].
    pub small: Option<String>,
    /// Model for [`ModelTier::Medium`].
    pub medium: Option<String>,
    /// Model for [`ModelTier::Large`].
    pub large: Option<String>,
}

impl TierModels {
    /// The configured `provider/model` reference for a tier, if any.
    pub fn get(&self, tier: ModelTier) -> Option<&str> {
        match tier {
            ModelTier::Small => self.small.as_deref(),
            ModelTier::Medium => self.medium.as_deref(),
            ModelTier::Large => self.large.as_deref(),
        }
    }

    /// Iterate over every configured tier reference.
    pub fn iter(&self) -> impl Iterator<Item = (ModelTier, &str)> {
        [
            (ModelTier::Small, self.small.as_deref()),
            (ModelTier::Medium, self.medium.as_deref()),
            (ModelTier::Large, self.large.as_deref()),
        ]
        .into_iter()
        .filter_map(|(tier, model)| model.map(|m| (tier, m)))
    }
}

/// Orchestrator policy knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Minimum quality score for an agent result to pass without scrutiny.
    pub quality_threshold: f32,
    /// Minimum relevance score for an agent to be selected for a task.
    pub relevance_threshold: f32,
    /// Cap on agents executing at the same time.
    pub max_concurrent_agents: usize,
    /// Context budget level for inter-agent handoffs.
    pub handoff_level: HandoffLevel,
    /// Trust level the runtime starts at.
    pub initial_trust: TrustLevel,
    /// Wall-clock budget for a single agent turn, in seconds.
    pub agent_timeout_secs: u64,
    /// Cap on tool-execution rounds within one agent turn.
    pub max_tool_rounds: usize,
    /// Model identifiers per tier.
    pub models: TierModels,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.75,
            relevance_threshold: 0.5,
            max_concurrent_agents: 3,
            handoff_level: HandoffLevel::default(),
            initial_trust: TrustLevel::default(),
            agent_timeout_secs: 300,
            max_tool_rounds: 8,
            models: TierModels::default(),
        }
    }
}
