//! The outcome record of one agent turn.

use serde::{Deserialize, Serialize};

/// What an agent did to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactAction {
    Created,
    Modified,
    Deleted,
}

/// A file the agent touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub action: ArtifactAction,
    #[serde(default)]
    pub description: String,
}

/// A recorded design decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

/// Issue severity, ordered worst first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Blocker,
    Critical,
    Major,
    Minor,
    Suggestion,
}

/// A problem the agent found (or introduced and knows about).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    #[serde(default)]
    pub location: String,
    pub message: String,
    /// Suggested fix, when the agent has one.
    #[serde(default)]
    pub fix: Option<String>,
}

/// Cost accounting for one agent turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub tokens: u64,
    pub duration_ms: u64,
    pub files_touched: u64,
}

/// Everything one agent turn produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub task_completed: bool,
    pub summary: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// The agent this one wants to hand off to. `None` ends the chain.
    #[serde(default)]
    pub next_agent: Option<String>,
    /// Free-form context for the next agent.
    #[serde(default)]
    pub handoff_context: String,
    /// Ordered work items for the next agent.
    #[serde(default)]
    pub priority_items: Vec<String>,
    #[serde(default)]
    pub metrics: Metrics,
}

impl AgentResult {
    /// Worst severity among reported issues.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|issue| issue.severity).min_by_key(|severity| match severity {
            Severity::Blocker => 0,
            Severity::Critical => 1,
            Severity::Major => 2,
            Severity::Minor => 3,
            Severity::Suggestion => 4,
        })
    }

    pub fn has_blocker(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == Severity::Blocker)
    }
}
