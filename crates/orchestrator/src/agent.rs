//! Agent descriptors and the registry.

use std::collections::HashMap;

use config::ModelTier;
use serde::{Deserialize, Serialize};

/// Immutable descriptor for one specialized agent. Created at registry
/// init and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable id other agents reference in handoffs.
    pub id: String,
    pub name: String,
    /// Squad tag grouping related roles.
    pub squad: String,
    pub tier: ModelTier,
    /// Domains this agent is an expert in.
    pub expertise: Vec<String>,
    /// Trigger keywords for relevance scoring.
    pub keywords: Vec<String>,
    /// Agents this one commonly hands off to.
    pub collaborators: Vec<String>,
}

/// All registered agents, looked up by id. Read-only after construction.
pub struct AgentRegistry {
    agents: Vec<Agent>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    /// Builds the registry. Later duplicates of an id are dropped with a
    /// warning; the first registration wins.
    pub fn new(agents: Vec<Agent>) -> Self {
        let mut kept = Vec::with_capacity(agents.len());
        let mut index = HashMap::new();

        for agent in agents {
            if index.contains_key(&agent.id) {
                log::warn!("duplicate agent id '{}' ignored", agent.id);
                continue;
            }
            index.insert(agent.id.clone(), kept.len());
            kept.push(agent);
        }

        Self { agents: kept, index }
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.index.get(id).map(|&i| &self.agents[i])
    }

    pub fn all(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The built-in engineering roster.
    pub fn default_roster() -> Self {
        fn strings(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        let agents = vec![
            Agent {
                id: "architect".to_string(),
                name: "Architect".to_string(),
                squad: "design".to_string(),
                tier: ModelTier::Large,
                expertise: strings(&["architecture", "design", "scalability"]),
                keywords: strings(&["design", "structure", "plan", "refactor"]),
                collaborators: strings(&["implementer", "reviewer"]),
            },
            Agent {
                id: "implementer".to_string(),
                name: "Implementer".to_string(),
                squad: "build".to_string(),
                tier: ModelTier::Medium,
                expertise: strings(&["implementation", "apis", "refactoring"]),
                keywords: strings(&["implement", "build", "add", "fix", "feature"]),
                collaborators: strings(&["reviewer", "tester"]),
            },
            Agent {
                id: "reviewer".to_string(),
                name: "Reviewer".to_string(),
                squad: "quality".to_string(),
                tier: ModelTier::Medium,
                expertise: strings(&["code review", "correctness", "security"]),
                keywords: strings(&["review", "audit", "check", "verify"]),
                collaborators: strings(&["implementer", "tester"]),
            },
            Agent {
                id: "tester".to_string(),
                name: "Tester".to_string(),
                squad: "quality".to_string(),
                tier: ModelTier::Small,
                expertise: strings(&["testing", "coverage", "regressions"]),
                keywords: strings(&["test", "tests", "coverage", "regression"]),
                collaborators: strings(&["implementer", "debugger"]),
            },
            Agent {
                id: "debugger".to_string(),
                name: "Debugger".to_string(),
                squad: "quality".to_string(),
                tier: ModelTier::Large,
                expertise: strings(&["debugging", "root cause analysis", "concurrency"]),
                keywords: strings(&["bug", "debug", "crash", "race", "leak"]),
                collaborators: strings(&["implementer", "tester"]),
            },
            Agent {
                id: "documenter".to_string(),
                name: "Documenter".to_string(),
                squad: "build".to_string(),
                tier: ModelTier::Small,
                expertise: strings(&["documentation", "api docs"]),
                keywords: strings(&["document", "docs", "readme", "comment"]),
                collaborators: strings(&["implementer"]),
            },
        ];

        Self::new(agents)
    }
}
