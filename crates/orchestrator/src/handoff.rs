//! Bounded context handoffs between agents.
//!
//! The builder renders a markdown block from the previous agent's
//! result and enforces the level's token budget. When the natural
//! rendering is over budget it truncates decisions first, then priority
//! items, then the context note, then issues, then artifacts; the
//! summary is never dropped, only shortened as a last resort.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use config::HandoffLevel;
use llm::token_counter::TokenCounter;
use serde::Serialize;

use crate::result::AgentResult;

/// Token budget per handoff level.
pub fn token_budget(level: HandoffLevel) -> usize {
    match level {
        HandoffLevel::Minimal => 400,
        HandoffLevel::Standard => 1000,
        HandoffLevel::Extended => 2500,
    }
}

/// A bounded context block passed from one agent to the next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Handoff {
    pub from_agent: String,
    pub to_agent: String,
    /// Rendered markdown, guaranteed within the level's token budget.
    pub context: String,
    pub priority_items: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub level: HandoffLevel,
}

pub struct HandoffBuilder {
    counter: Arc<dyn TokenCounter>,
}

impl HandoffBuilder {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    pub fn build(
        &self,
        from_agent: &str,
        to_agent: &str,
        result: &AgentResult,
        level: HandoffLevel,
    ) -> Handoff {
        let mut sections = Sections::from_result(result, level);
        let budget = token_budget(level);

        let context = loop {
            let rendered = sections.render(from_agent);

            if self.counter.count(&rendered) <= budget {
                break rendered;
            }

            if !sections.trim_one() {
                break shrink_to_budget(rendered, self.counter.as_ref(), budget);
            }
        };

        Handoff {
            from_agent: from_agent.to_string(),
            to_agent: to_agent.to_string(),
            context,
            priority_items: result.priority_items.clone(),
            created_at: Utc::now(),
            level,
        }
    }
}

struct Sections {
    summary: String,
    artifacts: Vec<String>,
    issues: Vec<String>,
    decisions: Vec<String>,
    context: Option<String>,
    priorities: Vec<String>,
}

impl Sections {
    fn from_result(result: &AgentResult, level: HandoffLevel) -> Self {
        let artifacts = result
            .artifacts
            .iter()
            .map(|artifact| {
                format!(
                    "- [{}] {} — {}",
                    match artifact.action {
                        crate::result::ArtifactAction::Created => "created",
                        crate::result::ArtifactAction::Modified => "modified",
                        crate::result::ArtifactAction::Deleted => "deleted",
                    },
                    artifact.path,
                    artifact.description
                )
            })
            .collect();

        let issues = result
            .issues
            .iter()
            .map(|issue| {
                let severity = match issue.severity {
                    crate::result::Severity::Blocker => "blocker",
                    crate::result::Severity::Critical => "critical",
                    crate::result::Severity::Major => "major",
                    crate::result::Severity::Minor => "minor",
                    crate::result::Severity::Suggestion => "suggestion",
                };
                let mut line = format!("- [{severity}] {}: {}", issue.location, issue.message);
                if let Some(fix) = &issue.fix {
                    let _ = write!(line, " (fix: {fix})");
                }
                line
            })
            .collect();

        let extended = level != HandoffLevel::Minimal;

        let decisions = if extended {
            result
                .decisions
                .iter()
                .map(|decision| format!("- {} — {}", decision.decision, decision.rationale))
                .collect()
        } else {
            Vec::new()
        };

        let context = (extended && !result.handoff_context.is_empty())
            .then(|| result.handoff_context.clone());

        let priorities = if extended {
            result
                .priority_items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}. {item}", i + 1))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            summary: result.summary.clone(),
            artifacts,
            issues,
            decisions,
            context,
            priorities,
        }
    }

    fn render(&self, from_agent: &str) -> String {
        let mut out = format!("## Handoff from {from_agent}\n\n### Summary\n{}\n", self.summary);

        if !self.artifacts.is_empty() {
            out.push_str("\n### Artifacts\n");
            for line in &self.artifacts {
                out.push_str(line);
                out.push('\n');
            }
        }

        if !self.issues.is_empty() {
            out.push_str("\n### Issues\n");
            for line in &self.issues {
                out.push_str(line);
                out.push('\n');
            }
        }

        if !self.decisions.is_empty() {
            out.push_str("\n### Decisions\n");
            for line in &self.decisions {
                out.push_str(line);
                out.push('\n');
            }
        }

        if let Some(context) = &self.context {
            out.push_str("\n### Context for next agent\n");
            out.push_str(context);
            out.push('\n');
        }

        if !self.priorities.is_empty() {
            out.push_str("\n### Priorities\n");
            for line in &self.priorities {
                out.push_str(line);
                out.push('\n');
            }
        }

        out
    }

    /// Removes one unit of content in truncation order. Returns false
    /// once only the summary remains.
    fn trim_one(&mut self) -> bool {
        if self.decisions.pop().is_some() {
            return true;
        }
        if self.priorities.pop().is_some() {
            return true;
        }
        if self.context.take().is_some() {
            return true;
        }
        if self.issues.pop().is_some() {
            return true;
        }
        self.artifacts.pop().is_some()
    }
}

/// Hard fallback: shorten the text until the counter accepts it. Only
/// reached when everything but the summary is already gone.
fn shrink_to_budget(mut text: String, counter: &dyn TokenCounter, budget: usize) -> String {
    while counter.count(&text) > budget && !text.is_empty() {
        let target = text.chars().count() * 9 / 10;
        text = text.chars().take(target).collect();
    }
    text
}

#[cfg(test)]
mod tests {
    use llm::token_counter::HeuristicCounter;

    use super::*;
    use crate::result::{Artifact, ArtifactAction, Decision, Issue, Severity};

    fn builder() -> HandoffBuilder {
        HandoffBuilder::new(Arc::new(HeuristicCounter::default()))
    }

    fn counter() -> HeuristicCounter {
        HeuristicCounter::default()
    }

    fn base_result() -> AgentResult {
        AgentResult {
            task_completed: true,
            summary: "Implemented the storage layer and wired it into the API.".to_string(),
            artifacts: vec![Artifact {
                path: "src/storage.rs".to_string(),
                action: ArtifactAction::Created,
                description: "new storage layer".to_string(),
            }],
            issues: vec![Issue {
                severity: Severity::Minor,
                location: "src/storage.rs:120".to_string(),
                message: "flush batching is naive".to_string(),
                fix: Some("coalesce flushes".to_string()),
            }],
            handoff_context: "Review the fsync ordering closely.".to_string(),
            priority_items: vec![
                "Check crash consistency".to_string(),
                "Benchmark flush path".to_string(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn minimal_level_includes_only_summary_artifacts_and_issues() {
        let mut result = base_result();
        result.decisions = vec![Decision {
            decision: "LSM over B-tree".to_string(),
            rationale: "write-heavy workload".to_string(),
            alternatives: Vec::new(),
        }];

        let handoff = builder().build("implementer", "reviewer", &result, HandoffLevel::Minimal);

        assert!(handoff.context.contains("### Summary"));
        assert!(handoff.context.contains("### Artifacts"));
        assert!(handoff.context.contains("### Issues"));
        assert!(!handoff.context.contains("### Decisions"));
        assert!(!handoff.context.contains("### Priorities"));
    }

    #[test]
    fn context_always_fits_the_level_budget() {
        for level in [HandoffLevel::Minimal, HandoffLevel::Standard, HandoffLevel::Extended] {
            let handoff = builder().build("a", "b", &base_result(), level);
            assert!(counter().count(&handoff.context) <= token_budget(level));
        }
    }

    #[test]
    fn oversized_decisions_truncate_before_priorities_and_keep_the_summary() {
        let mut result = base_result();
        // Ten decisions of roughly 400 tokens each — far over the
        // extended budget on their own.
        result.decisions = (0..10)
            .map(|i| Decision {
                decision: format!("decision {i}"),
                rationale: "x".repeat(1600),
                alternatives: Vec::new(),
            })
            .collect();

        let handoff = builder().build("architect", "implementer", &result, HandoffLevel::Extended);

        assert!(counter().count(&handoff.context) <= token_budget(HandoffLevel::Extended));
        assert!(handoff.context.contains("### Summary"));
        assert!(handoff.context.contains(&result.summary));
        assert!(handoff.context.contains("decision 0"));
        assert!(!handoff.context.contains("decision 9"));
        // Priorities survived because decisions were dropped first.
        assert!(handoff.context.contains("### Priorities"));
        assert!(handoff.context.contains("Check crash consistency"));
    }

    #[test]
    fn summary_is_shortened_but_never_dropped_at_the_extreme() {
        let result = AgentResult {
            task_completed: true,
            summary: "s".repeat(20_000),
            ..Default::default()
        };

        let handoff = builder().build("a", "b", &result, HandoffLevel::Minimal);

        assert!(counter().count(&handoff.context) <= token_budget(HandoffLevel::Minimal));
        assert!(handoff.context.contains("### Summary"));
        assert!(handoff.context.contains("ssss"));
    }

    #[test]
    fn priority_items_are_carried_structurally_too() {
        let handoff = builder().build("a", "b", &base_result(), HandoffLevel::Standard);
        assert_eq!(handoff.priority_items.len(), 2);
        assert_eq!(handoff.level, HandoffLevel::Standard);
    }
}
