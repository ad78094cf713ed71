//! Relevance and quality scoring.

use std::collections::HashSet;

use serde::Serialize;

use crate::agent::Agent;
use crate::result::{AgentResult, Severity};

/// Weight vector over the four quality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    pub completeness: f32,
    pub precision: f32,
    pub coherence: f32,
    pub context_retention: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            completeness: 0.30,
            precision: 0.30,
            coherence: 0.25,
            context_retention: 0.15,
        }
    }
}

/// Gate decision derived from the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    AutoApproved,
    Warning,
    Blocked,
}

/// Four normalised dimensions in `[0, 1]` plus the weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentScore {
    pub completeness: f32,
    pub precision: f32,
    pub coherence: f32,
    pub context_retention: f32,
    pub weights: ScoreWeights,
}

impl AgentScore {
    /// Weighted total in `[0, 1]`.
    pub fn total(&self) -> f32 {
        let total = self.completeness * self.weights.completeness
            + self.precision * self.weights.precision
            + self.coherence * self.weights.coherence
            + self.context_retention * self.weights.context_retention;
        total.clamp(0.0, 1.0)
    }

    pub fn grade(&self) -> char {
        match self.total() {
            total if total >= 0.90 => 'A',
            total if total >= 0.80 => 'B',
            total if total >= 0.70 => 'C',
            total if total >= 0.60 => 'D',
            _ => 'F',
        }
    }

    pub fn status(&self) -> ScoreStatus {
        match self.total() {
            total if total >= 0.75 => ScoreStatus::AutoApproved,
            total if total >= 0.60 => ScoreStatus::Warning,
            _ => ScoreStatus::Blocked,
        }
    }
}

/// Fraction of the agent's expertise and keyword union that appears in
/// the task description, case-insensitively. Zero when the union is
/// empty.
pub fn relevance(agent: &Agent, description: &str) -> f32 {
    let description = description.to_lowercase();

    let terms: HashSet<String> = agent
        .expertise
        .iter()
        .chain(agent.keywords.iter())
        .map(|term| term.to_lowercase())
        .collect();

    if terms.is_empty() {
        return 0.0;
    }

    let matched = terms
        .iter()
        .filter(|term| description.contains(term.as_str()))
        .count();

    matched as f32 / terms.len() as f32
}

/// Scores one agent result along the four dimensions.
pub fn quality(result: &AgentResult) -> AgentScore {
    let completeness = if result.task_completed {
        1.0
    } else if !result.artifacts.is_empty() {
        0.5
    } else {
        0.0
    };

    let mut precision: f32 = 1.0;
    for issue in &result.issues {
        precision -= match issue.severity {
            Severity::Blocker => 0.4,
            Severity::Critical => 0.25,
            Severity::Major => 0.10,
            Severity::Minor => 0.05,
            Severity::Suggestion => 0.0,
        };
    }
    let precision = precision.max(0.0);

    let mut coherence: f32 = 0.8;
    if !result.decisions.is_empty() {
        coherence += 0.1;
    }
    if !result.handoff_context.is_empty() {
        coherence += 0.1;
    }
    let coherence = coherence.min(1.0);

    let context_retention = match result.summary.chars().count() {
        length if length > 50 => 0.9,
        length if length > 20 => 0.7,
        _ => 0.5,
    };

    AgentScore {
        completeness,
        precision,
        coherence,
        context_retention,
        weights: ScoreWeights::default(),
    }
}

/// The ten orthogonal boolean predicates over an agent result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityChecklist {
    pub task_completed: bool,
    pub has_summary: bool,
    pub no_blocker: bool,
    pub artifacts_documented: bool,
    pub decisions_rationalized: bool,
    pub handoff_specified: bool,
    pub issues_have_fixes: bool,
    pub code_blocks_have_files: bool,
    pub metrics_provided: bool,
    pub priorities_or_chain_end: bool,
}

impl QualityChecklist {
    pub fn evaluate(result: &AgentResult) -> Self {
        Self {
            task_completed: result.task_completed,
            has_summary: !result.summary.trim().is_empty(),
            no_blocker: !result.has_blocker(),
            artifacts_documented: result
                .artifacts
                .iter()
                .all(|artifact| !artifact.description.trim().is_empty()),
            decisions_rationalized: result
                .decisions
                .iter()
                .all(|decision| !decision.rationale.trim().is_empty()),
            handoff_specified: result.next_agent.is_some() || !result.handoff_context.is_empty(),
            issues_have_fixes: result
                .issues
                .iter()
                .all(|issue| issue.fix.as_deref().is_some_and(|fix| !fix.trim().is_empty())),
            code_blocks_have_files: code_blocks_have_files(&result.summary),
            metrics_provided: result.metrics.tokens > 0 || result.metrics.duration_ms > 0,
            priorities_or_chain_end: !result.priority_items.is_empty() || result.next_agent.is_none(),
        }
    }

    /// Number of predicates that hold, out of ten.
    pub fn passed(&self) -> usize {
        [
            self.task_completed,
            self.has_summary,
            self.no_blocker,
            self.artifacts_documented,
            self.decisions_rationalized,
            self.handoff_specified,
            self.issues_have_fixes,
            self.code_blocks_have_files,
            self.metrics_provided,
            self.priorities_or_chain_end,
        ]
        .into_iter()
        .filter(|&passed| passed)
        .count()
    }
}

/// Every fenced code block opener must carry an info string (language
/// or file path); anonymous blocks lose context across handoffs.
fn code_blocks_have_files(text: &str) -> bool {
    text.lines()
        .filter(|line| line.trim_start().starts_with("```"))
        .step_by(2)
        .all(|opener| opener.trim_start().len() > 3)
}
