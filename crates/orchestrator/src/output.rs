//! The agent output contract: a YAML block tagged `agent_output:`
//! parseable into [`AgentResult`]. Required keys are `task_completed`
//! and `summary`; everything else is optional and unknown keys are
//! ignored.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::result::{AgentResult, Artifact, Decision, Issue, Metrics};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    agent_output: RawOutput,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawOutput {
    task_completed: bool,
    summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    decisions: Vec<Decision>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    handoff: Option<RawHandoff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metrics: Option<Metrics>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawHandoff {
    #[serde(default)]
    next_agent: Option<String>,
    #[serde(default)]
    context_for_next: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    priority_items: Vec<String>,
}

/// Parses an agent's final text into its result record. The YAML block
/// may be fenced or bare; text around it is ignored.
pub fn parse_agent_output(text: &str) -> Result<AgentResult> {
    let block = extract_block(text)
        .ok_or_else(|| Error::AgentOutput("no agent_output block found".to_string()))?;

    let envelope: Envelope =
        serde_yaml::from_str(&block).map_err(|e| Error::AgentOutput(e.to_string()))?;

    let raw = envelope.agent_output;
    let (next_agent, handoff_context, priority_items) = match raw.handoff {
        Some(handoff) => {
            let next = handoff
                .next_agent
                .filter(|next| !next.is_empty() && next != "none");
            (next, handoff.context_for_next, handoff.priority_items)
        }
        None => (None, String::new(), Vec::new()),
    };

    Ok(AgentResult {
        task_completed: raw.task_completed,
        summary: raw.summary,
        artifacts: raw.artifacts,
        decisions: raw.decisions,
        issues: raw.issues,
        next_agent,
        handoff_context,
        priority_items,
        metrics: raw.metrics.unwrap_or_default(),
    })
}

/// Renders a result back into its canonical YAML block.
pub fn render_agent_output(result: &AgentResult) -> String {
    let handoff = (result.next_agent.is_some()
        || !result.handoff_context.is_empty()
        || !result.priority_items.is_empty())
    .then(|| RawHandoff {
        next_agent: result.next_agent.clone(),
        context_for_next: result.handoff_context.clone(),
        priority_items: result.priority_items.clone(),
    });

    let envelope = Envelope {
        agent_output: RawOutput {
            task_completed: result.task_completed,
            summary: result.summary.clone(),
            artifacts: result.artifacts.clone(),
            decisions: result.decisions.clone(),
            issues: result.issues.clone(),
            handoff,
            metrics: (result.metrics != Metrics::default()).then_some(result.metrics),
        },
    };

    serde_yaml::to_string(&envelope).unwrap_or_default()
}

/// Pulls the YAML block out of the agent's text: a fenced code block
/// containing `agent_output:` wins, otherwise everything from the first
/// line starting with `agent_output:`.
fn extract_block(text: &str) -> Option<String> {
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let Some(body_start) = after_fence.find('\n').map(|i| i + 1) else {
            break;
        };
        let body = &after_fence[body_start..];

        let Some(close) = body.find("```") else {
            break;
        };

        let candidate = &body[..close];
        if candidate.contains("agent_output:") {
            return Some(candidate.to_string());
        }

        rest = &body[close + 3..];
    }

    let start = text.lines().find(|line| line.trim_start().starts_with("agent_output:"))?;
    let offset = text.find(start)?;
    let block = &text[offset..];

    // A stray closing fence after a bare block is not YAML.
    let block = block.split("\n```").next().unwrap_or(block);
    Some(block.to_string())
}
