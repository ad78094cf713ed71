//! Multi-agent orchestration: registry, scoring, trust, snapshots,
//! bounded handoffs and the sequential task execution engine.
//!
//! A task names an ordered set of agents. The engine runs them one at a
//! time, threading a bounded handoff context from each agent to the
//! next, scoring every result, and letting the trust level decide how
//! aggressively to validate and when to snapshot or roll back file
//! state.

mod agent;
mod engine;
mod error;
mod handoff;
mod output;
mod result;
mod runner;
mod score;
mod snapshot;
mod task;
mod trust;

pub use agent::{Agent, AgentRegistry};
pub use config::{HandoffLevel, ModelTier, TrustLevel};
pub use engine::Orchestrator;
pub use error::{Error, Result};
pub use handoff::{Handoff, HandoffBuilder, token_budget};
pub use output::{parse_agent_output, render_agent_output};
pub use result::{
    AgentResult, Artifact, ArtifactAction, Decision, Issue, Metrics, Severity,
};
pub use runner::{AgentContext, AgentRunner, ModelAgentRunner};
pub use score::{AgentScore, QualityChecklist, ScoreStatus, ScoreWeights, quality, relevance};
pub use snapshot::{DiffStatus, FileDiff, Snapshot, SnapshotManager};
pub use task::{Task, TaskStatus};
pub use trust::{
    RollbackBehavior, SnapshotFrequency, TrustManager, TrustPolicy, TrustState,
    ValidationFrequency,
};
