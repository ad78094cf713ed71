use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Provider or network failure; aborts the current agent turn.
    #[error(transparent)]
    Provider(#[from] llm::Error),

    /// Tool subsystem failure during an agent turn.
    #[error(transparent)]
    Tool(#[from] tools::Error),

    #[error("agent '{0}' is not registered")]
    AgentNotFound(String),

    #[error("no model configured for tier {0:?}")]
    NoModelForTier(config::ModelTier),

    /// The agent emitted an `agent_output` block that did not parse.
    #[error("agent output block failed to parse: {0}")]
    AgentOutput(String),

    /// Score below the configured threshold at a trust level that does
    /// not tolerate it.
    #[error("quality gate failed for agent '{agent}': score {score:.2}")]
    QualityGate { agent: String, score: f32 },

    /// Policy failure (blocker issue during validation); aborts the task.
    #[error("validation failed: {0}")]
    Policy(String),

    #[error("snapshot io error at {path}: {source}")]
    SnapshotIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no snapshot recorded for task '{0}'")]
    NoSnapshot(String),

    #[error("snapshot '{0}' not found")]
    SnapshotNotFound(String),

    #[error("agent turn timed out after {0:?}")]
    Timeout(Duration),
}
