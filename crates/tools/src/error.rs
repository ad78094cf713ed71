use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed tool input: not JSON, not an object, or a required
    /// field is missing.
    #[error("invalid tool input: {0}")]
    Validation(String),

    /// No tool registered under the requested name.
    #[error("tool '{0}' is not registered")]
    NotFound(String),

    /// A second tool claimed an already-registered name.
    #[error("tool '{0}' is already registered")]
    Registration(String),

    /// The tool requires approval and the host did not grant it.
    #[error("approval denied for tool '{0}'")]
    ApprovalDenied(String),

    /// The tool ran and failed.
    #[error("tool execution failed: {0}")]
    Execution(String),

    /// No task with the given id.
    #[error("task '{0}' not found")]
    TaskNotFound(String),

    /// The ambient context was cancelled; partial output is discarded.
    #[error("tool invocation cancelled")]
    Cancelled,
}
