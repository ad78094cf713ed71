//! Tool invocation protocol and the sub-agent task manager.
//!
//! Tools self-describe with a name, a JSON-schema parameter object and an
//! approval flag; the registry validates input shape and required fields,
//! enforces the approval gate and dispatches with cancellation. Sub-agent
//! jobs run through [`TaskManager`], synchronously or in the background,
//! with blocking and non-blocking status queries.

mod error;
mod manager;
mod registry;
mod task_tool;
mod tool;

pub use error::{Error, Result};
pub use manager::{ResumeOutcome, SubagentRunner, TaskInfo, TaskManager, TaskStatus};
pub use registry::ToolRegistry;
pub use task_tool::TaskTool;
pub use tool::{ApprovalHandler, Tool, ToolContext, ToolDescriptor};
