//! Exposes the task manager as a registry tool, so agents can delegate
//! work to sub-agents through the normal tool-call path.

use std::sync::Arc;

use async_trait::async_trait;
use config::ModelTier;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::manager::{TaskManager, TaskStatus};
use crate::tool::{Tool, ToolContext, ToolDescriptor};

pub struct TaskTool {
    manager: Arc<TaskManager>,
}

impl TaskTool {
    pub fn new(manager: Arc<TaskManager>) -> Self {
        Self { manager }
    }
}

fn parse_tier(value: Option<&str>) -> ModelTier {
    match value {
        Some("small") => ModelTier::Small,
        Some("large") => ModelTier::Large,
        _ => ModelTier::Medium,
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "task".to_string(),
            description: "Delegate a task to a specialized sub-agent. The sub-agent has no memory \
                          of the current conversation, so the prompt must carry full context."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "description": {
                        "type": "string",
                        "description": "Short (3-5 word) description of the task"
                    },
                    "prompt": {
                        "type": "string",
                        "description": "The full task for the sub-agent to perform"
                    },
                    "subagent_type": {
                        "type": "string",
                        "description": "The type of specialized agent to run"
                    },
                    "model": {
                        "type": "string",
                        "enum": ["small", "medium", "large"],
                        "description": "Model tier to run the sub-agent on"
                    },
                    "background": {
                        "type": "boolean",
                        "description": "Run in the background and poll later via resume"
                    }
                },
                "required": ["description", "prompt", "subagent_type"]
            }),
            requires_approval: false,
        }
    }

    async fn execute(&self, _ctx: &ToolContext, input: Value) -> Result<String> {
        let description = input["description"].as_str().unwrap_or_default().to_string();
        let prompt = input["prompt"].as_str().unwrap_or_default().to_string();
        let subagent_type = input["subagent_type"].as_str().unwrap_or_default().to_string();
        let tier = parse_tier(input["model"].as_str());
        let background = input["background"].as_bool().unwrap_or(false);

        let id = self
            .manager
            .start(description, subagent_type, tier, prompt, background)
            .await;

        if background {
            return Ok(format!(
                "Started background task {id}. Query it later to collect the result."
            ));
        }

        let task = self.manager.query(&id, false, 0).await?;

        match task.status {
            TaskStatus::Completed => Ok(task.result.unwrap_or_default()),
            TaskStatus::Failed => Err(Error::Execution(
                task.error.unwrap_or_else(|| "sub-agent task failed".to_string()),
            )),
            // Inline tasks are terminal when start returns.
            TaskStatus::Pending | TaskStatus::Running => Ok(format!("Task {id} is still running.")),
        }
    }
}
