//! Tool registry and invocation dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::tool::{Tool, ToolContext, ToolDescriptor};

/// Registered tools by name. Built once at startup and read-only after;
/// invocation takes `&self`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.descriptor().name;

        if self.tools.contains_key(&name) {
            return Err(Error::Registration(name));
        }

        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Descriptors of every registered tool, sorted by name for stable
    /// prompt rendering.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<_> = self.tools.values().map(|tool| tool.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Validates, gates and dispatches one invocation from raw JSON
    /// input. Cancellation of `ctx.cancellation` aborts the tool and
    /// discards partial output.
    pub async fn invoke(&self, name: &str, input: &str, ctx: &ToolContext) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let descriptor = tool.descriptor();

        let input: Value = serde_json::from_str(input)
            .map_err(|e| Error::Validation(format!("input is not valid JSON: {e}")))?;

        validate_input(&descriptor.parameters, &input)?;

        if descriptor.requires_approval {
            let approved = match &ctx.approvals {
                Some(handler) => handler.approve(name, &input).await,
                None => false,
            };

            if !approved {
                return Err(Error::ApprovalDenied(name.to_string()));
            }
        }

        tokio::select! {
            _ = ctx.cancellation.cancelled() => Err(Error::Cancelled),
            result = tool.execute(ctx, input) => result,
        }
    }
}

/// Schema-level presence check: the input must be a JSON object and
/// carry every field the schema lists as required. Full type checking is
/// the tool's own concern.
fn validate_input(schema: &Value, input: &Value) -> Result<()> {
    let Some(object) = input.as_object() else {
        return Err(Error::Validation("input must be a JSON object".to_string()));
    };

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for field in required {
        if let Some(name) = field.as_str()
            && !object.contains_key(name)
        {
            return Err(Error::Validation(format!("missing required field '{name}'")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::tool::ApprovalHandler;

    struct AddTool;

    #[async_trait]
    impl Tool for AddTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "add".to_string(),
                description: "Adds two numbers".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                    "required": ["a", "b"]
                }),
                requires_approval: false,
            }
        }

        async fn execute(&self, _ctx: &ToolContext, input: Value) -> Result<String> {
            let a = input["a"].as_f64().ok_or_else(|| Error::Validation("a must be a number".into()))?;
            let b = input["b"].as_f64().ok_or_else(|| Error::Validation("b must be a number".into()))?;
            Ok((a + b).to_string())
        }
    }

    struct DangerousTool;

    #[async_trait]
    impl Tool for DangerousTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "rm_rf".to_string(),
                description: "Deletes things".to_string(),
                parameters: json!({"type": "object", "properties": {}, "required": []}),
                requires_approval: true,
            }
        }

        async fn execute(&self, _ctx: &ToolContext, _input: Value) -> Result<String> {
            Ok("deleted".to_string())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "slow".to_string(),
                description: "Sleeps forever".to_string(),
                parameters: json!({"type": "object", "properties": {}, "required": []}),
                requires_approval: false,
            }
        }

        async fn execute(&self, _ctx: &ToolContext, _input: Value) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("done".to_string())
        }
    }

    struct Always(bool);

    #[async_trait]
    impl ApprovalHandler for Always {
        async fn approve(&self, _tool: &str, _input: &Value) -> bool {
            self.0
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(AddTool)).unwrap();
        registry.register(Arc::new(DangerousTool)).unwrap();
        registry.register(Arc::new(SlowTool)).unwrap();
        registry
    }

    #[tokio::test]
    async fn dispatches_valid_input() {
        let registry = registry();
        let output = registry
            .invoke("add", r#"{"a": 2, "b": 3}"#, &ToolContext::new())
            .await
            .unwrap();

        assert_eq!(output, "5");
    }

    #[tokio::test]
    async fn rejects_missing_required_field_before_dispatch() {
        let registry = registry();
        let error = registry
            .invoke("add", r#"{"a": 2}"#, &ToolContext::new())
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Validation(message) if message.contains("'b'")));
    }

    #[tokio::test]
    async fn rejects_non_object_input() {
        let registry = registry();
        let error = registry.invoke("add", "[1, 2]", &ToolContext::new()).await.unwrap_err();

        assert!(matches!(error, Error::Validation(_)));
    }

    #[tokio::test]
    async fn approval_gate_is_hard_without_a_handler() {
        let registry = registry();
        let error = registry.invoke("rm_rf", "{}", &ToolContext::new()).await.unwrap_err();

        assert!(matches!(error, Error::ApprovalDenied(_)));
    }

    #[tokio::test]
    async fn approval_gate_respects_the_host_decision() {
        let registry = registry();

        let denied = ToolContext::new().with_approvals(Arc::new(Always(false)));
        assert!(registry.invoke("rm_rf", "{}", &denied).await.is_err());

        let granted = ToolContext::new().with_approvals(Arc::new(Always(true)));
        assert_eq!(registry.invoke("rm_rf", "{}", &granted).await.unwrap(), "deleted");
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_invocations() {
        let registry = Arc::new(registry());
        let token = CancellationToken::new();
        let ctx = ToolContext::new().with_cancellation(token.clone());

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let task_registry = registry.clone();

        let handle = tokio::spawn(async move {
            let result = task_registry.invoke("slow", "{}", &ctx).await;
            flag.store(matches!(result, Err(Error::Cancelled)), Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let mut registry = registry();
        let error = registry.register(Arc::new(AddTool)).unwrap_err();

        assert!(matches!(error, Error::Registration(name) if name == "add"));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = registry();
        let error = registry.invoke("nope", "{}", &ToolContext::new()).await.unwrap_err();

        assert!(matches!(error, Error::NotFound(_)));
    }
}
