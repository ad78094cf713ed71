//! The tool contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Static description of a callable tool: how the model sees it and
/// whether the host must approve each invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    /// Unique within a registry.
    pub name: String,
    pub description: String,
    /// JSON schema object: `{type: "object", properties: {...},
    /// required: [...]}`.
    pub parameters: Value,
    pub requires_approval: bool,
}

/// Host hook deciding whether an approval-gated invocation may run.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn approve(&self, tool: &str, input: &Value) -> bool;
}

/// Ambient state for one invocation. Cancelling the token aborts the
/// in-flight tool; partial output is discarded.
#[derive(Clone, Default)]
pub struct ToolContext {
    pub cancellation: CancellationToken,
    pub approvals: Option<Arc<dyn ApprovalHandler>>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_approvals(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approvals = Some(handler);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// A single callable tool. Input arrives already parsed and validated
/// against the descriptor's required fields; output is plain text.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<String>;
}
