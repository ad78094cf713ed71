//! Runs a single agent turn against its model.
//!
//! The model-backed runner builds the per-agent prompt, advertises the
//! registered tools, executes tool calls in a bounded loop and parses
//! the final `agent_output` block into an [`AgentResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use config::{HandoffLevel, TierModels, TrustLevel};
use llm::{CallOptions, Message, ProviderSet, Role, ToolDefinition, ToolOutput, ToolResult, Usage};
use tokio_util::sync::CancellationToken;
use tools::{ToolContext, ToolRegistry};

use crate::agent::Agent;
use crate::error::{Error, Result};
use crate::handoff::Handoff;
use crate::output::parse_agent_output;
use crate::result::{AgentResult, Metrics};

/// Everything one agent turn needs to know about its surroundings.
#[derive(Clone)]
pub struct AgentContext {
    pub task_id: String,
    pub description: String,
    pub handoff: Option<Handoff>,
    pub trust_level: TrustLevel,
    pub handoff_level: HandoffLevel,
    pub cancellation: CancellationToken,
}

/// Runs one agent and returns its result record.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, agent: &Agent, ctx: &AgentContext) -> Result<AgentResult>;
}

const OUTPUT_CONTRACT: &str = r#"When you are done, end your reply with a YAML block:

```yaml
agent_output:
  task_completed: true | false
  summary: "What you did, in one or two sentences."
  artifacts:
    - path: path/to/file
      action: created | modified | deleted
      description: why it changed
  decisions:
    - decision: what you chose
      rationale: why
      alternatives: [what you rejected]
  issues:
    - severity: blocker | critical | major | minor | suggestion
      location: file:line
      message: what is wrong
      fix: how to fix it
  handoff:
    next_agent: agent id, or none
    context_for_next: "What the next agent needs to know."
    priority_items:
      - ordered work items
```

`task_completed` and `summary` are required. Use `next_agent: none` when
no further agent is needed."#;

/// Production [`AgentRunner`]: resolves the agent's tier to a model,
/// loops over tool calls, parses the output contract.
pub struct ModelAgentRunner {
    providers: Arc<ProviderSet>,
    models: TierModels,
    registry: Arc<ToolRegistry>,
    max_tool_rounds: usize,
    timeout: Duration,
}

impl ModelAgentRunner {
    pub fn new(
        providers: Arc<ProviderSet>,
        models: TierModels,
        registry: Arc<ToolRegistry>,
        config: &config::OrchestratorConfig,
    ) -> Self {
        Self {
            providers,
            models,
            registry,
            max_tool_rounds: config.max_tool_rounds,
            timeout: Duration::from_secs(config.agent_timeout_secs),
        }
    }

    fn system_prompt(&self, agent: &Agent) -> String {
        format!(
            "You are {name}, a specialized {squad} agent (id: {id}).\n\
             Expertise: {expertise}.\n\
             You collaborate with: {collaborators}.\n\n{contract}",
            name = agent.name,
            squad = agent.squad,
            id = agent.id,
            expertise = agent.expertise.join(", "),
            collaborators = if agent.collaborators.is_empty() {
                "no one".to_string()
            } else {
                agent.collaborators.join(", ")
            },
            contract = OUTPUT_CONTRACT,
        )
    }

    fn user_prompt(&self, ctx: &AgentContext) -> String {
        match &ctx.handoff {
            Some(handoff) => format!(
                "# Task\n{}\n\n{}\n",
                ctx.description, handoff.context
            ),
            None => format!("# Task\n{}\n", ctx.description),
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .descriptors()
            .into_iter()
            .map(|descriptor| ToolDefinition {
                name: descriptor.name,
                description: descriptor.description,
                parameters: descriptor.parameters,
            })
            .collect()
    }
}

#[async_trait]
impl AgentRunner for ModelAgentRunner {
    async fn run(&self, agent: &Agent, ctx: &AgentContext) -> Result<AgentResult> {
        let reference = self
            .models
            .get(agent.tier)
            .ok_or(Error::NoModelForTier(agent.tier))?;
        let model = self.providers.language_model(reference)?;

        let started = Instant::now();
        let mut usage = Usage::default();

        let mut messages = vec![
            Message::system(self.system_prompt(agent)),
            Message::user(self.user_prompt(ctx)),
        ];

        let options = CallOptions {
            tools: self.tool_definitions(),
            ..Default::default()
        };

        let tool_ctx = ToolContext::new().with_cancellation(ctx.cancellation.clone());

        for _round in 0..=self.max_tool_rounds {
            let response = tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(Error::Provider(llm::Error::Cancelled)),
                outcome = tokio::time::timeout(self.timeout, model.generate(&messages, &options)) => {
                    outcome.map_err(|_| Error::Timeout(self.timeout))??
                }
            };

            usage.merge_max(response.usage);

            let calls: Vec<_> = response.tool_calls().cloned().collect();
            if calls.is_empty() {
                let mut result = finish_turn(&response.text())?;
                result.metrics = Metrics {
                    tokens: usage.total,
                    duration_ms: started.elapsed().as_millis() as u64,
                    files_touched: result.artifacts.len() as u64,
                };
                return Ok(result);
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let output = match self.registry.invoke(&call.name, &call.input, &tool_ctx).await {
                    Ok(text) => ToolOutput::text(text),
                    Err(tools::Error::Cancelled) => return Err(Error::Tool(tools::Error::Cancelled)),
                    Err(error) => {
                        log::warn!("tool '{}' failed during agent '{}': {error}", call.name, agent.id);
                        ToolOutput::error(error.to_string())
                    }
                };

                results.push(ToolResult {
                    call_id: call.id.clone(),
                    output,
                });
            }

            messages.push(Message {
                role: Role::Assistant,
                parts: response.parts,
            });
            messages.push(Message::tool_results(results));
        }

        Err(Error::AgentOutput(format!(
            "agent '{}' exceeded {} tool rounds without concluding",
            agent.id, self.max_tool_rounds
        )))
    }
}

/// Parses the terminal text of a turn. A missing block degrades to an
/// incomplete result rather than an error; a present-but-broken block
/// is a real failure.
fn finish_turn(text: &str) -> Result<AgentResult> {
    if text.contains("agent_output:") {
        return parse_agent_output(text);
    }

    log::warn!("agent reply carried no agent_output block, treating as incomplete");

    Ok(AgentResult {
        task_completed: false,
        summary: text.chars().take(400).collect(),
        ..Default::default()
    })
}
