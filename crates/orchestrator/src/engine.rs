//! The sequential task execution engine.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentRegistry};
use crate::error::{Error, Result};
use crate::handoff::HandoffBuilder;
use crate::runner::{AgentContext, AgentRunner};
use crate::score::{quality, relevance};
use crate::snapshot::SnapshotManager;
use crate::task::{Task, TaskStatus};
use crate::trust::TrustManager;

const SUCCESS_SCORE_FLOOR: f32 = 0.7;

/// Selects agents, runs them in order, threads handoffs, enforces the
/// trust policy and scores every result.
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    runner: Arc<dyn AgentRunner>,
    trust: TrustManager,
    snapshots: SnapshotManager,
    handoffs: HandoffBuilder,
    config: config::OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        runner: Arc<dyn AgentRunner>,
        trust: TrustManager,
        snapshots: SnapshotManager,
        handoffs: HandoffBuilder,
        config: config::OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            runner,
            trust,
            snapshots,
            handoffs,
            config,
        }
    }

    pub fn trust(&self) -> &TrustManager {
        &self.trust
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// Ranks all registered agents by relevance to the description and
    /// returns those above the configured threshold, best first.
    pub fn select_agents(&self, description: &str) -> Vec<(&Agent, f32)> {
        let mut ranked: Vec<_> = self
            .registry
            .all()
            .iter()
            .map(|agent| (agent, relevance(agent, description)))
            .filter(|(_, score)| *score >= self.config.relevance_threshold)
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Runs a task through its agent sequence. The task records every
    /// score, artifact, issue and handoff; the final status reflects
    /// the failure mode when something goes wrong.
    pub async fn execute_task(&self, task: &mut Task, cancellation: CancellationToken) -> Result<()> {
        task.status = TaskStatus::InProgress;
        task.started_at = Some(Utc::now());

        // Pre-task snapshot failures abort before any mutation.
        if self.trust.requires_snapshot() && !task.files.is_empty() {
            if let Err(error) = self.snapshots.create_snapshot(&task.id, &task.files, "pre-task") {
                task.status = TaskStatus::Failed;
                return Err(error);
            }
        }

        let agent_ids = task.agents.clone();

        for (position, agent_id) in agent_ids.iter().enumerate() {
            task.current_agent = position;

            let Some(agent) = self.registry.get(agent_id) else {
                return Err(self.fail(task, Error::AgentNotFound(agent_id.clone())));
            };

            let ctx = AgentContext {
                task_id: task.id.clone(),
                description: task.description.clone(),
                handoff: task.last_handoff().cloned(),
                trust_level: self.trust.level(),
                handoff_level: self.config.handoff_level,
                cancellation: cancellation.clone(),
            };

            let result = match self.runner.run(agent, &ctx).await {
                Ok(result) => result,
                Err(error) => {
                    return Err(self.fail_with_rollback(task, error));
                }
            };

            let score = quality(&result);
            let total = score.total();
            task.scores.insert(agent.id.clone(), total);
            task.artifacts.extend(result.artifacts.iter().cloned());
            task.issues.extend(result.issues.iter().cloned());

            log::debug!(
                "agent '{}' scored {total:.2} (grade {}) on task {}",
                agent.id,
                score.grade(),
                task.id
            );

            if total < self.config.quality_threshold && self.trust.validate_after_agent() {
                return Err(self.fail(
                    task,
                    Error::QualityGate {
                        agent: agent.id.clone(),
                        score: total,
                    },
                ));
            }

            if let Some(next) = &result.next_agent {
                let handoff = self
                    .handoffs
                    .build(&agent.id, next, &result, self.config.handoff_level);
                task.handoffs.push(handoff);
            }

            if self.trust.validate_after_agent() && result.has_blocker() {
                return Err(self.fail(
                    task,
                    Error::Policy(format!("agent '{}' reported a blocker issue", agent.id)),
                ));
            }
        }

        task.status = TaskStatus::Completed;

        if task.average_score() >= SUCCESS_SCORE_FLOOR {
            self.trust.record_success();
        } else {
            self.trust.record_failure();
        }

        Ok(())
    }

    /// Marks the task failed. Trust recording happens only once a task
    /// runs its full agent sequence; aborted tasks leave the trust
    /// counters untouched.
    fn fail(&self, task: &mut Task, error: Error) -> Error {
        task.status = TaskStatus::Failed;
        error
    }

    /// Agent-turn failure path: quarantine additionally restores the
    /// pre-task snapshot. A rollback error is surfaced in the log but
    /// the task keeps its terminal status.
    fn fail_with_rollback(&self, task: &mut Task, error: Error) -> Error {
        task.status = TaskStatus::Failed;

        if self.trust.auto_rollback() {
            match self.snapshots.rollback(&task.id) {
                Ok(snapshot_id) => {
                    log::info!("task {} rolled back to snapshot {snapshot_id}", task.id);
                    task.status = TaskStatus::RolledBack;
                }
                Err(rollback_error) => {
                    log::error!("rollback of task {} failed: {rollback_error}", task.id);
                }
            }
        }

        error
    }
}
