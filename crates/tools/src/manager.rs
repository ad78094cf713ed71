//! Sub-agent task lifecycle: create, run (inline or background), query.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use config::ModelTier;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

const POLL_GRANULARITY: Duration = Duration::from_millis(100);

/// Task state machine: `pending → running → (completed | failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One sub-agent job. Once terminal, `result` and `error` never change.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: String,
    pub description: String,
    pub subagent_type: String,
    pub tier: ModelTier,
    pub prompt: String,
    pub background: bool,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Runs the actual sub-agent work for a task. Injected so the task
/// manager stays independent of how agents reach their models.
#[async_trait::async_trait]
pub trait SubagentRunner: Send + Sync {
    async fn run(&self, task: &TaskInfo) -> Result<String>;
}

/// Outcome of resuming a task by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    Completed(String),
    Failed(String),
    StillRunning,
}

/// Owns the task map. Reads take the read lock; state transitions grab
/// the write lock briefly. No lock is held while a sub-agent runs.
pub struct TaskManager {
    tasks: Arc<RwLock<HashMap<String, TaskInfo>>>,
    counter: AtomicU64,
    runner: Arc<dyn SubagentRunner>,
}

impl TaskManager {
    pub fn new(runner: Arc<dyn SubagentRunner>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            counter: AtomicU64::new(0),
            runner,
        }
    }

    /// Creates a task and runs it, inline unless `background`. Returns
    /// the task id; for inline tasks the task is terminal on return.
    pub async fn start(
        &self,
        description: impl Into<String>,
        subagent_type: impl Into<String>,
        tier: ModelTier,
        prompt: impl Into<String>,
        background: bool,
    ) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let id = format!("task_{}_{}", Utc::now().timestamp_millis(), sequence);

        let task = TaskInfo {
            id: id.clone(),
            description: description.into(),
            subagent_type: subagent_type.into(),
            tier,
            prompt: prompt.into(),
            background,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };

        self.tasks.write().await.insert(id.clone(), task);

        if background {
            let tasks = self.tasks.clone();
            let runner = self.runner.clone();
            let task_id = id.clone();

            tokio::spawn(async move {
                run_task(&tasks, &runner, &task_id).await;
            });
        } else {
            run_task(&self.tasks, &self.runner, &id).await;
        }

        id
    }

    /// Snapshot of a task. With `block`, polls at 100 ms granularity
    /// until the task is terminal or the deadline passes, then returns
    /// whatever state it last saw.
    pub async fn query(&self, id: &str, block: bool, timeout_ms: u64) -> Result<TaskInfo> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            let snapshot = {
                let tasks = self.tasks.read().await;
                tasks
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::TaskNotFound(id.to_string()))?
            };

            if !block || snapshot.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(snapshot);
            }

            tokio::time::sleep(POLL_GRANULARITY).await;
        }
    }

    /// Prior result for a terminal task; `StillRunning` otherwise.
    pub async fn resume(&self, id: &str) -> Result<ResumeOutcome> {
        let snapshot = self.query(id, false, 0).await?;

        Ok(match snapshot.status {
            TaskStatus::Completed => ResumeOutcome::Completed(snapshot.result.unwrap_or_default()),
            TaskStatus::Failed => ResumeOutcome::Failed(snapshot.error.unwrap_or_default()),
            TaskStatus::Pending | TaskStatus::Running => ResumeOutcome::StillRunning,
        })
    }

    /// Ids of every known task, newest first.
    pub async fn list(&self) -> Vec<TaskInfo> {
        let tasks = self.tasks.read().await;
        let mut list: Vec<_> = tasks.values().cloned().collect();
        list.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        list
    }
}

async fn run_task(
    tasks: &RwLock<HashMap<String, TaskInfo>>,
    runner: &Arc<dyn SubagentRunner>,
    id: &str,
) {
    let snapshot = {
        let mut tasks = tasks.write().await;
        let Some(task) = tasks.get_mut(id) else {
            return;
        };
        task.status = TaskStatus::Running;
        task.clone()
    };

    let outcome = runner.run(&snapshot).await;

    let mut tasks = tasks.write().await;
    let Some(task) = tasks.get_mut(id) else {
        return;
    };

    // Terminal tasks are immutable.
    if task.status.is_terminal() {
        return;
    }

    match outcome {
        Ok(result) => {
            task.status = TaskStatus::Completed;
            task.result = Some(result);
        }
        Err(error) => {
            task.status = TaskStatus::Failed;
            task.error = Some(error.to_string());
        }
    }
    task.completed_at = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    struct InstantRunner;

    #[async_trait]
    impl SubagentRunner for InstantRunner {
        async fn run(&self, task: &TaskInfo) -> Result<String> {
            Ok(format!("done: {}", task.description))
        }
    }

    struct GatedRunner {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl SubagentRunner for GatedRunner {
        async fn run(&self, _task: &TaskInfo) -> Result<String> {
            self.gate.notified().await;
            Ok("gated done".to_string())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl SubagentRunner for FailingRunner {
        async fn run(&self, _task: &TaskInfo) -> Result<String> {
            Err(Error::Execution("sub-agent blew up".to_string()))
        }
    }

    #[tokio::test]
    async fn inline_tasks_are_terminal_on_return() {
        let manager = TaskManager::new(Arc::new(InstantRunner));

        let id = manager
            .start("review diff", "reviewer", ModelTier::Small, "review this", false)
            .await;

        let task = manager.query(&id, false, 0).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("done: review diff"));
        assert!(task.completed_at.unwrap() >= task.started_at);
    }

    #[tokio::test]
    async fn background_tasks_report_running_then_completed() {
        let gate = Arc::new(Notify::new());
        let manager = TaskManager::new(Arc::new(GatedRunner { gate: gate.clone() }));

        let id = manager
            .start("long job", "worker", ModelTier::Medium, "work", true)
            .await;

        // Give the spawned task a beat to mark itself running.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let task = manager.query(&id, false, 0).await.unwrap();
        assert_eq!(task.status, TaskStatus::Running);

        gate.notify_one();

        let task = manager.query(&id, true, 5_000).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("gated done"));
    }

    #[tokio::test]
    async fn blocking_query_returns_last_state_at_deadline() {
        let gate = Arc::new(Notify::new());
        let manager = TaskManager::new(Arc::new(GatedRunner { gate }));

        let id = manager
            .start("stuck job", "worker", ModelTier::Medium, "work", true)
            .await;

        let task = manager.query(&id, true, 250).await.unwrap();
        assert!(!task.status.is_terminal());
    }

    #[tokio::test]
    async fn resume_returns_prior_result_or_still_running() {
        let gate = Arc::new(Notify::new());
        let manager = TaskManager::new(Arc::new(GatedRunner { gate: gate.clone() }));

        let id = manager
            .start("job", "worker", ModelTier::Large, "work", true)
            .await;

        assert_eq!(manager.resume(&id).await.unwrap(), ResumeOutcome::StillRunning);

        gate.notify_one();
        manager.query(&id, true, 5_000).await.unwrap();

        assert_eq!(
            manager.resume(&id).await.unwrap(),
            ResumeOutcome::Completed("gated done".to_string())
        );
    }

    #[tokio::test]
    async fn failures_capture_the_error() {
        let manager = TaskManager::new(Arc::new(FailingRunner));

        let id = manager
            .start("doomed", "worker", ModelTier::Small, "work", false)
            .await;

        let task = manager.query(&id, false, 0).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().contains("blew up"));

        assert_eq!(
            manager.resume(&id).await.unwrap(),
            ResumeOutcome::Failed("tool execution failed: sub-agent blew up".to_string())
        );
    }

    #[tokio::test]
    async fn task_ids_are_unique() {
        let manager = TaskManager::new(Arc::new(InstantRunner));

        let mut ids = std::collections::HashSet::new();
        for _ in 0..10 {
            ids.insert(
                manager
                    .start("t", "worker", ModelTier::Small, "p", false)
                    .await,
            );
        }

        assert_eq!(ids.len(), 10);
    }

    #[tokio::test]
    async fn unknown_task_query_fails() {
        let manager = TaskManager::new(Arc::new(InstantRunner));
        assert!(matches!(
            manager.query("task_0_0", false, 0).await,
            Err(Error::TaskNotFound(_))
        ));
    }
}
