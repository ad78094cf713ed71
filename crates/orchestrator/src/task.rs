//! The orchestrated task record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::handoff::Handoff;
use crate::result::{Artifact, Issue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Failed and the pre-task snapshot was restored.
    RolledBack,
}

/// One multi-agent task: an ordered agent sequence plus everything the
/// run accumulated.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    /// Agent ids, in execution order.
    pub agents: Vec<String>,
    /// Index of the agent currently (or last) running.
    pub current_agent: usize,
    /// Files this task is expected to touch; the pre-task snapshot
    /// covers them.
    pub files: Vec<String>,
    /// Chronological handoff log.
    pub handoffs: Vec<Handoff>,
    /// Total quality score per agent id.
    pub scores: HashMap<String, f32>,
    pub artifacts: Vec<Artifact>,
    pub issues: Vec<Issue>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(description: impl Into<String>, agents: Vec<String>) -> Self {
        Self {
            id: format!("task_{}", uuid::Uuid::new_v4()),
            description: description.into(),
            status: TaskStatus::Pending,
            agents,
            current_agent: 0,
            files: Vec::new(),
            handoffs: Vec::new(),
            scores: HashMap::new(),
            artifacts: Vec::new(),
            issues: Vec::new(),
            started_at: None,
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Mean of the per-agent scores; zero before any agent ran.
    pub fn average_score(&self) -> f32 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.values().sum::<f32>() / self.scores.len() as f32
    }

    /// The most recent handoff, which the next agent receives.
    pub fn last_handoff(&self) -> Option<&Handoff> {
        self.handoffs.last()
    }
}
