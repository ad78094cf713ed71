//! The trust state machine.
//!
//! One runtime-level state, serialised behind a single lock. The level
//! decides how aggressively the engine validates agent output, when it
//! snapshots, and whether failures roll back automatically.

use std::sync::Mutex;

use config::TrustLevel;
use serde::Serialize;

const CONSECUTIVE_FAILURES_TO_DEMOTE: u32 = 3;

/// How often agent output is validated at a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFrequency {
    EveryAgent,
    EveryTask,
    Periodic,
    Never,
}

/// How often file state is snapshotted at a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFrequency {
    EveryTask,
    RiskyOnly,
    Never,
}

/// What happens to file state when a task fails at a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackBehavior {
    Automatic,
    Prompt,
    Manual,
}

/// Per-level policy tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrustPolicy {
    pub validate_frequency: ValidationFrequency,
    pub snapshot_frequency: SnapshotFrequency,
    pub rollback: RollbackBehavior,
    /// Successful tasks required before auto-promotion.
    pub tasks_to_promote: u32,
}

impl TrustPolicy {
    pub fn for_level(level: TrustLevel) -> Self {
        match level {
            TrustLevel::Quarantine => Self {
                validate_frequency: ValidationFrequency::EveryAgent,
                snapshot_frequency: SnapshotFrequency::EveryTask,
                rollback: RollbackBehavior::Automatic,
                tasks_to_promote: 3,
            },
            TrustLevel::Supervised => Self {
                validate_frequency: ValidationFrequency::EveryAgent,
                snapshot_frequency: SnapshotFrequency::EveryTask,
                rollback: RollbackBehavior::Prompt,
                tasks_to_promote: 5,
            },
            TrustLevel::Validated => Self {
                validate_frequency: ValidationFrequency::EveryTask,
                snapshot_frequency: SnapshotFrequency::EveryTask,
                rollback: RollbackBehavior::Prompt,
                tasks_to_promote: 10,
            },
            TrustLevel::Trusted => Self {
                validate_frequency: ValidationFrequency::EveryTask,
                snapshot_frequency: SnapshotFrequency::RiskyOnly,
                rollback: RollbackBehavior::Manual,
                tasks_to_promote: 20,
            },
            TrustLevel::Autonomous => Self {
                validate_frequency: ValidationFrequency::Never,
                snapshot_frequency: SnapshotFrequency::Never,
                rollback: RollbackBehavior::Manual,
                tasks_to_promote: 0,
            },
        }
    }
}

/// Mutable trust counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrustState {
    pub level: TrustLevel,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub consecutive_failures: u32,
    pub success_streak: u32,
    /// Successes left before auto-promotion.
    pub tasks_remaining: u32,
}

impl TrustState {
    fn new(level: TrustLevel) -> Self {
        Self {
            level,
            completed_tasks: 0,
            failed_tasks: 0,
            consecutive_failures: 0,
            success_streak: 0,
            tasks_remaining: TrustPolicy::for_level(level).tasks_to_promote,
        }
    }
}

fn promote_level(level: TrustLevel) -> TrustLevel {
    match level {
        TrustLevel::Quarantine => TrustLevel::Supervised,
        TrustLevel::Supervised => TrustLevel::Validated,
        TrustLevel::Validated => TrustLevel::Trusted,
        TrustLevel::Trusted | TrustLevel::Autonomous => TrustLevel::Autonomous,
    }
}

fn demote_level(level: TrustLevel) -> TrustLevel {
    match level {
        TrustLevel::Quarantine | TrustLevel::Supervised => TrustLevel::Quarantine,
        TrustLevel::Validated => TrustLevel::Supervised,
        TrustLevel::Trusted => TrustLevel::Validated,
        TrustLevel::Autonomous => TrustLevel::Trusted,
    }
}

/// All transitions run behind one lock; no lock is ever held across
/// I/O.
pub struct TrustManager {
    state: Mutex<TrustState>,
}

impl TrustManager {
    pub fn new(initial: TrustLevel) -> Self {
        Self {
            state: Mutex::new(TrustState::new(initial)),
        }
    }

    pub fn level(&self) -> TrustLevel {
        self.lock().level
    }

    pub fn state(&self) -> TrustState {
        *self.lock()
    }

    /// Records a successful task. Reaching zero `tasks_remaining` below
    /// `autonomous` auto-promotes one level.
    pub fn record_success(&self) -> TrustLevel {
        let mut state = self.lock();

        state.completed_tasks += 1;
        state.success_streak += 1;
        state.consecutive_failures = 0;

        if state.tasks_remaining > 0 {
            state.tasks_remaining -= 1;
        }

        if state.tasks_remaining == 0 && state.level < TrustLevel::Autonomous {
            let next = promote_level(state.level);
            log::info!("trust auto-promoted from {:?} to {next:?}", state.level);
            state.level = next;
            state.tasks_remaining = TrustPolicy::for_level(next).tasks_to_promote;
        }

        state.level
    }

    /// Records a failed task. Three consecutive failures from any
    /// non-quarantine level auto-demote one step and reset the count.
    pub fn record_failure(&self) -> TrustLevel {
        let mut state = self.lock();

        state.failed_tasks += 1;
        state.success_streak = 0;
        state.consecutive_failures += 1;

        if state.consecutive_failures >= CONSECUTIVE_FAILURES_TO_DEMOTE
            && state.level > TrustLevel::Quarantine
        {
            let next = demote_level(state.level);
            log::warn!("trust auto-demoted from {:?} to {next:?}", state.level);
            state.level = next;
            state.consecutive_failures = 0;
            state.tasks_remaining = TrustPolicy::for_level(next).tasks_to_promote;
        }

        state.level
    }

    /// Explicit promotion, capped at `autonomous`.
    pub fn promote(&self, reason: &str) -> TrustLevel {
        let mut state = self.lock();
        let next = promote_level(state.level);

        if next != state.level {
            log::info!("trust promoted to {next:?}: {reason}");
            state.level = next;
            state.tasks_remaining = TrustPolicy::for_level(next).tasks_to_promote;
        }

        state.level
    }

    /// Explicit demotion, capped at `quarantine`.
    pub fn demote(&self, reason: &str) -> TrustLevel {
        let mut state = self.lock();
        let next = demote_level(state.level);

        if next != state.level {
            log::warn!("trust demoted to {next:?}: {reason}");
            state.level = next;
            state.consecutive_failures = 0;
            state.tasks_remaining = TrustPolicy::for_level(next).tasks_to_promote;
        }

        state.level
    }

    pub fn requires_snapshot(&self) -> bool {
        self.level() <= TrustLevel::Validated
    }

    pub fn auto_rollback(&self) -> bool {
        self.level() == TrustLevel::Quarantine
    }

    pub fn validate_after_agent(&self) -> bool {
        self.level() <= TrustLevel::Supervised
    }

    pub fn validate_after_task(&self) -> bool {
        self.level() <= TrustLevel::Trusted
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrustState> {
        // A poisoned trust lock means a panic mid-transition; the state
        // itself is plain data and safe to keep using.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
