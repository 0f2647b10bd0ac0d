//! Task domain model.
//!
//! A `Task` is the unit of work accepted by the orchestrator: a coding goal
//! against a repository reference, driven through plan/code/test/review/
//! commit by a [`crate::services::task_state_machine::TaskStateMachine`]
//! until it reaches a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of change the task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    Refactor,
    NewFeature,
    Bugfix,
    AppGeneration,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refactor => "refactor",
            Self::NewFeature => "new_feature",
            Self::Bugfix => "bugfix",
            Self::AppGeneration => "app_generation",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "refactor" => Some(Self::Refactor),
            "new_feature" => Some(Self::NewFeature),
            "bugfix" => Some(Self::Bugfix),
            "app_generation" => Some(Self::AppGeneration),
            _ => None,
        }
    }
}

/// Top-level task status.
///
/// Transitions are one-way into the terminal states (`Succeeded`, `Failed`,
/// `Cancelled`); see [`TaskStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Planning,
    Coding,
    Testing,
    Reviewing,
    CommitPending,
    Deploying,
    Succeeded,
    Failed,
    Cancelled,
    /// Budget or policy pause awaiting an operator decision.
    Suspended,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::Coding => "coding",
            Self::Testing => "testing",
            Self::Reviewing => "reviewing",
            Self::CommitPending => "commit_pending",
            Self::Deploying => "deploying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Suspended => "suspended",
        }
    }

    /// Terminal statuses never transition out.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Planning, Self::Cancelled, Self::Failed],
            Self::Planning => &[Self::Coding, Self::Failed, Self::Cancelled, Self::Suspended],
            Self::Coding => &[Self::Testing, Self::Failed, Self::Cancelled, Self::Suspended],
            Self::Testing => &[Self::Reviewing, Self::Coding, Self::Failed, Self::Cancelled, Self::Suspended],
            Self::Reviewing => &[Self::CommitPending, Self::Coding, Self::Failed, Self::Cancelled, Self::Suspended],
            Self::CommitPending => &[Self::Succeeded, Self::Deploying, Self::Failed, Self::Cancelled],
            Self::Deploying => &[Self::Succeeded, Self::Failed, Self::Cancelled],
            Self::Suspended => &[Self::Planning, Self::Coding, Self::Testing, Self::Reviewing, Self::Failed, Self::Cancelled],
            Self::Succeeded | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// A repository reference bound at task acceptance time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRef {
    pub url: String,
    pub branch: String,
    /// Resolved at acceptance; the FSM's bound sha for `PatchSet` preconditions.
    pub commit_sha: String,
}

/// Resource budgets bound to a task at submission 
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Budgets {
    pub max_iterations: u32,
    pub cost_usd: f64,
    pub wall_time: chrono::Duration,
}

/// Running totals, always `<=` the corresponding `Budgets` field.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Spent {
    pub iterations: u32,
    pub cost_usd: f64,
    pub wall_time: chrono::Duration,
}

impl Default for chrono::Duration {
    fn default() -> Self {
        chrono::Duration::zero()
    }
}

impl Spent {
    pub fn within(&self, budgets: &Budgets) -> bool {
        self.iterations <= budgets.max_iterations
            && self.cost_usd <= budgets.cost_usd
            && self.wall_time <= budgets.wall_time
    }
}

/// A named acceptance predicate reference, resolved against the tool-plugin
/// registry at TESTING time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub name: String,
    /// Opaque argv passed to the predicate's command, if it shells out.
    #[serde(default)]
    pub args: Vec<String>,
}

/// The unit of work accepted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub goal: String,
    pub repo: RepoRef,
    pub mode: TaskMode,
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    /// Name of the bound `PolicyProfile`.
    pub policy_profile: String,
    /// Policy profile version bound at submission (profiles are versioned config).
    pub policy_profile_version: u64,
    pub budgets: Budgets,
    pub status: TaskStatus,
    pub spent: Spent,
    pub deploy: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Attempt a status transition, enforcing the one-way-into-terminal
    /// invariant. Callers are responsible for writing the audit entry
    /// *before* calling this (write-ahead transition).
    pub fn transition_to(&mut self, next: TaskStatus) -> Result<(), crate::domain::errors::DomainError> {
        if self.status.is_terminal() {
            return Err(crate::domain::errors::DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(crate::domain::errors::DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.terminal_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn is_queued(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task {
            id: Uuid::new_v4().to_string(),
            goal: "fix off-by-one in paginate".into(),
            repo: RepoRef {
                url: "https://example.test/repo.git".into(),
                branch: "main".into(),
                commit_sha: "deadbeef".into(),
            },
            mode: TaskMode::Bugfix,
            acceptance_criteria: vec![AcceptanceCriterion {
                name: "unit_tests_pass".into(),
                args: vec![],
            }],
            policy_profile: "default".into(),
            policy_profile_version: 1,
            budgets: Budgets {
                max_iterations: 3,
                cost_usd: 0.5,
                wall_time: chrono::Duration::minutes(5),
            },
            status: TaskStatus::Pending,
            spent: Spent::default(),
            deploy: false,
            priority: 0,
            created_at: Utc::now(),
            terminal_at: None,
        }
    }

    #[test]
    fn valid_transition_sequence_succeeds() {
        let mut task = sample_task();
        for next in [
            TaskStatus::Planning,
            TaskStatus::Coding,
            TaskStatus::Testing,
            TaskStatus::Reviewing,
            TaskStatus::CommitPending,
            TaskStatus::Succeeded,
        ] {
            task.transition_to(next).expect("transition should succeed");
        }
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert!(task.terminal_at.is_some());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut task = sample_task();
        task.transition_to(TaskStatus::Cancelled).unwrap();
        assert!(task.transition_to(TaskStatus::Planning).is_err());
    }

    #[test]
    fn skipping_phases_is_rejected() {
        let mut task = sample_task();
        assert!(task.transition_to(TaskStatus::Testing).is_err());
    }

    #[test]
    fn spent_within_budget_boundaries() {
        let budgets = Budgets {
            max_iterations: 2,
            cost_usd: 1.0,
            wall_time: chrono::Duration::minutes(1),
        };
        let spent = Spent {
            iterations: 2,
            cost_usd: 1.0,
            wall_time: chrono::Duration::minutes(1),
        };
        assert!(spent.within(&budgets));
        let over = Spent {
            iterations: 3,
            ..spent
        };
        assert!(!over.within(&budgets));
    }
}
