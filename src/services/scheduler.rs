//! Task admission, workspace lifecycle, concurrency bounds, cancellation
//! propagation, and graceful shutdown — the top-level component that wires
//! the other six together.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AuditEntry, AuditEventKind, Budgets, RepoRef, Task, TaskMode, TaskStatus};
use crate::domain::ports::{AuditStore, TaskCtx};
use crate::services::task_state_machine::TaskStateMachine;
use crate::services::workspace::WorkspaceAllocator;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, RwLock, Semaphore};
use uuid::Uuid;

/// One task's position in the admission queue: compares by priority first
/// (higher runs first), then by submission order (lower `seq` runs first).
/// `BinaryHeap` is a max-heap, so ties favor the smaller `seq`.
struct AdmissionEntry {
    priority: i32,
    seq: i64,
    task_id: String,
}

impl PartialEq for AdmissionEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for AdmissionEntry {}

impl PartialOrd for AdmissionEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for AdmissionEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task {0} already exists")]
    DuplicateId(String),
    #[error("goal must not be empty")]
    EmptyGoal,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// A task submission as received at the ingress boundary. Wire encoding is
/// left to callers; this struct is the parsed, validated form.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: Option<String>,
    pub goal: String,
    pub repo: RepoRef,
    pub mode: TaskMode,
    pub acceptance_criteria: Vec<String>,
    pub policy_profile: String,
    pub budgets: Budgets,
    pub deploy: bool,
    pub priority: i32,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

struct QueuedTask {
    task: Arc<Mutex<Task>>,
    acceptance_criteria: Vec<String>,
}

/// Owns every live `Task` and bounds how many may be simultaneously
/// RUNNING. Admission is FIFO by submission time with an optional priority
/// override (higher runs first, ties by FIFO).
pub struct Scheduler {
    audit: Arc<dyn AuditStore>,
    fsm: Arc<TaskStateMachine>,
    workspace: Arc<WorkspaceAllocator>,
    concurrency: Arc<Semaphore>,
    tasks: RwLock<HashMap<String, QueuedTask>>,
    submission_counter: AtomicI64,
    admission_queue: Mutex<BinaryHeap<AdmissionEntry>>,
    admission_notify: Notify,
    shutting_down: std::sync::atomic::AtomicBool,
}

impl Scheduler {
    pub fn new(audit: Arc<dyn AuditStore>, fsm: Arc<TaskStateMachine>, workspace: Arc<WorkspaceAllocator>, max_concurrency: usize) -> Self {
        Self {
            audit,
            fsm,
            workspace,
            concurrency: Arc::new(Semaphore::new(max_concurrency)),
            tasks: RwLock::new(HashMap::new()),
            submission_counter: AtomicI64::new(0),
            admission_queue: Mutex::new(BinaryHeap::new()),
            admission_notify: Notify::new(),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Validates the submission, appends CREATED before returning, and
    /// never blocks on capacity — an at-capacity task enters the queue
    /// PENDING.
    pub async fn submit(self: &Arc<Self>, spec: TaskSpec) -> Result<String, SchedulerError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(SchedulerError::Domain(DomainError::ValidationFailed("scheduler is shutting down".into())));
        }
        if spec.goal.trim().is_empty() {
            return Err(SchedulerError::EmptyGoal);
        }
        let id = spec.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        {
            let tasks = self.tasks.read().await;
            if tasks.contains_key(&id) {
                return Err(SchedulerError::DuplicateId(id));
            }
        }

        let priority = spec.priority;
        let task = Task {
            id: id.clone(),
            goal: spec.goal,
            repo: spec.repo,
            mode: spec.mode,
            acceptance_criteria: spec
                .acceptance_criteria
                .iter()
                .map(|name| crate::domain::models::AcceptanceCriterion { name: name.clone(), args: vec![] })
                .collect(),
            policy_profile: spec.policy_profile,
            policy_profile_version: 1,
            budgets: spec.budgets,
            status: TaskStatus::Pending,
            spent: Default::default(),
            deploy: spec.deploy,
            priority: spec.priority,
            created_at: chrono::Utc::now(),
            terminal_at: None,
        };

        self.audit
            .append(AuditEntry::metric(id.clone(), AuditEventKind::Created, serde_json::json!({ "priority": spec.priority })))
            .await?;

        let seq = self.submission_counter.fetch_add(1, Ordering::SeqCst);
        self.tasks.write().await.insert(
            id.clone(),
            QueuedTask { task: Arc::new(Mutex::new(task)), acceptance_criteria: spec.acceptance_criteria },
        );

        let this = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            this.drive_when_capacity(task_id, priority, seq).await;
        });

        Ok(id)
    }

    /// Blocks until `task_id` is both the highest-priority (earliest-submitted
    /// on ties) entry in the admission queue and a concurrency permit is
    /// free, so admission order is provable rather than whatever order tokio
    /// happens to poll spawned futures in.
    async fn acquire_in_order(&self, task_id: &str, priority: i32, seq: i64) -> Option<OwnedSemaphorePermit> {
        {
            let mut heap = self.admission_queue.lock().await;
            heap.push(AdmissionEntry { priority, seq, task_id: task_id.to_string() });
        }
        loop {
            let notified = self.admission_notify.notified();
            let permit = {
                let mut heap = self.admission_queue.lock().await;
                if heap.peek().map(|e| e.task_id.as_str()) == Some(task_id) {
                    match self.concurrency.clone().try_acquire_owned() {
                        Ok(permit) => {
                            heap.pop();
                            Some(permit)
                        }
                        Err(_) => None,
                    }
                } else {
                    None
                }
            };
            if let Some(permit) = permit {
                return Some(permit);
            }
            notified.await;
        }
    }

    async fn drive_when_capacity(self: Arc<Self>, task_id: String, priority: i32, seq: i64) {
        let Some(permit) = self.acquire_in_order(&task_id, priority, seq).await else {
            return;
        };
        let entry = {
            let tasks = self.tasks.read().await;
            tasks.get(&task_id).map(|q| (q.task.clone(), q.acceptance_criteria.clone()))
        };
        let Some((task_handle, acceptance_criteria)) = entry else {
            drop(permit);
            self.admission_notify.notify_waiters();
            return;
        };

        let (repo, task_id_for_workspace) = {
            let task = task_handle.lock().await;
            (task.repo.clone(), task.id.clone())
        };

        let workspace = match self.workspace.materialize(&task_id_for_workspace, &repo).await {
            Ok(ws) => ws,
            Err(_) => {
                let mut task = task_handle.lock().await;
                let _ = self.fsm.cancel(&mut task, "workspace_materialize_failed").await;
                drop(permit);
                self.admission_notify.notify_waiters();
                return;
            }
        };

        let mut ctx = TaskCtx {
            task_id: task_id_for_workspace.clone(),
            workspace_root: workspace.path().to_path_buf(),
            bound_commit_sha: repo.commit_sha.clone(),
            goal: {
                let task = task_handle.lock().await;
                task.goal.clone()
            },
            acceptance_criteria_summary: acceptance_criteria.join(", "),
            policy_profile_name: {
                let task = task_handle.lock().await;
                task.policy_profile.clone()
            },
            remaining_budget_cost_usd: {
                let task = task_handle.lock().await;
                task.budgets.cost_usd
            },
            remaining_iterations: {
                let task = task_handle.lock().await;
                task.budgets.max_iterations
            },
        };

        {
            let mut task = task_handle.lock().await;
            let _ = self
                .fsm
                .drive(&mut task, &mut ctx, &acceptance_criteria, workspace.path())
                .await;
        }

        self.workspace.retire(workspace).await;
        drop(permit);
        self.admission_notify.notify_waiters();
    }

    /// Idempotent; only effective on non-terminal tasks.
    pub async fn cancel(&self, task_id: &str, reason: &str) -> DomainResult<()> {
        let entry = {
            let tasks = self.tasks.read().await;
            tasks.get(task_id).map(|q| q.task.clone())
        };
        if let Some(task_handle) = entry {
            let mut task = task_handle.lock().await;
            self.fsm.cancel(&mut task, reason).await?;
        }
        Ok(())
    }

    pub async fn get_status(&self, task_id: &str) -> Option<Task> {
        let tasks = self.tasks.read().await;
        if let Some(q) = tasks.get(task_id) {
            Some(q.task.lock().await.clone())
        } else {
            None
        }
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut result = Vec::new();
        for q in tasks.values() {
            let task = q.task.lock().await.clone();
            if filter.status.is_none_or(|s| s == task.status) {
                result.push(task);
            }
        }
        result.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        result
    }

    /// Stops admitting, cancels all running tasks, and waits for cancellation
    /// to take effect within `grace`.
    pub async fn shutdown(&self, grace: std::time::Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let task_ids: Vec<String> = {
            let tasks = self.tasks.read().await;
            tasks.keys().cloned().collect()
        };
        for task_id in task_ids {
            let _ = self.cancel(&task_id, "scheduler_shutdown").await;
        }
        tokio::time::sleep(grace).await;
    }
}
