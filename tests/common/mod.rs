//! Shared test fixtures: a local git repo to materialize workspaces
//! against, and a fully wired in-memory orchestrator stack.

#![allow(dead_code)]

use abathur::domain::models::{Budgets, PolicyProfile, RepoRef, TaskMode};
use abathur::domain::ports::AuditStore;
use abathur::infrastructure::database::InMemoryAuditStore;
use abathur::services::acceptance_predicates::PredicateRegistry;
use abathur::services::agent_adapter::mock::MockAdapter;
use abathur::services::agent_adapter::AdapterRegistry;
use abathur::services::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use abathur::services::overlay_broker::OverlayBroker;
use abathur::services::patch_applier::PatchApplier;
use abathur::services::policy_guard::PolicyGuard;
use abathur::services::sandbox_runner::SandboxRunner;
use abathur::services::scheduler::{Scheduler, TaskSpec};
use abathur::services::task_state_machine::{RoutingTable, TaskStateMachine};
use abathur::services::workspace::WorkspaceAllocator;
use std::collections::BTreeSet;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

/// Creates a throwaway git repo with one commit and returns its `RepoRef`.
pub fn local_repo_fixture() -> (TempDir, RepoRef) {
    let dir = tempfile::tempdir().expect("tempdir");
    let run = |args: &[&str]| {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir.path())
            .status()
            .expect("git invocation");
        assert!(status.success(), "git {args:?} failed");
    };
    run(&["init", "--quiet", "--initial-branch=main"]);
    run(&["config", "user.email", "fixture@example.com"]);
    run(&["config", "user.name", "fixture"]);
    std::fs::write(dir.path().join("README.md"), "fixture\n").expect("write readme");
    run(&["add", "."]);
    run(&["commit", "--quiet", "-m", "initial"]);

    let sha = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir.path())
        .output()
        .expect("git rev-parse");
    let commit_sha = String::from_utf8(sha.stdout).expect("utf8 sha").trim().to_string();

    let repo = RepoRef {
        url: dir.path().display().to_string(),
        branch: "main".to_string(),
        commit_sha,
    };
    (dir, repo)
}

pub struct Harness {
    pub scheduler: Arc<Scheduler>,
    pub overlay: Arc<OverlayBroker>,
    pub audit: Arc<InMemoryAuditStore>,
    pub workspace_root: TempDir,
}

/// Builds a scheduler wired entirely to in-memory/mock components, with
/// `mock-adapter` failing its first `fail_n_times` proposals/refinements
/// before succeeding.
pub fn build_harness(fail_n_times: u32, max_concurrency: usize) -> Harness {
    let audit_concrete = Arc::new(InMemoryAuditStore::new());
    let audit: Arc<dyn AuditStore> = audit_concrete.clone();

    let policy = Arc::new(PolicyGuard::new(audit.clone()));
    let overlay = Arc::new(OverlayBroker::with_audit(audit.clone()));
    let circuit_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::resilient()));

    let mut adapters = AdapterRegistry::new();
    adapters.register(
        abathur::domain::models::AdapterDescriptor {
            id: "mock-adapter".to_string(),
            capabilities: BTreeSet::from([
                abathur::domain::models::Capability::Plan,
                abathur::domain::models::Capability::Propose,
                abathur::domain::models::Capability::Refine,
                abathur::domain::models::Capability::ApplyPatch,
                abathur::domain::models::Capability::RunTests,
                abathur::domain::models::Capability::SummarizeDiff,
                abathur::domain::models::Capability::CommitMessage,
            ]),
            execution_model: abathur::domain::models::ExecutionModel::InProcess,
            default_policy_profile: "default".to_string(),
            cost_model: abathur::domain::models::CostModel { rate_per_input_token: 0.0, rate_per_output_token: 0.0 },
        },
        Arc::new(MockAdapter::failing("mock-adapter", fail_n_times)),
    );
    let adapters = Arc::new(adapters);

    let predicates = Arc::new(PredicateRegistry::new());

    let routing = RoutingTable {
        by_phase: [
            abathur::domain::models::Phase::Plan,
            abathur::domain::models::Phase::Code,
            abathur::domain::models::Phase::Test,
            abathur::domain::models::Phase::Review,
            abathur::domain::models::Phase::Commit,
            abathur::domain::models::Phase::Deploy,
        ]
        .into_iter()
        .map(|phase| (phase, "mock-adapter".to_string()))
        .collect(),
    };

    let workspace_root = tempfile::tempdir().expect("workspace tempdir");
    let mut profile = PolicyProfile::permissive_default("default");
    profile.write_scope = vec![workspace_root.path().to_string_lossy().to_string()];

    let sandbox = Arc::new(SandboxRunner::new(overlay.clone()));
    let patch_applier = Arc::new(PatchApplier::new(policy.clone(), sandbox));

    let fsm = Arc::new(TaskStateMachine::new(
        audit.clone(),
        policy,
        overlay.clone(),
        adapters,
        predicates,
        circuit_breaker,
        patch_applier,
        routing,
        profile,
    ));

    let workspace = Arc::new(WorkspaceAllocator::new(workspace_root.path().to_path_buf(), chrono::Duration::seconds(1)));

    let scheduler = Arc::new(Scheduler::new(audit, fsm, workspace, max_concurrency));

    Harness { scheduler, overlay, audit: audit_concrete, workspace_root }
}

pub fn task_spec(repo: RepoRef, budgets: Budgets) -> TaskSpec {
    TaskSpec {
        id: None,
        goal: "fix the failing test".to_string(),
        repo,
        mode: TaskMode::Bugfix,
        acceptance_criteria: vec![],
        policy_profile: "default".to_string(),
        budgets,
        deploy: false,
        priority: 0,
    }
}

pub fn generous_budgets() -> Budgets {
    Budgets {
        max_iterations: 5,
        cost_usd: 100.0,
        wall_time: chrono::Duration::seconds(60),
    }
}

/// Polls `scheduler.get_status` until the task reaches a terminal status
/// or the timeout elapses.
pub async fn wait_for_terminal(scheduler: &Arc<Scheduler>, task_id: &str, timeout: std::time::Duration) -> abathur::domain::models::Task {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(task) = scheduler.get_status(task_id).await {
            if task.status.is_terminal() {
                return task;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("task {task_id} did not reach a terminal state in time");
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
