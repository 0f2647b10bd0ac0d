mod common;

use abathur::domain::models::TaskStatus;
use common::{build_harness, generous_budgets, local_repo_fixture, task_spec, wait_for_terminal};
use std::time::Duration;

#[tokio::test]
async fn bugfix_task_runs_plan_code_test_review_commit_to_success() {
    let (_repo_dir, repo) = local_repo_fixture();
    let harness = build_harness(0, 4);
    let spec = task_spec(repo, generous_budgets());

    let task_id = harness.scheduler.submit(spec).await.expect("submit");
    let task = wait_for_terminal(&harness.scheduler, &task_id, Duration::from_secs(10)).await;

    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(task.spent.iterations, 1);

    let entries = harness.audit.scan(&task_id, None).await.expect("scan");
    let transitions: Vec<_> = entries
        .iter()
        .filter(|e| e.kind == abathur::domain::models::AuditEventKind::StateTransition)
        .map(|e| e.next_state.clone().unwrap_or_default())
        .collect();
    assert_eq!(
        transitions,
        vec!["planning", "coding", "testing", "reviewing", "commit_pending", "succeeded"]
    );
}

#[tokio::test]
async fn list_tasks_reflects_terminal_status() {
    let (_repo_dir, repo) = local_repo_fixture();
    let harness = build_harness(0, 4);
    let task_id = harness.scheduler.submit(task_spec(repo, generous_budgets())).await.expect("submit");
    wait_for_terminal(&harness.scheduler, &task_id, Duration::from_secs(10)).await;

    let succeeded = harness
        .scheduler
        .list_tasks(&abathur::services::scheduler::TaskFilter { status: Some(TaskStatus::Succeeded) })
        .await;
    assert!(succeeded.iter().any(|t| t.id == task_id));
}
