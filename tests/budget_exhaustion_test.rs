mod common;

use abathur::domain::models::{Budgets, TaskStatus};
use common::{build_harness, local_repo_fixture, task_spec, wait_for_terminal};
use std::time::Duration;

#[tokio::test]
async fn zero_iteration_budget_fails_at_the_coding_phase() {
    let (_repo_dir, repo) = local_repo_fixture();
    let harness = build_harness(0, 4);
    let budgets = Budgets {
        max_iterations: 0,
        cost_usd: 100.0,
        wall_time: chrono::Duration::seconds(60),
    };
    let task_id = harness.scheduler.submit(task_spec(repo, budgets)).await.expect("submit");

    let task = wait_for_terminal(&harness.scheduler, &task_id, Duration::from_secs(10)).await;
    assert_eq!(task.status, TaskStatus::Failed);

    let entries = harness.audit.scan(&task_id, None).await.expect("scan");
    let reasons: Vec<_> = entries
        .iter()
        .filter(|e| e.kind == abathur::domain::models::AuditEventKind::TerminalOutcome)
        .filter_map(|e| e.payload.get("reason").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    assert_eq!(reasons, vec!["iteration_budget_exhausted"]);
}
