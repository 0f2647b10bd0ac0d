mod common;

use abathur::domain::models::TaskStatus;
use common::{build_harness, generous_budgets, local_repo_fixture, task_spec, wait_for_terminal};
use std::time::Duration;

/// `MockAdapter::failing(id, 1)` returns `NeedsRefine` on its very first
/// call (the plan phase) and `Ok` on every call after, exercising the
/// plan-phase refine loop before the task still reaches success.
#[tokio::test]
async fn one_plan_refinement_still_reaches_success() {
    let (_repo_dir, repo) = local_repo_fixture();
    let harness = build_harness(1, 4);
    let task_id = harness.scheduler.submit(task_spec(repo, generous_budgets())).await.expect("submit");

    let task = wait_for_terminal(&harness.scheduler, &task_id, Duration::from_secs(10)).await;
    assert_eq!(task.status, TaskStatus::Succeeded);
}

/// `PLAN_MAX_ATTEMPTS` is 2; failing 2 times in a row exhausts the plan
/// phase's retry budget and the task fails rather than looping forever.
#[tokio::test]
async fn exhausting_plan_retries_fails_the_task() {
    let (_repo_dir, repo) = local_repo_fixture();
    let harness = build_harness(2, 4);
    let task_id = harness.scheduler.submit(task_spec(repo, generous_budgets())).await.expect("submit");

    let task = wait_for_terminal(&harness.scheduler, &task_id, Duration::from_secs(10)).await;
    assert_eq!(task.status, TaskStatus::Failed);
}
