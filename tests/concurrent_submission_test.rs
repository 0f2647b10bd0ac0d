mod common;

use abathur::domain::models::TaskStatus;
use common::{build_harness, generous_budgets, local_repo_fixture, task_spec, wait_for_terminal};
use std::time::Duration;

/// 20 tasks submitted against a 3-permit scheduler all eventually
/// succeed, and each task's own audit trail is internally consistent
/// (monotonic, gap-free sequence numbers) even though their `drive()`
/// calls interleave under the semaphore.
#[tokio::test]
async fn many_concurrent_tasks_all_complete_with_consistent_audit_trails() {
    let (_repo_dir, repo) = local_repo_fixture();
    let harness = build_harness(0, 3);

    let mut task_ids = Vec::new();
    for _ in 0..20 {
        let id = harness.scheduler.submit(task_spec(repo.clone(), generous_budgets())).await.expect("submit");
        task_ids.push(id);
    }

    for id in &task_ids {
        let task = wait_for_terminal(&harness.scheduler, id, Duration::from_secs(20)).await;
        assert_eq!(task.status, TaskStatus::Succeeded);

        let entries = harness.audit.scan(id, None).await.expect("scan");
        let seqs: Vec<i64> = entries.iter().map(|e| e.seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted, "sequence numbers must be assigned in append order");
        assert_eq!(sorted, (0..entries.len() as i64).collect::<Vec<_>>(), "no gaps or duplicates");
    }
}

#[tokio::test]
async fn submitting_after_shutdown_is_rejected() {
    let (_repo_dir, repo) = local_repo_fixture();
    let harness = build_harness(0, 2);
    harness.scheduler.shutdown(Duration::from_millis(10)).await;

    let result = harness.scheduler.submit(task_spec(repo, generous_budgets())).await;
    assert!(result.is_err());
}
