use abathur::domain::models::PolicyProfile;
use abathur::infrastructure::database::InMemoryAuditStore;
use abathur::services::policy_guard::PolicyGuard;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn guard() -> PolicyGuard {
    PolicyGuard::new(Arc::new(InMemoryAuditStore::new()))
}

fn bench_check_command(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let profile = PolicyProfile::permissive_default("default");
    let guard = guard();
    let argv = vec!["git".to_string(), "status".to_string()];

    c.bench_function("policy_guard/check_command_allowed", |b| {
        b.to_async(&rt).iter(|| async { guard.check_command("bench-task", &profile, &argv).await.unwrap() });
    });
}

fn bench_check_command_scaling(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("policy_guard/check_command_by_pattern_count");
    for pattern_count in [1usize, 8, 32] {
        let mut profile = PolicyProfile::permissive_default("default");
        profile.command_allow_patterns = (0..pattern_count).map(|i| format!("^cmd-{i}( .*)?$")).collect();
        profile.command_allow_patterns.push("^git status$".to_string());
        let guard = guard();
        let argv = vec!["git".to_string(), "status".to_string()];

        group.bench_with_input(BenchmarkId::from_parameter(pattern_count), &pattern_count, |b, _| {
            b.to_async(&rt).iter(|| async { guard.check_command("bench-task", &profile, &argv).await.unwrap() });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_check_command, bench_check_command_scaling);
criterion_main!(benches);
