use abathur::domain::models::{AuditEntry, AuditEventKind};
use abathur::domain::ports::AuditStore;
use abathur::infrastructure::database::InMemoryAuditStore;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_append(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryAuditStore::new();

    c.bench_function("audit_store/append", |b| {
        b.to_async(&rt)
            .iter(|| async { store.append(AuditEntry::transition("bench-task", "pending", "planning", None)).await.unwrap() });
    });
}

fn bench_scan_by_history_size(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("audit_store/scan_by_history_size");

    for size in [100usize, 1_000, 10_000] {
        let store = InMemoryAuditStore::new();
        rt.block_on(async {
            for _ in 0..size {
                store
                    .append(AuditEntry::metric("bench-task", AuditEventKind::BudgetEvent, serde_json::json!({})))
                    .await
                    .unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(&rt).iter(|| async { store.scan("bench-task", None).await.unwrap() });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_append, bench_scan_by_history_size);
criterion_main!(benches);
