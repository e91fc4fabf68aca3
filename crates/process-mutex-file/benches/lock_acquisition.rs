//! Benchmarks for uncontended lock acquisition latency

use criterion::{Criterion, criterion_group, criterion_main};
use process_mutex_core::prelude::*;
use process_mutex_file::MultiProcessMutexProvider;
use tempfile::TempDir;

fn bench_file_lock_acquisition(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let provider = MultiProcessMutexProvider::new(temp_dir.path()).unwrap();

    let lock = provider.create_lock("bench-lock").unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("process_mutex");
    group.bench_function("try_acquire_release", |b| {
        b.to_async(&rt).iter(|| async {
            if let Ok(Some(handle)) = lock.try_acquire().await {
                let _ = handle.release().await;
            }
        });
    });

    group.bench_function("acquire_release", |b| {
        b.to_async(&rt).iter(|| async {
            if let Ok(handle) = lock.acquire().await {
                let _ = handle.release().await;
            }
        });
    });

    group.bench_function("with_lock", |b| {
        b.to_async(&rt).iter(|| async {
            let _: Result<(), LockError> = lock.with_lock(|| async { Ok(()) }).await;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_file_lock_acquisition);
criterion_main!(benches);
