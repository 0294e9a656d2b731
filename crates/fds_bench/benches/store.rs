//! Record store benchmarks on simulated flash.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use fds_bench::utils::{keys, mounted_store, payload, populated_store};
use fds_core::{FindToken, RecordKey};

/// Records written per measured batch.
const BATCH: usize = 32;

/// Benchmark writing records of different sizes.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for words in [1usize, 16, 64] {
        group.throughput(Throughput::Elements(BATCH as u64));
        group.bench_with_input(BenchmarkId::from_parameter(words), &words, |b, &words| {
            let data = payload(words, 1);
            let keys = keys(BATCH);
            b.iter_batched(
                || mounted_store(false),
                |store| {
                    for key in &keys {
                        store.write(*key, &[data.clone()]).unwrap();
                        store.run_until_idle().unwrap();
                    }
                    store
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.bench_function("16_with_crc", |b| {
        let data = payload(16, 1);
        let keys = keys(BATCH);
        b.iter_batched(
            || mounted_store(true),
            |store| {
                for key in &keys {
                    store.write(*key, &[data.clone()]).unwrap();
                    store.run_until_idle().unwrap();
                }
                store
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark searching and reading.
fn bench_find_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");
    let store = populated_store(128, 8);

    group.bench_function("by_key", |b| {
        b.iter(|| {
            let mut token = FindToken::new();
            let mut found = 0;
            while store.find(1, 0, black_box(&mut token)).is_ok() {
                found += 1;
            }
            black_box(found)
        });
    });

    group.bench_function("by_type", |b| {
        b.iter(|| {
            let mut token = FindToken::new();
            let mut found = 0;
            while store.find_by_type(2, &mut token).is_ok() {
                found += 1;
            }
            black_box(found)
        });
    });

    group.bench_function("open_close", |b| {
        let mut token = FindToken::new();
        let mut desc = store.find(3, 2, &mut token).unwrap();
        b.iter(|| {
            let view = store.open(&mut desc).unwrap();
            store.close(&desc).unwrap();
            black_box(view)
        });
    });

    group.finish();
}

/// Benchmark garbage collection with half of the records cleared.
fn bench_gc(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc");

    group.bench_function("half_cleared", |b| {
        b.iter_batched(
            || {
                let store = populated_store(96, 8);
                for instance in (0..16).step_by(2) {
                    store.clear_by_instance(instance).unwrap();
                    store.run_until_idle().unwrap();
                }
                store
            },
            |store| {
                store.gc().unwrap();
                store.run_until_idle().unwrap();
                store
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("update_churn", |b| {
        let key = RecordKey::new(9, 9);
        let data = payload(8, 3);
        b.iter_batched(
            || {
                let store = mounted_store(false);
                let desc = store.write(key, &[data.clone()]).unwrap();
                store.run_until_idle().unwrap();
                (store, desc)
            },
            |(store, mut desc)| {
                for _ in 0..BATCH {
                    desc = store.update(&desc, key, &[data.clone()]).unwrap();
                    store.run_until_idle().unwrap();
                }
                store.gc().unwrap();
                store.run_until_idle().unwrap();
                store
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_write, bench_find_open, bench_gc);
criterion_main!(benches);
