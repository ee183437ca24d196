//! Throughput Benchmark for MemoryDB
//!
//! This benchmark measures the performance of the store
//! under various workloads.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use memorydb::protocol::parse_line;
use memorydb::storage::{Store, Ttl, DEFAULT_TTL};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Large enough that no benchmark hits the capacity limit
const BENCH_CAPACITY: usize = 10_000_000;

fn bench_store() -> Store {
    Store::new(DEFAULT_TTL, BENCH_CAPACITY)
}

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let store = bench_store();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            store.set(&key, "small_value", Ttl::Default).unwrap();
            i += 1;
        });
    });

    group.bench_function("set_large", |b| {
        let mut i = 0u64;
        let value = "x".repeat(64 * 1024); // 64KB value
        b.iter(|| {
            let key = format!("key:{}", i % 1_000);
            store.set(&key, &value, Ttl::Never).unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let store = bench_store();
    for i in 0..10_000 {
        store.set(&format!("key:{}", i), "value", Ttl::Never).unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            black_box(store.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        b.iter(|| black_box(store.get("nonexistent")));
    });

    group.finish();
}

/// Benchmark ADD on free and taken keys
fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");
    group.throughput(Throughput::Elements(1));

    group.bench_function("add_conflict", |b| {
        let store = bench_store();
        store.set("taken", "value", Ttl::Never).unwrap();
        b.iter(|| black_box(store.add("taken", "other", Ttl::Default).is_err()));
    });

    group.bench_function("add_fresh", |b| {
        b.iter_batched(
            bench_store,
            |store| store.add("fresh", "value", Ttl::Default).unwrap(),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let store = Arc::new(bench_store());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            store.set(&key, "value", Ttl::Default).unwrap();
                            store.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.len());
        });
    });

    group.finish();
}

/// Benchmark sweeping a store where half the entries expired
fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    group.bench_function("sweep_10k", |b| {
        b.iter_batched(
            || {
                let store = bench_store();
                for i in 0..10_000 {
                    let ttl = if i % 2 == 0 {
                        Ttl::After(Duration::from_secs(60))
                    } else {
                        Ttl::Never
                    };
                    store.set(&format!("key:{}", i), "value", ttl).unwrap();
                }
                store
            },
            |store| black_box(store.sweep_at(SystemTime::now() + Duration::from_secs(120))),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

/// Benchmark the line parser
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_set_with_ttl", |b| {
        b.iter(|| black_box(parse_line(black_box("SET session:42 token 1h30m"))));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_add,
    bench_concurrent,
    bench_sweep,
    bench_parse,
);

criterion_main!(benches);
