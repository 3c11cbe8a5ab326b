//! Point operation benchmarks: raw put throughput into a fresh store and
//! get throughput against a prefilled, settled tree.

use bwdb::{Config, Database};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn keys(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| format!("key{i:08}").into_bytes()).collect()
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    for count in [100usize, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("sequential", count), &count, |b, &count| {
            let keys = keys(count);
            b.iter(|| {
                let db = Database::new();
                for k in &keys {
                    db.put(k, k).unwrap();
                }
                db
            });
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    for count in [100usize, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("hit", count), &count, |b, &count| {
            let keys = keys(count);
            let db = Database::with_config(Config {
                max_delta_count: 8,
                ..Config::default()
            })
            .unwrap();
            for k in &keys {
                db.put(k, k).unwrap();
            }
            // Warm reads let maintenance settle the tree before measuring.
            for _ in 0..3 {
                for k in &keys {
                    let _ = db.get(k);
                }
            }
            b.iter(|| {
                for k in &keys {
                    black_box(db.get(black_box(k)));
                }
            });
        });
    }
    group.finish();
}

fn bench_txn_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("txn");
    group.throughput(Throughput::Elements(1));
    group.bench_function("put_commit", |b| {
        let db = Database::new();
        let mut i = 0u64;
        b.iter(|| {
            let key = i.to_be_bytes();
            i += 1;
            let txn = db.new_txn();
            txn.put(&key, &key).unwrap();
            txn.commit().unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_txn_commit);
criterion_main!(benches);
