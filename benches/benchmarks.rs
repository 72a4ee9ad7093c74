//! 链式哈希表性能基准测试

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chained_hashtable::{ChainedMap, ChainedMapConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;

// 基准测试配置
const SEED: u64 = 42;
const ITEM_COUNTS: [usize; 3] = [10_000, 100_000, 1_000_000];

/// 生成随机键值对
fn generate_items(count: usize) -> Vec<(u64, u64)> {
    let mut rng = StdRng::seed_from_u64(SEED);
    (0..count).map(|_| (rng.gen::<u64>(), rng.gen::<u64>())).collect()
}

fn bench_map(bucket_count: usize) -> ChainedMap<u64, u64> {
    let config = ChainedMapConfig {
        bucket_count,
        ..ChainedMapConfig::default()
    };
    ChainedMap::with_config(config).expect("配置有效")
}

/// 插入操作基准测试
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Insert");

    for &count in ITEM_COUNTS.iter() {
        let items = generate_items(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &items, |b, items| {
            b.iter_batched(
                || bench_map(87719),
                |map| {
                    for &(key, value) in items {
                        let (it, _) = map.insert(key, value);
                        drop(it);
                    }
                },
                criterion::BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

/// 查询操作基准测试
fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("Find");

    for &count in ITEM_COUNTS.iter() {
        let items = generate_items(count);
        let keys: Vec<u64> = items.iter().map(|&(k, _)| k).collect();

        // 预填充哈希表
        let map = bench_map(87719);
        for &(key, value) in &items {
            drop(map.insert(key, value));
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    let it = map.find(key);
                    criterion::black_box(it.is_end());
                }
            });
        });
    }
    group.finish();
}

/// 删除操作基准测试
fn bench_erase(c: &mut Criterion) {
    let mut group = c.benchmark_group("Erase");

    for &count in ITEM_COUNTS.iter() {
        let items = generate_items(count);
        let keys: Vec<u64> = items.iter().map(|&(k, _)| k).collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.iter_batched(
                || {
                    let map = bench_map(87719);
                    for &(key, value) in &items {
                        drop(map.insert(key, value));
                    }
                    map
                },
                |map| {
                    for key in keys {
                        criterion::black_box(map.erase(key));
                    }
                },
                criterion::BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

/// 多线程吞吐基准测试：每线程操作互不相交的键区间
fn bench_concurrent_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("ConcurrentInsert");
    const PER_THREAD: u64 = 25_000;

    for &threads in [2usize, 4, 8].iter() {
        group.throughput(Throughput::Elements(threads as u64 * PER_THREAD));
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            &threads,
            |b, &threads| {
                b.iter_batched(
                    || Arc::new(bench_map(87719)),
                    |map| {
                        let mut handles = Vec::new();
                        for t in 0..threads as u64 {
                            let map = Arc::clone(&map);
                            handles.push(thread::spawn(move || {
                                let base = t * PER_THREAD;
                                for k in base..base + PER_THREAD {
                                    drop(map.insert(k, k));
                                }
                            }));
                        }
                        for handle in handles {
                            handle.join().expect("插入线程不应崩溃");
                        }
                    },
                    criterion::BatchSize::PerIteration,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_find,
    bench_erase,
    bench_concurrent_insert
);
criterion_main!(benches);
