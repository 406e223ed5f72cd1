//! Performance benchmarks for query-cache-kit
//!
//! This benchmark suite measures:
//! - Cache key derivation for the simple, detailed and fallback forms
//! - Invalidation planning
//! - The read path (cache hit vs. bypass) through `QueryCache`
//! - Row serialization across result sizes
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use query_cache_kit::backend::InMemoryBackend;
use query_cache_kit::config::{QueryCacheConfig, ReadOptions};
use query_cache_kit::invalidation::InvalidationPlanner;
use query_cache_kit::key::{KeyGenerator, KeyOptions};
use query_cache_kit::serialization::{deserialize_from_cache, serialize_for_cache};
use query_cache_kit::store::{QueryResult, ScriptedStore};
use query_cache_kit::strategy::KeyStrategy;
use query_cache_kit::{QueryCache, Row};
use serde_json::json;
use std::hint::black_box;
use std::time::Duration;

fn rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| json!({"id": i, "name": format!("user {}", i), "active": i % 2 == 0}))
        .collect()
}

// ============================================================================
// Group 1: Key Derivation
// ============================================================================

fn key_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_generation");

    let detailed_sql = "SELECT * FROM orders WHERE user_id = ? AND status = ?";
    let detailed_params = [json!(123), json!("active")];
    group.bench_function("detailed", |b| {
        b.iter(|| {
            KeyGenerator::generate(
                black_box(detailed_sql),
                black_box(&detailed_params),
                &KeyOptions::default(),
            )
        })
    });

    let wide_sql = "SELECT o.* FROM shop.orders o WHERE o.user_id = ? AND (o.status = ? OR o.status = ?) AND o.total >= ? AND o.created_at < ? ORDER BY o.id LIMIT 50";
    let wide_params = [json!(1), json!("a"), json!("b"), json!(10.5), json!("2024-01-01")];
    group.bench_function("simple_five_params", |b| {
        b.iter(|| {
            KeyGenerator::generate(
                black_box(wide_sql),
                black_box(&wide_params),
                &KeyOptions::default().with_strategy(KeyStrategy::Simple),
            )
        })
    });

    group.bench_function("hash_fallback", |b| {
        b.iter(|| KeyGenerator::generate(black_box("SHOW TABLES"), &[], &KeyOptions::default()))
    });

    group.finish();
}

// ============================================================================
// Group 2: Invalidation Planning
// ============================================================================

fn planner_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidation_planner");
    let planner = InvalidationPlanner::default();

    group.bench_function("update", |b| {
        b.iter(|| planner.plan(black_box("UPDATE users SET name = ? WHERE id = ?"), None))
    });
    group.bench_function("select", |b| {
        b.iter(|| planner.plan(black_box("SELECT * FROM users WHERE id = ?"), None))
    });

    group.finish();
}

// ============================================================================
// Group 3: Read Path
// ============================================================================

fn read_path_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_cache_read");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    let (cached, bypass) = rt.block_on(async {
        let store = ScriptedStore::with_rows(rows(20));
        let cached = QueryCache::new(store.clone(), InMemoryBackend::new());
        cached.cache().wait_ready(Duration::from_secs(1)).await;
        let bypass = QueryCache::builder(store, InMemoryBackend::new())
            .with_config(QueryCacheConfig::default().with_cache_enabled(false))
            .build();
        (cached, bypass)
    });

    let sql = "SELECT * FROM users WHERE id = ?";
    let params = [json!(1)];
    rt.block_on(async {
        cached
            .read(sql, &params, ReadOptions::default())
            .await
            .expect("Failed to warm cache")
    });

    group.bench_function("hit", |b| {
        b.to_async(&rt).iter(|| async {
            cached
                .read(black_box(sql), black_box(&params), ReadOptions::default())
                .await
                .expect("Failed to read")
        })
    });

    group.bench_function("bypass", |b| {
        b.to_async(&rt).iter(|| async {
            bypass
                .read(black_box(sql), black_box(&params), ReadOptions::default())
                .await
                .expect("Failed to read")
        })
    });

    group.finish();
}

// ============================================================================
// Group 4: Serialization
// ============================================================================

fn serialization_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    for count in [1, 100, 1_000].iter() {
        let data = rows(*count);
        let bytes = serialize_for_cache(&data).expect("Failed to serialize");

        group
            .throughput(Throughput::Bytes(bytes.len() as u64))
            .bench_with_input(BenchmarkId::new("serialize", count), &data, |b, data| {
                b.iter(|| serialize_for_cache(black_box(data)));
            });

        group
            .throughput(Throughput::Bytes(bytes.len() as u64))
            .bench_with_input(BenchmarkId::new("deserialize", count), &bytes, |b, bytes| {
                b.iter(|| deserialize_from_cache::<Vec<Row>>(black_box(bytes)));
            });
    }

    group.finish();
}

// ============================================================================
// Benchmark Registration
// ============================================================================

criterion_group!(
    benches,
    key_benchmarks,
    planner_benchmarks,
    read_path_benchmarks,
    serialization_benchmarks
);
criterion_main!(benches);
