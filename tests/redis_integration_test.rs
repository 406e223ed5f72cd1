//! Redis Backend Integration Tests
//!
//! These tests require a running Redis instance and skip themselves when none
//! is reachable.
//!
//! ```bash
//! docker run --rm -p 6379:6379 redis:7
//! cargo test --features redis --test redis_integration_test
//! ```
//!
//! ## Environment Variables
//!
//! - `TEST_REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
//!
//! ## What's Tested
//!
//! 1. Connection and health check
//! 2. Set/get/exists/delete with TTL
//! 3. Cursor scan and pattern deletes through the resilience layer
//! 4. A full read → write → re-read cycle through `QueryCache`

#![cfg(feature = "redis")]

use query_cache_kit::backend::{CacheBackend, RedisBackend, RedisConfig};
use query_cache_kit::config::{QueryCacheConfig, ReadOptions, WriteOptions};
use query_cache_kit::resilience::{ResilienceConfig, ResilientCache};
use query_cache_kit::store::{QueryResult, ScriptedStore};
use query_cache_kit::QueryCache;
use serde_json::json;
use std::env;
use std::time::Duration;

/// Helper: Get Redis connection URL from environment or use default
fn get_redis_url() -> String {
    env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// Helper: Create a test Redis backend
fn create_test_backend() -> Result<RedisBackend, Box<dyn std::error::Error>> {
    let redis_url = get_redis_url();
    println!("Connecting to Redis: {}", redis_url);

    let backend = RedisBackend::from_connection_string(&redis_url)?;
    Ok(backend)
}

/// Helper: Check if Redis is available
async fn is_redis_available() -> bool {
    match create_test_backend() {
        Ok(backend) => backend.health_check().await.unwrap_or(false),
        Err(_) => false,
    }
}

/// Unique namespace per test so parallel tests never see each other's keys.
fn test_namespace(test: &str) -> String {
    format!("qck-test:{}:{}", test, std::process::id())
}

// =============================================================================
// Test 1: Connection
// =============================================================================

#[tokio::test]
async fn test_redis_connection() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let backend = create_test_backend().expect("Failed to create Redis backend");
    backend.connect().await.expect("Connect should succeed");
    assert!(backend.health_check().await.expect("Health check failed"));
    println!("✓ Redis connection successful");
}

#[tokio::test]
async fn test_redis_connection_with_config() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let config = RedisConfig {
        host: "localhost".to_string(),
        port: 6379,
        database: 0,
        pool_size: 4,
        connection_timeout: Duration::from_secs(2),
        ..Default::default()
    };

    let backend = RedisBackend::new(config).expect("Failed to create Redis backend from config");
    assert!(backend.health_check().await.expect("Health check failed"));
    println!("✓ RedisConfig connection successful");
}

// =============================================================================
// Test 2: Basic operations
// =============================================================================

#[tokio::test]
async fn test_redis_set_get_exists_delete() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let backend = create_test_backend().expect("Failed to create Redis backend");
    let key = format!("{}:key", test_namespace("basic"));

    backend
        .set(&key, b"[{\"id\":1}]".to_vec(), Some(Duration::from_secs(30)))
        .await
        .expect("SET should succeed");
    assert_eq!(
        backend.get(&key).await.expect("GET should not error"),
        Some(b"[{\"id\":1}]".to_vec())
    );
    assert!(backend.exists(&key).await.expect("EXISTS should not error"));

    backend.delete(&key).await.expect("DELETE should succeed");
    assert!(backend.get(&key).await.expect("GET should not error").is_none());
    println!("✓ Basic operations successful");
}

#[tokio::test]
async fn test_redis_ttl_expiration() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let backend = create_test_backend().expect("Failed to create Redis backend");
    let key = format!("{}:short", test_namespace("ttl"));

    backend
        .set(&key, b"[]".to_vec(), Some(Duration::from_secs(1)))
        .await
        .expect("SET should succeed");
    assert!(backend.get(&key).await.expect("GET").is_some());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(backend.get(&key).await.expect("GET").is_none());
    println!("✓ TTL expiration works");
}

// =============================================================================
// Test 3: Scan and pattern deletes
// =============================================================================

#[tokio::test]
async fn test_redis_delete_by_prefix() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let backend = create_test_backend().expect("Failed to create Redis backend");
    let namespace = test_namespace("prefix");
    let cache = ResilientCache::new(
        backend.clone(),
        ResilienceConfig::default().with_namespace(namespace.clone()),
    );
    assert!(cache.wait_ready(Duration::from_secs(5)).await);

    for i in 0..150 {
        cache.set(&format!("users:{}", i), vec![json!(i)], None).await;
    }
    cache.set("orders:1", vec![json!(1)], None).await;

    let deleted = cache.delete_by_prefix(&["users:*"]).await;

    assert_eq!(deleted, 150);
    assert!(cache.get("users:7").await.is_empty());
    assert_eq!(cache.get("orders:1").await, vec![json!(1)]);

    cache.delete_by_prefix(&["*"]).await;
    cache.close();
    println!("✓ Pattern delete removed 150 keys");
}

// =============================================================================
// Test 4: QueryCache over Redis
// =============================================================================

#[tokio::test]
async fn test_query_cache_over_redis() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let backend = create_test_backend().expect("Failed to create Redis backend");
    let store = ScriptedStore::new(|sql, _| {
        if sql.starts_with("SELECT") {
            Ok(QueryResult::rows(vec![json!({"id": 1, "name": "Alice"})]))
        } else {
            Ok(QueryResult::affected(1))
        }
    });
    let cache = QueryCache::builder(store.clone(), backend)
        .with_config(QueryCacheConfig::default().with_namespace(test_namespace("service")))
        .build();
    assert!(cache.cache().wait_ready(Duration::from_secs(5)).await);

    let sql = "SELECT * FROM users WHERE id = ?";
    cache
        .read(sql, &[json!(1)], ReadOptions::default())
        .await
        .expect("Failed to read");
    cache
        .read(sql, &[json!(1)], ReadOptions::default())
        .await
        .expect("Failed to read");
    assert_eq!(store.count_matching("SELECT"), 1);

    cache
        .write("UPDATE users SET name = ? WHERE id = ?", &[json!("Bob"), json!(1)], WriteOptions::default())
        .await
        .expect("Failed to write");
    cache
        .read(sql, &[json!(1)], ReadOptions::default())
        .await
        .expect("Failed to read");
    assert_eq!(store.count_matching("SELECT"), 2);

    cache.delete_by_prefix(&["*"]).await;
    cache.shutdown().await.expect("Failed to shut down");
    println!("✓ QueryCache read/write cycle over Redis");
}
