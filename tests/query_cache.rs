//! End-to-end behaviour of the public query cache facade

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forum_query_cache::cli::demo::{forum_threads, run_query};
use forum_query_cache::domain::cache::ManualClock;
use forum_query_cache::domain::query::Condition;
use forum_query_cache::infrastructure::cache::InMemoryStoreConfig;
use forum_query_cache::infrastructure::services::QueryCacheConfig;
use forum_query_cache::{
    CacheSettings, CacheStore, InMemoryStore, QueryCache, QueryOptions, ReadDescriptor,
    StoreConfig,
};
use serde_json::Value;

#[derive(Debug)]
struct DbError;

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "database unavailable")
    }
}

impl std::error::Error for DbError {}

async fn read_threads(
    cache: &QueryCache,
    calls: &AtomicUsize,
    descriptor: &ReadDescriptor,
    options: &QueryOptions,
) -> Vec<Value> {
    let records = forum_threads();

    cache
        .fetch("threads", descriptor, options, |filter, normalized| {
            calls.fetch_add(1, Ordering::SeqCst);
            let rows = run_query(&records, &filter, &normalized);
            async move { Ok::<_, DbError>(rows) }
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_read_through_then_invalidate() {
    let cache = QueryCache::open(&CacheSettings::default()).unwrap();
    let calls = AtomicUsize::new(0);
    let open = ReadDescriptor::new().with("status", Condition::eq("open"));
    let options = QueryOptions::new().with_sort("-createdAt");

    let first = read_threads(&cache, &calls, &open, &options).await;
    let second = read_threads(&cache, &calls, &open, &options).await;

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(cache.invalidate_namespace("threads").await, 1);

    read_threads(&cache, &calls, &open, &options).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    cache.close().await.unwrap();
}

#[tokio::test]
async fn test_disjunction_and_membership_agree() {
    let cache = QueryCache::open(&CacheSettings::default()).unwrap();
    let calls = AtomicUsize::new(0);
    let options = QueryOptions::new().with_sort("createdAt");

    let via_or = ReadDescriptor::new().with_any_of(vec![
        ReadDescriptor::new().with("status", Condition::eq("open")),
        ReadDescriptor::new().with("status", Condition::eq("pinned")),
    ]);
    let via_in = ReadDescriptor::new().with("status", Condition::is_in(["open", "pinned"]));

    let a = read_threads(&cache, &calls, &via_or, &options).await;
    let b = read_threads(&cache, &calls, &via_in, &options).await;

    assert_eq!(a, b);
    // distinct raw reads keep distinct keys
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_ne!(
        cache.derive_key("threads", &via_or, &options).unwrap(),
        cache.derive_key("threads", &via_in, &options).unwrap()
    );

    cache.close().await.unwrap();
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let clock = Arc::new(ManualClock::new(1_000));
    let store = Arc::new(InMemoryStore::with_clock(
        InMemoryStoreConfig::default().with_default_ttl(Duration::from_secs(60)),
        clock.clone(),
    ));
    let cache = QueryCache::with_store(store.clone(), QueryCacheConfig::default());
    let calls = AtomicUsize::new(0);
    let all = ReadDescriptor::new();
    let short = QueryOptions::new().with_ttl(5);

    read_threads(&cache, &calls, &all, &short).await;
    read_threads(&cache, &calls, &all, &QueryOptions::new()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    clock.advance(5_001);
    read_threads(&cache, &calls, &all, &short).await;
    read_threads(&cache, &calls, &all, &QueryOptions::new()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    clock.advance(60_000);
    read_threads(&cache, &calls, &all, &QueryOptions::new()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_executor_failure_reaches_caller() {
    let cache = QueryCache::open(&CacheSettings::default()).unwrap();

    let result = cache
        .fetch::<Vec<Value>, _, _, _>(
            "posts",
            &ReadDescriptor::new(),
            &QueryOptions::new(),
            |_, _| async { Err(DbError) },
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "database unavailable");
    assert_eq!(cache.store().len().await.unwrap(), 0);

    cache.close().await.unwrap();
}

#[tokio::test]
async fn test_bounded_store_evicts_least_recently_read() {
    let settings =
        CacheSettings::default().with_store(StoreConfig::in_memory().with_max_size(2));
    let cache = QueryCache::open(&settings).unwrap();
    let calls = AtomicUsize::new(0);
    let by_status = |status: &str| ReadDescriptor::new().with("status", Condition::eq(status));
    let options = QueryOptions::new();

    read_threads(&cache, &calls, &by_status("open"), &options).await;
    read_threads(&cache, &calls, &by_status("closed"), &options).await;
    read_threads(&cache, &calls, &by_status("open"), &options).await;
    read_threads(&cache, &calls, &by_status("pinned"), &options).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    read_threads(&cache, &calls, &by_status("open"), &options).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    read_threads(&cache, &calls, &by_status("closed"), &options).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    cache.close().await.unwrap();
}
