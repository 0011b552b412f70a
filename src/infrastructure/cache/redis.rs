//! Redis-backed cache store

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::Deserialize;
use validator::Validate;

use crate::domain::cache::CacheStore;
use crate::domain::DomainError;
use crate::infrastructure::observability::record_store_error;

/// Configuration for the Redis store
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// TTL applied when a write does not carry one
    #[validate(range(min = 1))]
    pub default_ttl_secs: u64,
    /// Key prefix for sharing one Redis database between applications
    pub key_prefix: Option<String>,
    /// Connection timeout; also the pause before retrying a failed connection
    #[validate(range(min = 1))]
    pub connection_timeout_ms: u64,
    /// Upper bound on a single command round trip
    #[validate(range(min = 1))]
    pub response_timeout_ms: u64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            default_ttl_secs: 3600,
            key_prefix: None,
            connection_timeout_ms: 5_000,
            response_timeout_ms: 1_000,
        }
    }
}

impl RedisStoreConfig {
    /// Creates a new configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the default TTL
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ttl.as_secs().max(1);
        self
    }

    /// Sets the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Sets the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the per-command response timeout
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

/// Redis store
///
/// The connection is opened on first use and reused afterwards; the
/// `ConnectionManager` reconnects on its own once established. Transport
/// failures on reads and writes are logged and surface as a miss or a no-op,
/// so an unreachable Redis never fails a read.
///
/// No lock is held while connecting or waiting on a reply. After a failed
/// connect or a timed-out command the store reports itself unavailable
/// without touching the network for `connection_timeout_ms`.
pub struct RedisStore {
    client: Client,
    state: Mutex<ConnectionState>,
    config: RedisStoreConfig,
}

#[derive(Default)]
struct ConnectionState {
    connection: Option<ConnectionManager>,
    failed_at: Option<Instant>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStore {
    /// Creates a Redis store; fails only on an invalid URL
    pub fn new(config: RedisStoreConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            DomainError::configuration(format!("Invalid Redis URL '{}': {}", config.url, e))
        })?;

        Ok(Self {
            client,
            state: Mutex::new(ConnectionState::default()),
            config,
        })
    }

    /// Creates a Redis store with default configuration
    pub fn with_url(url: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(RedisStoreConfig::new(url))
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    fn state(&self) -> Result<MutexGuard<'_, ConnectionState>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::store_unavailable("Redis connection state poisoned"))
    }

    fn retry_after(&self) -> Duration {
        Duration::from_millis(self.config.connection_timeout_ms)
    }

    /// Returns the shared connection, opening it if needed
    async fn connection(&self) -> Result<ConnectionManager, DomainError> {
        {
            let state = self.state()?;

            if let Some(failed_at) = state.failed_at {
                if failed_at.elapsed() < self.retry_after() {
                    return Err(DomainError::store_unavailable(
                        "Redis marked unavailable after a recent failure",
                    ));
                }
            }

            if let Some(connection) = state.connection.as_ref() {
                return Ok(connection.clone());
            }
        }

        let timeout = Duration::from_millis(self.config.connection_timeout_ms);
        let connection =
            match tokio::time::timeout(timeout, ConnectionManager::new(self.client.clone())).await {
                Ok(Ok(connection)) => connection,
                Ok(Err(e)) => {
                    return Err(self.mark_failed(DomainError::store_unavailable(format!(
                        "Failed to connect to Redis: {}",
                        e
                    ))));
                }
                Err(_) => {
                    return Err(self.mark_failed(DomainError::store_unavailable(format!(
                        "Timed out connecting to Redis after {}ms",
                        self.config.connection_timeout_ms
                    ))));
                }
            };

        let mut state = self.state()?;
        state.failed_at = None;

        // a concurrent caller may have connected first
        if let Some(existing) = state.connection.as_ref() {
            return Ok(existing.clone());
        }

        tracing::info!(url = %self.config.url, "Connected to Redis cache store");
        state.connection = Some(connection.clone());
        Ok(connection)
    }

    fn mark_failed(&self, error: DomainError) -> DomainError {
        if let Ok(mut state) = self.state.lock() {
            state.failed_at = Some(Instant::now());
        }
        error
    }

    /// Runs one command against the shared connection, bounded by the response timeout
    async fn command<T, F, Fut>(&self, name: &'static str, run: F) -> Result<T, DomainError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.connection().await?;
        let timeout = Duration::from_millis(self.config.response_timeout_ms);

        match tokio::time::timeout(timeout, run(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DomainError::store_unavailable(format!("{} failed: {}", name, e))),
            Err(_) => Err(self.mark_failed(DomainError::store_unavailable(format!(
                "{} timed out after {}ms",
                name, self.config.response_timeout_ms
            )))),
        }
    }

    fn prefix_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn ttl_secs(&self, ttl: Option<Duration>) -> u64 {
        match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
                secs.max(1)
            }
            None => self.config.default_ttl_secs.max(1),
        }
    }

    fn degrade(operation: &'static str, key: &str, error: &DomainError) {
        record_store_error(operation);
        tracing::warn!(operation, key = %key, error = %error, "Redis store unavailable, bypassing cache");
    }

    async fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>, DomainError> {
        let key = self.prefix_key(key);

        self.command("GET", |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn try_set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), DomainError> {
        let key = self.prefix_key(key);

        self.command("SET", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
        })
        .await
    }

    async fn try_delete(&self, key: &str) -> Result<bool, DomainError> {
        let key = self.prefix_key(key);

        let deleted: i64 = self
            .command("DEL", |mut conn| async move { conn.del(key).await })
            .await?;

        Ok(deleted > 0)
    }

    async fn scan_and_delete(&self, pattern: &str) -> Result<usize, DomainError> {
        // SCAN rather than KEYS so a large keyspace never blocks the server
        let mut cursor = 0u64;
        let mut total_deleted = 0usize;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = self
                .command("SCAN", |mut conn| async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let deleted: i64 = self
                    .command("DEL", |mut conn| async move { conn.del(&keys).await })
                    .await?;
                total_deleted += deleted as usize;
            }

            cursor = new_cursor;

            if cursor == 0 {
                break;
            }
        }

        Ok(total_deleted)
    }
}

/// Escapes glob metacharacters so a literal prefix can be used with SCAN MATCH
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());

    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, DomainError> {
        match self.try_get(key).await {
            Ok(value) => Ok(value.map(Bytes::from)),
            Err(e) => {
                Self::degrade("get", key, &e);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), DomainError> {
        if let Err(e) = self.try_set(key, &value, self.ttl_secs(ttl)).await {
            Self::degrade("set", key, &e);
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        match self.try_delete(key).await {
            Ok(deleted) => Ok(deleted),
            Err(e) => {
                Self::degrade("delete", key, &e);
                Ok(false)
            }
        }
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, DomainError> {
        let pattern = format!("{}*", escape_glob(&self.prefix_key(prefix)));

        self.scan_and_delete(&pattern).await.inspect_err(|_| {
            record_store_error("delete_by_prefix");
        })
    }

    async fn len(&self) -> Result<usize, DomainError> {
        let Some(prefix) = &self.config.key_prefix else {
            return self
                .command("DBSIZE", |mut conn| async move {
                    redis::cmd("DBSIZE").query_async(&mut conn).await
                })
                .await;
        };

        let pattern = format!("{}*", escape_glob(&format!("{}:", prefix)));
        let mut cursor = 0u64;
        let mut count = 0usize;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = self
                .command("SCAN", |mut conn| {
                    let pattern = pattern.clone();
                    async move {
                        redis::cmd("SCAN")
                            .arg(cursor)
                            .arg("MATCH")
                            .arg(pattern)
                            .arg("COUNT")
                            .arg(1000)
                            .query_async(&mut conn)
                            .await
                    }
                })
                .await?;

            count += keys.len();
            cursor = new_cursor;

            if cursor == 0 {
                break;
            }
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures::future::join_all;

    // Tests marked ignored need a Redis server on localhost:6379

    fn get_test_config() -> RedisStoreConfig {
        RedisStoreConfig::new("redis://127.0.0.1:6379")
            .with_key_prefix("forum-query-cache-test")
            .with_default_ttl(Duration::from_secs(60))
    }

    fn unreachable_store() -> RedisStore {
        RedisStore::new(
            RedisStoreConfig::new("redis://127.0.0.1:1")
                .with_connection_timeout(Duration::from_millis(200)),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let result = RedisStore::with_url("not a url");
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("threads:"), "threads:");
        assert_eq!(
            escape_glob(r#"q:{"tags":["a*"]}"#),
            r#"q:{"tags":\["a\*"\]}"#
        );
    }

    #[test]
    fn test_ttl_rounds_up_to_whole_seconds() {
        let store = RedisStore::new(RedisStoreConfig::default()).unwrap();

        assert_eq!(store.ttl_secs(Some(Duration::from_millis(1))), 1);
        assert_eq!(store.ttl_secs(Some(Duration::from_millis(1500))), 2);
        assert_eq!(store.ttl_secs(Some(Duration::from_secs(30))), 30);
        assert_eq!(store.ttl_secs(None), 3600);
    }

    #[test]
    fn test_key_prefix() {
        let store = RedisStore::new(get_test_config()).unwrap();
        assert_eq!(store.prefix_key("threads:{}:{}"), "forum-query-cache-test:threads:{}:{}");
    }

    #[tokio::test]
    async fn test_unreachable_server_degrades_to_miss() {
        let store = unreachable_store();

        assert_eq!(store.get("threads:{}:{}").await.unwrap(), None);
        store
            .set("threads:{}:{}", Bytes::from_static(b"[]"), None)
            .await
            .unwrap();
        assert!(!store.delete("threads:{}:{}").await.unwrap());
        assert!(store.delete_by_prefix("threads:").await.is_err());
    }

    /// Accepts connections and never answers
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        (format!("redis://{}", addr), handle)
    }

    fn silent_store(url: String, timeout: Duration) -> RedisStore {
        RedisStore::new(
            RedisStoreConfig::new(url)
                .with_connection_timeout(timeout)
                .with_response_timeout(timeout),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_silent_server_does_not_queue_callers() {
        let (url, server) = silent_server().await;
        let store = Arc::new(silent_store(url, Duration::from_millis(300)));
        let started = Instant::now();

        let results = join_all((0..8).map(|_| {
            let store = store.clone();
            async move {
                let value = store.get("threads:{}:{}").await;
                store
                    .set("threads:{}:{}", Bytes::from_static(b"[7]"), None)
                    .await
                    .unwrap();
                value
            }
        }))
        .await;

        for result in results {
            assert_eq!(result.unwrap(), None);
        }
        // one timeout shared by all callers, not one per caller and operation
        assert!(started.elapsed() < Duration::from_millis(1500));

        server.abort();
    }

    #[tokio::test]
    async fn test_failure_is_not_retried_within_cooldown() {
        let (url, server) = silent_server().await;
        let store = silent_store(url, Duration::from_millis(400));

        assert!(store.try_get("threads:{}:{}").await.is_err());

        let started = Instant::now();
        let err = store.try_get("threads:{}:{}").await.unwrap_err();

        assert!(err.is_store_failure());
        assert!(started.elapsed() < Duration::from_millis(100));

        server.abort();
    }

    #[test]
    fn test_response_timeout_config() {
        let config = RedisStoreConfig::default().with_response_timeout(Duration::from_millis(250));
        assert_eq!(config.response_timeout_ms, 250);
        assert!(config.validate().is_ok());
        assert!(RedisStoreConfig { response_timeout_ms: 0, ..config }.validate().is_err());
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_set_and_get() {
        let store = RedisStore::new(get_test_config()).unwrap();

        store
            .set("key1", Bytes::from_static(b"value1"), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(
            store.get("key1").await.unwrap(),
            Some(Bytes::from_static(b"value1"))
        );

        // Cleanup
        store.delete("key1").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_delete_by_prefix() {
        let store = RedisStore::new(get_test_config()).unwrap();

        for key in ["threads:{\"a\":[1]}:{}", "threads:{}:{}", "posts:{}:{}"] {
            store
                .set(key, Bytes::from_static(b"1"), None)
                .await
                .unwrap();
        }

        let deleted = store.delete_by_prefix("threads:").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get("posts:{}:{}").await.unwrap().is_some());

        // Cleanup
        store.delete("posts:{}:{}").await.unwrap();
    }
}
