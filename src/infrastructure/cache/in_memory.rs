//! In-process bounded cache store

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use validator::Validate;

use crate::domain::cache::{CacheStore, Clock, SystemClock};
use crate::domain::DomainError;
use crate::infrastructure::observability::record_eviction;

/// Configuration for the in-process store
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(default)]
pub struct InMemoryStoreConfig {
    /// TTL applied when a write does not carry one
    #[validate(range(min = 1))]
    pub default_ttl_ms: u64,
    /// Maximum number of entries
    #[validate(range(min = 1))]
    pub max_size: usize,
    /// Period of the background expiry sweep
    #[validate(range(min = 1))]
    pub cleanup_interval_ms: u64,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 3_600_000, // 1 hour
            max_size: 100,
            cleanup_interval_ms: 300_000, // 5 minutes
        }
    }
}

impl InMemoryStoreConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_cleanup_interval(mut self, every: Duration) -> Self {
        self.cleanup_interval_ms = every.as_millis() as u64;
        self
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    expires_at: u64,
    last_accessed_at: u64,
    /// Breaks ties between accesses within the same millisecond
    access_seq: u64,
}

impl CacheEntry {
    fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, CacheEntry>,
    seq: u64,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn remove_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before - self.entries.len()
    }

    fn least_recently_accessed(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_accessed_at, entry.access_seq))
            .map(|(key, _)| key.clone())
    }
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    config: InMemoryStoreConfig,
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, State>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::cache("Failed to acquire lock"))
    }

    fn sweep(&self) -> Result<usize, DomainError> {
        let now = self.clock.now_millis();
        Ok(self.lock()?.remove_expired(now))
    }
}

#[derive(Debug)]
struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Bounded in-process store
///
/// Features:
/// - TTL per entry, expired entries are dropped on access and by a periodic sweep
/// - Least-recently-accessed eviction once `max_size` is reached
/// - All mutation serialized behind a single mutex, never held across an await
#[derive(Debug)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl InMemoryStore {
    /// Creates a store with default configuration and no background sweep
    pub fn new() -> Self {
        Self::with_config(InMemoryStoreConfig::default())
    }

    /// Creates a store without a background sweep; expiry happens on access
    pub fn with_config(config: InMemoryStoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a store driven by the given clock
    pub fn with_clock(config: InMemoryStoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                clock,
                config,
            }),
            sweeper: Mutex::new(None),
        }
    }

    /// Creates a store and starts its background sweep
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: InMemoryStoreConfig) -> Self {
        let store = Self::with_config(config);
        store.start_sweeper();
        store
    }

    /// Starts the background sweep if it is not already running
    pub fn start_sweeper(&self) {
        let Ok(mut sweeper) = self.sweeper.lock() else {
            tracing::warn!("Sweeper lock poisoned, background sweep not started");
            return;
        };

        if sweeper.is_some() {
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sweep_task(
            Arc::downgrade(&self.inner),
            self.inner.config.cleanup_interval(),
            shutdown_rx,
        ));

        *sweeper = Some(Sweeper { shutdown, handle });
    }

    /// Stops the background sweep; the stored entries stay readable
    pub async fn stop_sweeper(&self) {
        let sweeper = match self.sweeper.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };

        if let Some(sweeper) = sweeper {
            let _ = sweeper.shutdown.send(true);

            if let Err(e) = sweeper.handle.await {
                tracing::warn!(error = %e, "Cache sweep task ended abnormally");
            }
        }
    }

    /// Returns true while the background sweep is running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|s| !s.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Removes every expired entry now, returning how many were dropped
    pub fn purge_expired(&self) -> Result<usize, DomainError> {
        self.inner.sweep()
    }

    pub fn config(&self) -> &InMemoryStoreConfig {
        &self.inner.config
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryStore {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(sweeper) = guard.take() {
                sweeper.handle.abort();
            }
        }
    }
}

async fn sweep_task(
    inner: Weak<Inner>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(interval_ms = every.as_millis() as u64, "Cache sweep task started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };

                match inner.sweep() {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Swept expired cache entries"),
                    Err(e) => tracing::warn!(error = %e, "Cache sweep failed"),
                }
            }
        }
    }

    tracing::debug!("Cache sweep task stopped");
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, DomainError> {
        let now = self.inner.clock.now_millis();
        let mut state = self.inner.lock()?;

        match state.entries.get(key) {
            Some(entry) if !entry.is_live(now) => {
                state.entries.remove(key);
                Ok(None)
            }
            Some(_) => {
                let seq = state.next_seq();
                let Some(entry) = state.entries.get_mut(key) else {
                    return Ok(None);
                };

                entry.last_accessed_at = now;
                entry.access_seq = seq;
                Ok(Some(entry.value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), DomainError> {
        let now = self.inner.clock.now_millis();
        let ttl_ms = ttl
            .map(|ttl| ttl.as_millis() as u64)
            .unwrap_or(self.inner.config.default_ttl_ms);

        let mut state = self.inner.lock()?;

        if !state.entries.contains_key(key) && state.entries.len() >= self.inner.config.max_size {
            state.remove_expired(now);

            while state.entries.len() >= self.inner.config.max_size {
                let Some(victim) = state.least_recently_accessed() else {
                    break;
                };

                state.entries.remove(&victim);
                record_eviction();
                tracing::debug!(key = %victim, "Evicted least recently accessed entry");
            }
        }

        let seq = state.next_seq();
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now.saturating_add(ttl_ms),
                last_accessed_at: now,
                access_seq: seq,
            },
        );

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let now = self.inner.clock.now_millis();
        let mut state = self.inner.lock()?;

        Ok(state
            .entries
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, DomainError> {
        let now = self.inner.clock.now_millis();
        let mut state = self.inner.lock()?;

        let mut removed = 0;
        state.entries.retain(|key, entry| {
            if key.starts_with(prefix) {
                if entry.is_live(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });

        Ok(removed)
    }

    async fn len(&self) -> Result<usize, DomainError> {
        let now = self.inner.clock.now_millis();
        let mut state = self.inner.lock()?;

        state.remove_expired(now);
        Ok(state.entries.len())
    }

    async fn close(&self) -> Result<(), DomainError> {
        self.stop_sweeper().await;
        Ok(())
    }
}
