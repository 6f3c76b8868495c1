//! Process-local TTL cache for collection results
//!
//! Entries expire lazily: a read past the entry's ttl removes it and reports
//! a miss. There is no background sweeper and nothing is persisted.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::CollectionResult;

/// Source of "now" for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(by) = chrono::Duration::from_std(by) {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One cached collection
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: CollectionResult<T>,
    pub timestamp: DateTime<Utc>,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match (now - self.timestamp).to_std() {
            Ok(age) => age < self.ttl,
            // timestamp ahead of now (clock moved backwards)
            Err(_) => true,
        }
    }
}

/// TTL store keyed by collection name
pub struct CacheLayer<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl<T: Clone> CacheLayer<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Cached result for `key`, purging it when stale
    pub fn get(&self, key: &str) -> Option<CollectionResult<T>> {
        let now = self.clock.now();
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => {
                tracing::debug!("Cache hit for {}", key);
                Some(entry.payload.clone())
            }
            Some(_) => {
                tracing::debug!("Cache entry expired for {}", key);
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` under `key`, replacing any existing entry
    pub fn set(&self, key: &str, value: CollectionResult<T>, ttl: Duration) {
        let entry = CacheEntry {
            key: key.to_string(),
            payload: value,
            timestamp: self.clock.now(),
            ttl,
        };
        self.lock().insert(key.to_string(), entry);
    }

    /// Return the cached value, or run `collect` and cache its result.
    ///
    /// `force_refresh` skips the lookup but still stores the fresh result.
    pub async fn get_or_collect<F, Fut>(
        &self,
        key: &str,
        force_refresh: bool,
        collect: F,
    ) -> CollectionResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CollectionResult<T>>,
    {
        if !force_refresh {
            if let Some(cached) = self.get(key) {
                return cached;
            }
        }

        let fresh = collect().await;
        self.set(key, fresh.clone(), self.default_ttl);
        fresh
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, fresh or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }
}
