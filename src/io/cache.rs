//! Keyed cache with namespacing, format versioning, TTL and transactions
//!
//! `Cache` is the contract the engine needs from a storage backend.
//! `MemoryStore` + `ScopedCache` is the in-process implementation:
//! - keys are prefixed with `{namespace}:v{version}:` so destinations never
//!   collide and a version bump orphans stale formats
//! - `begin(scope)` takes an async mutex for that scope and buffers writes
//!   until `commit`, which applies them under one store lock

use crate::error::CacheError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Storage contract consumed by the engine
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value; `Duration::ZERO` means no expiry
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Open a mutually exclusive transaction for `scope`.
    ///
    /// Holders of the same scope are serialized until the returned handle is
    /// committed or dropped. Dropping without commit discards buffered writes.
    async fn begin<'a>(&'a self, scope: &str) -> Result<Box<dyn CacheTransaction + 'a>, CacheError>;
}

/// Transaction-scoped cache handle
#[async_trait]
pub trait CacheTransaction: Send {
    /// Read through this transaction's pending writes
    async fn get(&mut self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&mut self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Apply every buffered write atomically and release the scope
    async fn commit(self: Box<Self>) -> Result<(), CacheError>;
}

/// Read-through memoization: return the cached value under `key`, or run
/// `fetch`, store its result with `ttl`, and return it.
pub async fn wrap<T, E, F, Fut>(cache: &dyn Cache, key: &str, ttl: Duration, fetch: F) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    E: From<CacheError> + From<serde_json::Error>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(hit) = cache.get(key).await? {
        trace!(key = %key, "cache_hit");
        return Ok(serde_json::from_value(hit)?);
    }

    trace!(key = %key, "cache_miss");
    let value = fetch().await?;
    cache.set(key, serde_json::to_value(&value)?, ttl).await?;
    Ok(value)
}

struct StoredEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        // Beyond the clock's range is as good as never
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        Self { value, expires_at }
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Shared in-process key-value store backing any number of scoped caches
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<FxHashMap<String, StoredEntry>>,
    scope_locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Keys written since creation (monotonic)
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key)?.is_expired(now) {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    fn set_many(&self, writes: Vec<(String, Value, Duration)>) {
        let mut entries = self.entries.lock();
        for (key, value, ttl) in writes {
            self.writes.fetch_add(1, Ordering::Relaxed);
            entries.insert(key, StoredEntry::new(value, ttl));
        }
    }

    fn scope_lock(&self, scope: String) -> Arc<tokio::sync::Mutex<()>> {
        self.scope_locks.lock().entry(scope).or_default().clone()
    }

    fn is_scope_locked(&self, scope: &str) -> bool {
        self.scope_locks.lock().get(scope).is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Drop every expired entry, returning how many were removed.
    ///
    /// Scope locks no transaction holds or waits on are released too.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            before - entries.len()
        };

        // Holders and waiters keep their own clone, so a count of 1 is idle
        self.scope_locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
        removed
    }

    #[cfg(test)]
    fn scope_lock_count(&self) -> usize {
        self.scope_locks.lock().len()
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total keys written through `set` or committed transactions
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

/// A namespaced, versioned view of a `MemoryStore`
#[derive(Clone)]
pub struct ScopedCache {
    store: Arc<MemoryStore>,
    prefix: String,
}

impl ScopedCache {
    pub fn new(store: Arc<MemoryStore>, namespace: &str, version: u32) -> Self {
        Self { store, prefix: format!("{namespace}:v{version}:") }
    }

    #[inline]
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Whether a transaction currently holds `scope`
    pub fn is_locked(&self, scope: &str) -> bool {
        self.store.is_scope_locked(&self.full_key(scope))
    }
}

#[async_trait]
impl Cache for ScopedCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.store.get(&self.full_key(key)))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.store.set_many(vec![(self.full_key(key), value, ttl)]);
        Ok(())
    }

    async fn begin<'a>(&'a self, scope: &str) -> Result<Box<dyn CacheTransaction + 'a>, CacheError> {
        let scope = self.full_key(scope);
        let guard = self.store.scope_lock(scope.clone()).lock_owned().await;
        debug!(scope = %scope, "cache_transaction_begin");
        Ok(Box::new(MemoryTransaction { cache: self, scope, _guard: guard, writes: Vec::new() }))
    }
}

struct MemoryTransaction<'a> {
    cache: &'a ScopedCache,
    scope: String,
    _guard: OwnedMutexGuard<()>,
    writes: Vec<(String, Value, Duration)>,
}

#[async_trait]
impl CacheTransaction for MemoryTransaction<'_> {
    async fn get(&mut self, key: &str) -> Result<Option<Value>, CacheError> {
        let full_key = self.cache.full_key(key);
        if let Some((_, value, _)) = self.writes.iter().rev().find(|(k, _, _)| *k == full_key) {
            return Ok(Some(value.clone()));
        }
        Ok(self.cache.store.get(&full_key))
    }

    async fn set(&mut self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.writes.push((self.cache.full_key(key), value, ttl));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), CacheError> {
        let this = *self;
        let count = this.writes.len();
        this.cache.store.set_many(this.writes);
        debug!(scope = %this.scope, writes = %count, "cache_transaction_commit");
        Ok(())
    }
}
