//! Call-result memoization with a dual expiry policy.
//!
//! A [`Memo`] wraps one logical operation. Entries are keyed by the
//! operation's arguments and recomputed when either their hit counter reaches
//! the configured ceiling or their age exceeds the TTL, whichever comes first.
//! Arguments that cannot serve as a key (see [`MemoKey`]) skip the cache and
//! always invoke the operation.
//!
//! Storage is a bounded `moka` cache, so expired entries are evicted and the
//! number of distinct keys never exceeds [`CachePolicy::capacity`].

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::ops::compute::Op;
use serde_json::Value;
use tokio::time::Instant;

const DEFAULT_MAX_HITS: u32 = 8;
const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_CAPACITY: u64 = 10_000;

/// Expiry policy for a [`Memo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Served hits before the entry is recomputed. `None` disables the count ceiling.
    pub max_hits: Option<u32>,
    /// Maximum age of an entry.
    pub ttl: Duration,
    /// Maximum number of distinct keys kept at once.
    pub capacity: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_hits: Some(DEFAULT_MAX_HITS),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl CachePolicy {
    /// Default ceiling with a custom TTL in seconds.
    pub fn with_ttl_secs(secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(secs),
            ..Self::default()
        }
    }

    /// Drop the hit ceiling; only the TTL expires entries.
    pub fn unbounded_hits(mut self) -> Self {
        self.max_hits = None;
        self
    }

    pub fn max_hits(mut self, n: u32) -> Self {
        self.max_hits = Some(n);
        self
    }

    pub fn capacity(mut self, n: u64) -> Self {
        self.capacity = n;
        self
    }

    fn exhausted(&self, hits: u32) -> bool {
        self.max_hits.map_or(false, |max| hits >= max)
    }
}

struct Slot<V> {
    value: V,
    computed_at: Instant,
    hits: AtomicU32,
}

impl<V> Slot<V> {
    fn fresh(value: V) -> Self {
        Self {
            value,
            computed_at: Instant::now(),
            hits: AtomicU32::new(1),
        }
    }

    fn is_stale(&self, policy: &CachePolicy, now: Instant) -> bool {
        policy.exhausted(self.hits.load(Ordering::SeqCst))
            || now.saturating_duration_since(self.computed_at) > policy.ttl
    }
}

/// Memoizing wrapper around one operation.
///
/// Concurrent callers for the same arguments share a single computation
/// while distinct keys proceed in parallel. The age check runs on the tokio
/// clock in addition to the cache's own time-to-live, so paused-time tests
/// see the same expiry as production.
pub struct Memo<K, V> {
    policy: CachePolicy,
    cache: Cache<K, Arc<Slot<V>>>,
}

impl<K, V> Memo<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(policy: CachePolicy) -> Self {
        let cache = Cache::builder()
            .max_capacity(policy.capacity)
            .time_to_live(policy.ttl)
            .build();
        Self { policy, cache }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Return the memoized value for `key`, computing it when absent or stale.
    /// A `None` key bypasses the cache entirely.
    pub async fn get_or_compute<F, Fut>(&self, key: Option<K>, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let key = match key {
            Some(k) => k,
            None => return compute().await,
        };

        if let Some(slot) = self.cache.get(&key).await {
            if !slot.is_stale(&self.policy, Instant::now()) {
                return self.serve(key, slot).await;
            }
            self.evict_if_current(key.clone(), &slot).await;
        }

        let entry = self
            .cache
            .entry(key.clone())
            .or_insert_with(async move { Arc::new(Slot::fresh(compute().await)) })
            .await;
        if entry.is_fresh() {
            return entry.into_value().value.clone();
        }
        // Another caller computed it while we waited.
        self.serve(key, entry.into_value()).await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), deriving the key from `args`.
    pub async fn call<A, F, Fut>(&self, args: &A, compute: F) -> V
    where
        A: MemoKey<Key = K> + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.get_or_compute(args.memo_key(), compute).await
    }

    /// Drop the entry for `args` so the next call recomputes it.
    pub async fn forget<A>(&self, args: &A)
    where
        A: MemoKey<Key = K> + ?Sized,
    {
        if let Some(key) = args.memo_key() {
            self.cache.invalidate(&key).await;
        }
    }

    /// Number of live entries, after pending evictions have been applied.
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    async fn serve(&self, key: K, slot: Arc<Slot<V>>) -> V {
        let hits = slot.hits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.policy.exhausted(hits) {
            self.evict_if_current(key, &slot).await;
        }
        slot.value.clone()
    }

    /// Remove `key` only while it still maps to `slot`; a replacement
    /// computed by another caller is kept.
    async fn evict_if_current(&self, key: K, slot: &Arc<Slot<V>>) {
        self.cache
            .entry(key)
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) if Arc::ptr_eq(entry.value(), slot) => Op::Remove,
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
    }
}

impl<K, V> Default for Memo<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

/// Converts call arguments into a cache key.
///
/// Returning `None` marks the arguments as unusable for lookup (unordered or
/// unhashable collections such as JSON objects); the call then bypasses the
/// cache instead of failing.
pub trait MemoKey {
    type Key: Hash + Eq;

    fn memo_key(&self) -> Option<Self::Key>;
}

impl MemoKey for () {
    type Key = ();

    fn memo_key(&self) -> Option<()> {
        Some(())
    }
}

impl MemoKey for str {
    type Key = String;

    fn memo_key(&self) -> Option<String> {
        Some(self.to_owned())
    }
}

impl MemoKey for String {
    type Key = String;

    fn memo_key(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl MemoKey for u32 {
    type Key = u32;

    fn memo_key(&self) -> Option<u32> {
        Some(*self)
    }
}

impl MemoKey for u64 {
    type Key = u64;

    fn memo_key(&self) -> Option<u64> {
        Some(*self)
    }
}

impl MemoKey for bool {
    type Key = bool;

    fn memo_key(&self) -> Option<bool> {
        Some(*self)
    }
}

impl<T: MemoKey + ?Sized> MemoKey for &T {
    type Key = T::Key;

    fn memo_key(&self) -> Option<T::Key> {
        (**self).memo_key()
    }
}

impl<T: MemoKey> MemoKey for Option<T> {
    type Key = Option<T::Key>;

    fn memo_key(&self) -> Option<Self::Key> {
        match self {
            None => Some(None),
            Some(inner) => inner.memo_key().map(Some),
        }
    }
}

impl<T: MemoKey> MemoKey for [T] {
    type Key = Vec<T::Key>;

    fn memo_key(&self) -> Option<Self::Key> {
        self.iter().map(MemoKey::memo_key).collect()
    }
}

impl<T: MemoKey> MemoKey for Vec<T> {
    type Key = Vec<T::Key>;

    fn memo_key(&self) -> Option<Self::Key> {
        self.as_slice().memo_key()
    }
}

impl<A: MemoKey, B: MemoKey> MemoKey for (A, B) {
    type Key = (A::Key, B::Key);

    fn memo_key(&self) -> Option<Self::Key> {
        Some((self.0.memo_key()?, self.1.memo_key()?))
    }
}

/// Scalars key by their canonical JSON text; objects and arrays are unhashable.
impl MemoKey for Value {
    type Key = String;

    fn memo_key(&self) -> Option<String> {
        match self {
            Value::Object(_) | Value::Array(_) => None,
            scalar => Some(scalar.to_string()),
        }
    }
}
