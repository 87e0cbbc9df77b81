//! TTL-indexed lookup cache with single-flight resolution.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::CacheError;

/// What a producer hands back to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fill<V> {
    /// Cache the value for `ttl` and return it.
    Store { value: V, ttl: Duration },
    /// Return the value to every waiter without caching it.
    Skip(V),
}

impl<V> Fill<V> {
    pub fn value(&self) -> &V {
        match self {
            Self::Store { value, .. } | Self::Skip(value) => value,
        }
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A live cache entry; no producer ran.
    Cache,
    /// This caller started the producer.
    Leader,
    /// This caller joined a producer already in flight.
    Joined,
}

impl Origin {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cache)
    }
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    last_access: u64,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    in_flight: HashMap<K, watch::Receiver<Option<V>>>,
    access_clock: u64,
}

/// TTL cache owned by one component and shared through cheap clones.
///
/// - Entries expire by TTL only; an expired entry is treated as absent and
///   removed on the next touch.
/// - Each entry carries its own TTL, so negative results can live shorter
///   than positive ones.
/// - With `max_entries > 0`, inserting past the bound evicts expired entries
///   first, then the least recently accessed one.
/// - [`resolve_single_flight`](Self::resolve_single_flight) runs at most one
///   producer per key at a time. The producer runs on its own task, so a
///   waiter that stops waiting never cancels it for the others.
pub struct LookupCache<K, V> {
    state: Arc<Mutex<State<K, V>>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<K, V> Clone for LookupCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            default_ttl: self.default_ttl,
            max_entries: self.max_entries,
        }
    }
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// `default_ttl` applies to [`put`](Self::put); `max_entries == 0` means unbounded.
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                access_clock: 0,
            })),
            default_ttl,
            max_entries,
        }
    }

    // ── Plain access ──

    /// Live value for `key`, or `None` when never stored or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        state.lookup(key, Instant::now())
    }

    /// Overwrite `key` with the default TTL.
    pub fn put(&self, key: K, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    /// Overwrite `key`; the entry's age restarts at zero.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut state = self.state.lock();
        state.insert(key, value, ttl, self.max_entries, Instant::now());
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.state.lock().entries.remove(key).is_some()
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    // ── Single flight ──

    /// Return the cached value for `key`, or run `producer` to compute it.
    ///
    /// Concurrent callers for the same key share one producer run and all
    /// observe its value. The cache write (for [`Fill::Store`]) and the
    /// in-flight removal happen under one lock before waiters are woken, so a
    /// caller arriving afterwards hits the cache.
    pub async fn resolve_single_flight<F, Fut>(
        &self,
        key: K,
        producer: F,
    ) -> Result<(V, Origin), CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Fill<V>> + Send + 'static,
    {
        let (mut rx, leader_tx) = {
            let mut state = self.state.lock();
            if let Some(value) = state.lookup(&key, Instant::now()) {
                debug!(key = ?key, "cache hit");
                return Ok((value, Origin::Cache));
            }
            match state.in_flight.get(&key) {
                Some(rx) => {
                    debug!(key = ?key, "joining in-flight resolution");
                    (rx.clone(), None)
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    state.in_flight.insert(key.clone(), rx.clone());
                    (rx, Some(tx))
                }
            }
        };

        let origin = match leader_tx {
            Some(tx) => {
                debug!(key = ?key, "cache miss, starting resolution");
                self.spawn_flight(key, tx, producer());
                Origin::Leader
            }
            None => Origin::Joined,
        };

        let published = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CacheError::FlightAborted)?;
        match published.as_ref() {
            Some(value) => Ok((value.clone(), origin)),
            None => Err(CacheError::FlightAborted),
        }
    }

    fn spawn_flight<Fut>(&self, key: K, tx: watch::Sender<Option<V>>, fut: Fut)
    where
        Fut: Future<Output = Fill<V>> + Send + 'static,
    {
        let cache = self.clone();
        tokio::spawn(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(fill) => {
                    let value = cache.settle(&key, fill);
                    // Every receiver may already be gone.
                    let _ = tx.send(Some(value));
                }
                Err(_) => {
                    error!(key = ?key, "resolution producer panicked");
                    cache.state.lock().in_flight.remove(&key);
                }
            }
        });
    }

    fn settle(&self, key: &K, fill: Fill<V>) -> V {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        match fill {
            Fill::Store { value, ttl } => {
                state.insert(key.clone(), value.clone(), ttl, self.max_entries, Instant::now());
                value
            }
            Fill::Skip(value) => value,
        }
    }
}

impl<K, V> State<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn tick(&mut self) -> u64 {
        self.access_clock += 1;
        self.access_clock
    }

    fn lookup(&mut self, key: &K, now: Instant) -> Option<V> {
        if !self.entries.get(key)?.is_live(now) {
            self.entries.remove(key);
            return None;
        }
        let tick = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_access = tick;
        Some(entry.value.clone())
    }

    fn insert(&mut self, key: K, value: V, ttl: Duration, max_entries: usize, now: Instant) {
        if max_entries > 0 && !self.entries.contains_key(&key) && self.entries.len() >= max_entries {
            self.purge_expired(now);
            while self.entries.len() >= max_entries {
                let Some(victim) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_access)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                debug!(key = ?victim, "evicting least recently used entry");
                self.entries.remove(&victim);
            }
        }

        let last_access = self.tick();
        self.entries.insert(
            key,
            Entry {
                value,
                stored_at: now,
                ttl,
                last_access,
            },
        );
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    fn cache(max_entries: usize) -> LookupCache<String, u32> {
        LookupCache::new(HOUR, max_entries)
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let c = cache(0);
        c.put("a".into(), 1);
        assert_eq!(c.get(&"a".into()), Some(1));

        tokio::time::advance(HOUR - Duration::from_secs(1)).await;
        assert_eq!(c.get(&"a".into()), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(c.get(&"a".into()), None);
        assert!(c.is_empty(), "expired entry should be dropped on touch");
    }

    #[tokio::test(start_paused = true)]
    async fn put_overwrites_and_resets_age() {
        let c = cache(0);
        c.put("a".into(), 1);
        tokio::time::advance(HOUR / 2).await;
        c.put("a".into(), 2);
        tokio::time::advance(HOUR / 2 + Duration::from_secs(1)).await;
        assert_eq!(c.get(&"a".into()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn per_entry_ttl() {
        let c = cache(0);
        c.put_with_ttl("neg".into(), 0, Duration::from_secs(60));
        c.put("pos".into(), 1);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(c.get(&"neg".into()), None);
        assert_eq!(c.get(&"pos".into()), Some(1));
        assert_eq!(c.purge_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let c = cache(0);
        c.put_with_ttl("short".into(), 0, Duration::from_secs(1));
        c.put("long".into(), 1);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(c.len(), 2);
        assert_eq!(c.purge_expired(), 1);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn invalidate_removes_entry() {
        let c = cache(0);
        c.put("a".into(), 1);
        assert!(c.invalidate(&"a".into()));
        assert!(!c.invalidate(&"a".into()));
        assert_eq!(c.get(&"a".into()), None);
    }

    #[test]
    fn lru_evicts_least_recently_accessed() {
        let c = cache(2);
        c.put("a".into(), 1);
        c.put("b".into(), 2);
        // Touch "a" so "b" becomes the eviction candidate despite being newer.
        assert_eq!(c.get(&"a".into()), Some(1));
        c.put("c".into(), 3);

        assert_eq!(c.len(), 2);
        assert_eq!(c.get(&"a".into()), Some(1));
        assert_eq!(c.get(&"b".into()), None);
        assert_eq!(c.get(&"c".into()), Some(3));
    }

    #[test]
    fn overwrite_at_capacity_does_not_evict() {
        let c = cache(2);
        c.put("a".into(), 1);
        c.put("b".into(), 2);
        c.put("a".into(), 10);
        assert_eq!(c.get(&"a".into()), Some(10));
        assert_eq!(c.get(&"b".into()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_prefers_expired_entries() {
        let c = cache(2);
        c.put_with_ttl("stale".into(), 0, Duration::from_secs(1));
        c.put("fresh".into(), 1);
        tokio::time::advance(Duration::from_secs(2)).await;
        c.put("new".into(), 2);
        assert_eq!(c.get(&"fresh".into()), Some(1));
        assert_eq!(c.get(&"new".into()), Some(2));
    }

    #[tokio::test]
    async fn single_flight_stores_and_then_hits() {
        let c = cache(0);
        let (v, origin) = c
            .resolve_single_flight("k".into(), || async {
                Fill::Store {
                    value: 7,
                    ttl: HOUR,
                }
            })
            .await
            .unwrap();
        assert_eq!((v, origin), (7, Origin::Leader));

        let (v, origin) = c
            .resolve_single_flight("k".into(), || async { panic!("producer must not run on a hit") })
            .await
            .unwrap();
        assert_eq!((v, origin), (7, Origin::Cache));
        assert_eq!(c.in_flight(), 0);
    }

    #[tokio::test]
    async fn skip_is_returned_but_not_cached() {
        let c = cache(0);
        let (v, _) = c
            .resolve_single_flight("k".into(), || async { Fill::Skip(9) })
            .await
            .unwrap();
        assert_eq!(v, 9);
        assert_eq!(c.get(&"k".into()), None);
        assert_eq!(c.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_producer() {
        let c = cache(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = watch::channel(false);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let c = c.clone();
            let calls = Arc::clone(&calls);
            let mut release_rx = release_rx.clone();
            handles.push(tokio::spawn(async move {
                c.resolve_single_flight("k".into(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let _ = release_rx.wait_for(|go| *go).await;
                    Fill::Store {
                        value: 42,
                        ttl: HOUR,
                    }
                })
                .await
            }));
        }

        // Let every caller register before the producer finishes.
        while c.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        release_tx.send(true).unwrap();

        let mut leaders = 0;
        for handle in handles {
            let (v, origin) = handle.await.unwrap().unwrap();
            assert_eq!(v, 42);
            if origin == Origin::Leader {
                leaders += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(leaders, 1);
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_cancel_flight() {
        let c = cache(0);
        let (release_tx, release_rx) = watch::channel(false);

        let leader = {
            let c = c.clone();
            let mut release_rx = release_rx.clone();
            tokio::spawn(async move {
                c.resolve_single_flight("k".into(), move || async move {
                    let _ = release_rx.wait_for(|go| *go).await;
                    Fill::Store { value: 5, ttl: HOUR }
                })
                .await
            })
        };
        while c.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        // The caller that started the flight gives up.
        leader.abort();
        let _ = leader.await;
        release_tx.send(true).unwrap();

        let (v, origin) = c
            .resolve_single_flight("k".into(), || async { Fill::Skip(0) })
            .await
            .unwrap();
        assert_eq!(v, 5);
        assert_ne!(origin, Origin::Leader);
    }

    #[tokio::test]
    async fn panicking_producer_reports_abort_and_clears_flight() {
        let c = cache(0);
        let err = c
            .resolve_single_flight("k".into(), || async { panic!("boom") })
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::FlightAborted);
        assert_eq!(c.in_flight(), 0);

        let (v, origin) = c
            .resolve_single_flight("k".into(), || async { Fill::Skip(1) })
            .await
            .unwrap();
        assert_eq!((v, origin), (1, Origin::Leader));
    }

    #[test]
    fn fill_value_accessor() {
        assert_eq!(*Fill::Skip(3).value(), 3);
        assert_eq!(*Fill::Store { value: 4, ttl: HOUR }.value(), 4);
    }
}
