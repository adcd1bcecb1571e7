use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::future;
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::entry::{Entry, ExpireTimer, ValueFuture};
use crate::error::{CacheError, ProducerPanicked};
#[cfg(feature = "stats")]
use crate::stats::CacheStats;

/// Construction-time configuration for a [`Cache`]. Immutable once the
/// cache is built.
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    /// What to do with reads that arrive after an entry's TTL has elapsed.
    ///
    /// * `true` (the default): the stale value is returned instantly and,
    ///   if a producer was supplied, a single regeneration is started in
    ///   the background (stale-while-revalidate).
    /// * `false`: the stale entry is dropped and the read waits for a
    ///   complete fresh generation, or fails with
    ///   [`CacheError::MissNoProducer`] when no producer was given.
    pub return_expired: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            return_expired: true,
        }
    }
}

/// An in-process asynchronous memoization cache with single-flight
/// deduplication and TTL expiration.
///
/// Given a key and an expensive asynchronous producer,
/// [`get_with`](Cache::get_with) returns the cached value when one is still
/// valid, and otherwise invokes the producer exactly once on behalf of all
/// concurrent callers for that key: everyone awaits a clone of the same
/// shared future and observes the identical value or failure. Once a value
/// is produced it stays valid for the supplied TTL, measured from producer
/// completion; what happens after that is governed by
/// [`CacheConfig::return_expired`].
///
/// Keys are compared by value through their `Eq + Hash` implementation, so
/// two structurally equal keys name the same entry.
///
/// The cache is cheap to clone (clones share the same underlying map) and
/// can be used from any number of tasks and threads concurrently. Producer
/// invocations and expiration timers run as independent tokio tasks, so all
/// operations must be called from within a tokio runtime.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use memoflight::{Cache, CacheConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: Cache<&str, u32> = Cache::new(CacheConfig::default());
///
/// let value = cache
///     .get_with("answer", Some(Duration::from_secs(60)), || async {
///         // expensive work happens here, at most once per key at a time
///         Ok::<_, std::io::Error>(42)
///     })
///     .await
///     .unwrap();
/// assert_eq!(value, 42);
///
/// // Served from the cache, the producer is not invoked again.
/// let again = cache.get(&"answer").await.unwrap();
/// assert_eq!(again, 42);
/// # }
/// ```
pub struct Cache<K, V> {
    /// Per-key entries. The DashMap `entry` API makes the check-and-create
    /// of the single-flight protocol atomic per key.
    entries: Arc<DashMap<K, Entry<V>>>,
    /// See [`CacheConfig::return_expired`].
    return_expired: bool,
    /// Monotonic source of freshness-window ids. Ids never repeat, so a
    /// timer from a superseded window can never act on a newer one.
    generation: Arc<AtomicU64>,
    #[cfg(feature = "stats")]
    stats: Arc<CacheStats>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            entries: Arc::clone(&self.entries),
            return_expired: self.return_expired,
            generation: Arc::clone(&self.generation),
            #[cfg(feature = "stats")]
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<K: Eq + Hash, V> std::fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.entries.len())
            .field("return_expired", &self.return_expired)
            .finish()
    }
}

/// What a lookup decided to do, computed under the key's shard lock and
/// acted on after releasing it. Producers are never run (nor even
/// constructed) inside the critical section.
enum Lookup<V> {
    /// Await the entry's existing future (fresh hit, attach to an in-flight
    /// generation, or a stale hit with a regeneration already running).
    Share(ValueFuture<V>),
    /// A generating entry was installed for this caller; spawn the producer
    /// and await the shared future.
    Generate {
        tx: oneshot::Sender<Result<V, CacheError>>,
        fut: ValueFuture<V>,
    },
    /// Serve the stale value immediately and spawn one background
    /// regeneration.
    Refresh {
        stale: ValueFuture<V>,
        tx: oneshot::Sender<Result<V, CacheError>>,
        fut: ValueFuture<V>,
    },
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Cache {
            entries: Arc::new(DashMap::new()),
            return_expired: config.return_expired,
            generation: Arc::new(AtomicU64::new(0)),
            #[cfg(feature = "stats")]
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Looks up `key`, producing the value if necessary.
    ///
    /// * Absent key: starts a single producer invocation; every concurrent
    ///   caller for the same key awaits the same shared future. On success
    ///   the value is cached and its TTL timer armed; on failure the entry
    ///   is removed and the error propagates to every waiter.
    /// * Valid entry: returns the cached value (or attaches to the
    ///   in-flight production).
    /// * Expired entry with `return_expired = true`: returns the stale
    ///   value immediately and starts at most one background regeneration;
    ///   concurrent stale reads share it. The regenerated value replaces
    ///   the stale one when it completes.
    /// * Expired entry with `return_expired = false`: the stale entry is
    ///   discarded and this behaves like an absent key.
    ///
    /// `ttl` counts from producer completion, not from this call; `None`
    /// means the value never expires. When a valid or in-flight entry is
    /// found the `ttl` argument is ignored in favor of the one that created
    /// the entry.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub async fn get_with<F, Fut, E>(
        &self,
        key: K,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let lookup = match self.entries.entry(key.clone()) {
            MapEntry::Occupied(mut occupied) => {
                if !occupied.get().expired {
                    #[cfg(feature = "stats")]
                    self.stats.record_hit();
                    Lookup::Share(occupied.get().current.clone())
                } else if self.return_expired {
                    #[cfg(feature = "stats")]
                    self.stats.record_stale_hit();
                    let stale = occupied.get().current.clone();
                    if occupied.get().next.is_none() {
                        let (tx, fut) = pending_future();
                        occupied.get_mut().next = Some(fut.clone());
                        Lookup::Refresh { stale, tx, fut }
                    } else {
                        // A regeneration is already in flight; never start
                        // a second one for the same key.
                        Lookup::Share(stale)
                    }
                } else {
                    #[cfg(feature = "stats")]
                    self.stats.record_miss();
                    let (tx, fut) = pending_future();
                    // Replacing the stale entry drops its timer handle,
                    // cancelling any still-scheduled expiration.
                    occupied.insert(Entry::generating(fut.clone(), self.next_generation()));
                    Lookup::Generate { tx, fut }
                }
            }
            MapEntry::Vacant(vacant) => {
                #[cfg(feature = "stats")]
                self.stats.record_miss();
                let (tx, fut) = pending_future();
                vacant.insert(Entry::generating(fut.clone(), self.next_generation()));
                Lookup::Generate { tx, fut }
            }
        };

        match lookup {
            Lookup::Share(fut) => fut.await,
            Lookup::Generate { tx, fut } => {
                self.spawn_producer(key, ttl, producer, tx, fut.clone(), false);
                fut.await
            }
            Lookup::Refresh { stale, tx, fut } => {
                self.spawn_producer(key, ttl, producer, tx, fut, true);
                // Callers who read while stale keep the stale snapshot;
                // the regeneration does not resolve their future.
                stale.await
            }
        }
    }

    /// Looks up `key` without a producer.
    ///
    /// Fails with [`CacheError::MissNoProducer`] when the key is absent, or
    /// when its entry had expired under `return_expired = false` (the stale
    /// entry is discarded). An expired entry under `return_expired = true`
    /// yields the stale value; no regeneration is started without a
    /// producer. A still-generating entry is awaited like any other caller.
    pub async fn get(&self, key: &K) -> Result<V, CacheError> {
        let snapshot = self
            .entries
            .get(key)
            .map(|entry| (entry.expired, entry.current.clone()));

        match snapshot {
            None => {
                #[cfg(feature = "stats")]
                self.stats.record_miss();
                Err(CacheError::MissNoProducer)
            }
            Some((true, _)) if !self.return_expired => {
                #[cfg(feature = "stats")]
                self.stats.record_miss();
                // Only drop the entry if it is still the expired one; a
                // concurrent refresh must not be evicted.
                self.entries.remove_if(key, |_, entry| entry.expired);
                Err(CacheError::MissNoProducer)
            }
            Some((expired, fut)) => {
                #[cfg(feature = "stats")]
                if expired {
                    self.stats.record_stale_hit();
                } else {
                    self.stats.record_hit();
                }
                #[cfg(not(feature = "stats"))]
                let _ = expired;
                fut.await
            }
        }
    }

    /// Inserts or overwrites the entry for `key` with an already-resolved
    /// value and (re)arms its TTL timer, cancelling any prior timer.
    ///
    /// Storing does not interact with an in-flight production for the same
    /// key: if one is running, its eventual result overwrites this value
    /// when it resolves.
    ///
    /// # Panics
    ///
    /// Panics when called with a TTL outside a tokio runtime.
    pub fn store(&self, key: K, ttl: Option<Duration>, value: V) {
        let current = resolved_future(value);
        let generation = self.next_generation();
        match self.entries.entry(key.clone()) {
            MapEntry::Occupied(mut occupied) => {
                let timer = ttl.map(|ttl| self.arm_timer(key, generation, ttl));
                let entry = occupied.get_mut();
                entry.current = current;
                entry.expired = false;
                entry.generation = generation;
                entry.timer = timer;
                // entry.next is left alone: a running background
                // regeneration still folds its result in when it completes.
            }
            MapEntry::Vacant(vacant) => {
                let timer = ttl.map(|ttl| self.arm_timer(key, generation, ttl));
                vacant.insert(Entry {
                    current,
                    next: None,
                    expired: false,
                    generation,
                    timer,
                });
            }
        }
    }

    /// Removes the entry for `key`, returning `true` if one existed.
    ///
    /// Callers already attached to an in-flight production for the key
    /// still receive its result; it just is not cached.
    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live entries, including expired and still-generating ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` when an entry (fresh, generating or expired) exists
    /// for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether this cache serves expired values while revalidating.
    pub fn return_expired(&self) -> bool {
        self.return_expired
    }

    /// Access statistics recorded by this cache instance.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Runs the producer as an independent task. The task performs all
    /// entry bookkeeping before waking the waiters, so by the time a caller
    /// observes the outcome the map already reflects it. Producers run to
    /// completion even if every caller drops its future.
    fn spawn_producer<F, Fut, E>(
        &self,
        key: K,
        ttl: Option<Duration>,
        producer: F,
        tx: oneshot::Sender<Result<V, CacheError>>,
        fut: ValueFuture<V>,
        background: bool,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        #[cfg(feature = "stats")]
        self.stats.record_producer_run();
        tracing::debug!(background, "starting producer");

        let cache = self.clone();
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(async move { producer().await })
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(CacheError::producer(err)),
                Err(_panic) => Err(CacheError::producer(ProducerPanicked)),
            };
            cache.finish_generation(&key, ttl, &fut, &result, background);
            // Waiters wake only after the map reflects the outcome.
            let _ = tx.send(result);
        });
    }

    /// Entry bookkeeping for a completed production.
    ///
    /// On success the resolved future becomes the entry's `current`, any
    /// `next` slot is cleared, the expired flag resets and the TTL timer is
    /// rearmed for a new generation. If a `store` overwrote the entry while
    /// the producer ran, the producer's result wins. If the entry was
    /// removed entirely, the result is not reinstated.
    ///
    /// On failure the entry is removed, but only if it still belongs to
    /// this production.
    fn finish_generation(
        &self,
        key: &K,
        ttl: Option<Duration>,
        fut: &ValueFuture<V>,
        result: &Result<V, CacheError>,
        background: bool,
    ) {
        match result {
            Ok(_) => {
                let generation = self.next_generation();
                if let Some(mut entry) = self.entries.get_mut(key) {
                    // Arm while the shard is locked so a zero TTL cannot
                    // fire before the entry reflects this generation.
                    let timer = ttl.map(|ttl| self.arm_timer(key.clone(), generation, ttl));
                    entry.current = fut.clone();
                    entry.next = None;
                    entry.expired = false;
                    entry.generation = generation;
                    entry.timer = timer;
                }
            }
            Err(err) => {
                self.entries.remove_if(key, |_, entry| {
                    entry.current.ptr_eq(fut)
                        || entry.next.as_ref().is_some_and(|next| next.ptr_eq(fut))
                });
                if background {
                    // Nobody awaits this future, so the failure is observed
                    // here instead of escaping as an unhandled task error.
                    tracing::warn!(error = %err, "background regeneration failed, entry dropped");
                }
            }
        }
    }

    /// Schedules expiration `ttl` after now for the given freshness window.
    /// The returned handle aborts the task when dropped.
    fn arm_timer(&self, key: K, generation: u64, ttl: Duration) -> ExpireTimer {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            cache.expire(&key, generation);
        });
        ExpireTimer::new(task.abort_handle())
    }

    /// TTL expiration callback. Only acts when the entry is still in the
    /// freshness window the timer was armed for.
    fn expire(&self, key: &K, generation: u64) {
        if self.return_expired {
            if let Some(mut entry) = self.entries.get_mut(key) {
                if entry.generation == generation {
                    entry.expired = true;
                    tracing::trace!("entry expired, stale reads will revalidate");
                }
            }
        } else if self
            .entries
            .remove_if(key, |_, entry| entry.generation == generation)
            .is_some()
        {
            tracing::trace!("entry expired and was dropped");
        }
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// A cache with the default configuration (`return_expired = true`).
    fn default() -> Self {
        Cache::new(CacheConfig::default())
    }
}

/// A shared future completed later by the producer task. Every caller
/// awaits a clone; the sender side is resolved exactly once.
fn pending_future<V>() -> (oneshot::Sender<Result<V, CacheError>>, ValueFuture<V>)
where
    V: Clone + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let fut = rx
        .map(|received| match received {
            Ok(result) => result,
            // The producer task always sends before exiting; a dropped
            // sender means the runtime shut down mid-flight.
            Err(_closed) => Err(CacheError::producer(ProducerPanicked)),
        })
        .boxed()
        .shared();
    (tx, fut)
}

/// An already-resolved shared future, for manually stored values.
fn resolved_future<V>(value: V) -> ValueFuture<V>
where
    V: Clone + Send + 'static,
{
    future::ready(Ok(value)).boxed().shared()
}
