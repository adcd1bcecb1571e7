use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics for monitoring hit/miss rates and producer activity.
///
/// Counters are updated with atomic operations using `Relaxed` ordering,
/// which keeps the overhead negligible while staying consistent across
/// threads and tasks.
///
/// # Examples
///
/// ```
/// use memoflight::CacheStats;
///
/// let stats = CacheStats::new();
///
/// stats.record_hit();
/// stats.record_hit();
/// stats.record_miss();
///
/// assert_eq!(stats.hits(), 2);
/// assert_eq!(stats.misses(), 1);
/// assert_eq!(stats.total_accesses(), 3);
/// assert!((stats.hit_rate() - 0.6666).abs() < 0.001);
/// ```
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    producer_runs: AtomicU64,
}

impl CacheStats {
    /// Creates a new `CacheStats` instance with zero counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fresh cache hit: the lookup found a valid (possibly still
    /// generating) entry.
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a stale hit: an expired value was served under the
    /// serve-expired policy.
    #[inline]
    pub fn record_stale_hit(&self) {
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache miss: the key was absent, or its expired entry was
    /// dropped.
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one producer invocation (foreground or background).
    #[inline]
    pub fn record_producer_run(&self) {
        self.producer_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of fresh hits.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of expired values served under the serve-expired policy.
    pub fn stale_hits(&self) -> u64 {
        self.stale_hits.load(Ordering::Relaxed)
    }

    /// Number of misses.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of producer invocations started by the cache.
    ///
    /// Under single-flight this stays well below the number of lookups; it
    /// is the cheapest way to verify deduplication in production.
    pub fn producer_runs(&self) -> u64 {
        self.producer_runs.load(Ordering::Relaxed)
    }

    /// Total number of lookups (hits, stale hits and misses).
    pub fn total_accesses(&self) -> u64 {
        self.hits() + self.stale_hits() + self.misses()
    }

    /// Fraction of lookups served from the cache (fresh or stale), between
    /// `0.0` and `1.0`. Returns `0.0` when nothing was recorded yet.
    ///
    /// # Examples
    ///
    /// ```
    /// use memoflight::CacheStats;
    ///
    /// let stats = CacheStats::new();
    /// assert_eq!(stats.hit_rate(), 0.0);
    ///
    /// stats.record_hit();
    /// stats.record_stale_hit();
    /// stats.record_miss();
    /// stats.record_miss();
    /// assert_eq!(stats.hit_rate(), 0.5);
    /// ```
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            return 0.0;
        }
        (self.hits() + self.stale_hits()) as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.stale_hits(), 0);
        assert_eq!(stats.misses(), 0);
        assert_eq!(stats.producer_runs(), 0);
        assert_eq!(stats.total_accesses(), 0);
    }

    #[test]
    fn test_stale_hits_count_towards_hit_rate() {
        let stats = CacheStats::new();
        stats.record_stale_hit();
        stats.record_miss();
        assert_eq!(stats.total_accesses(), 2);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_producer_runs_are_not_accesses() {
        let stats = CacheStats::new();
        stats.record_producer_run();
        assert_eq!(stats.producer_runs(), 1);
        assert_eq!(stats.total_accesses(), 0);
    }
}
