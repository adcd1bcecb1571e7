use std::sync::Arc;

use thiserror::Error;

/// Errors returned by cache lookups.
///
/// Both variants are `Clone` (producer failures are reference-counted) so a
/// single failure can be delivered to every caller awaiting the same
/// in-flight production.
///
/// # Examples
///
/// ```
/// use memoflight::CacheError;
///
/// let err = CacheError::MissNoProducer;
/// assert!(err.is_miss());
/// ```
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The key had no usable entry and no producer was supplied to
    /// generate one.
    ///
    /// Raised by [`Cache::get`](crate::Cache::get) when the key is absent,
    /// or when the entry had expired under the drop-expired policy.
    #[error("cache miss and no producer was supplied")]
    MissNoProducer,

    /// The supplied producer failed.
    ///
    /// The original error is carried as the source and surfaced verbatim to
    /// every caller awaiting that production. The cache removes the key's
    /// entry before callers observe this error, so the next lookup starts
    /// from scratch; no retry is performed by the cache itself.
    #[error("producer failed: {0}")]
    ProducerFailed(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl CacheError {
    /// Wraps a producer error for delivery through the shared future.
    pub(crate) fn producer<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CacheError::ProducerFailed(Arc::new(err))
    }

    /// Returns `true` for a plain cache miss ([`CacheError::MissNoProducer`]).
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::MissNoProducer)
    }
}

/// Stand-in error used when a producer panics instead of returning.
#[derive(Debug, Error)]
#[error("producer panicked")]
pub(crate) struct ProducerPanicked;
