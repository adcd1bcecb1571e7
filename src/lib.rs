//! # Memoflight
//!
//! An in-process asynchronous memoization cache with single-flight
//! deduplication, TTL expiration and stale-while-revalidate reads.
//!
//! Given a key and an expensive asynchronous producer, the cache returns a
//! previously computed value while it is still valid and otherwise invokes
//! the producer exactly once on behalf of every concurrent caller for that
//! key: all of them await the same shared future and observe the identical
//! value or failure.
//!
//! ## Features
//!
//! - **Single-flight**: at most one producer invocation per key at a time,
//!   no matter how many callers race for it
//! - **TTL from completion**: a value stays valid for its TTL measured from
//!   the moment the producer finished, not from when it was requested
//! - **Stale-while-revalidate**: with `return_expired = true` (the default)
//!   expired values are served instantly while a single background
//!   regeneration replaces them; with `false` callers block until a fresh
//!   value exists
//! - **Manual insertion**: [`Cache::store`] seeds or overwrites entries
//!   without a producer
//! - **Failure cleanup**: a failed producer evicts its entry before the
//!   error reaches the waiters, so the next lookup retries from scratch
//! - **Statistics**: hit/miss/producer-run counters behind the default-on
//!   `stats` feature
//!
//! ## Quick start
//!
//! ```
//! use std::time::Duration;
//! use memoflight::Cache;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: Cache<&str, String> = Cache::default();
//!
//! // The producer runs once; concurrent lookups for "user:42" attach to it.
//! let name = cache
//!     .get_with("user:42", Some(Duration::from_secs(30)), || async {
//!         // e.g. a database round-trip
//!         Ok::<_, std::io::Error>("Ada".to_string())
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(name, "Ada");
//!
//! // Within the TTL this is a plain cache hit.
//! assert_eq!(cache.get(&"user:42").await.unwrap(), "Ada");
//! # }
//! ```
//!
//! ## Module organization
//!
//! - [`cache`](Cache) - the cache component: lookup, single-flight
//!   generation, manual insertion, expiration scheduling
//! - `entry` - the per-key record tracking the shared value future, the
//!   expiration flag and any in-flight background regeneration
//! - [`error`](CacheError) - the error taxonomy for lookups
//! - [`stats`](CacheStats) - access counters (feature `stats`)
//!
//! The cache is an instantiable value with its own map and configuration;
//! there is no process-global state.

mod cache;
mod entry;
mod error;

#[cfg(feature = "stats")]
mod stats;

pub use cache::{Cache, CacheConfig};
pub use error::CacheError;

#[cfg(feature = "stats")]
pub use stats::CacheStats;
