use futures::future::{BoxFuture, Shared};
use tokio::task::AbortHandle;

use crate::error::CacheError;

/// Shared handle to the in-flight or completed production of a value.
///
/// Every concurrent caller for the same key awaits a clone of the same
/// shared future, which is what makes lookups single-flight: there is one
/// production, observed by everyone.
pub(crate) type ValueFuture<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

/// Per-key cache record.
///
/// Created on the first lookup-with-producer for an absent key (or by a
/// manual `store`), mutated in place by later lookups and by the expiration
/// timer, and removed from the map when its producer fails or, under the
/// drop-expired policy, when its TTL elapses.
pub(crate) struct Entry<V> {
    /// The in-flight or completed production for this key.
    pub(crate) current: ValueFuture<V>,
    /// A background regeneration triggered by a stale read, if one is in
    /// flight. Never more than one per key.
    pub(crate) next: Option<ValueFuture<V>>,
    /// Set by the expiration timer under the serve-expired policy. Only
    /// meaningful once `current` has resolved; a generating entry is never
    /// expired.
    pub(crate) expired: bool,
    /// Identifies the freshness window this entry is in. Bumped on every
    /// refresh or store; the expiration callback compares generations so a
    /// superseded timer can never flag or evict a newer window.
    pub(crate) generation: u64,
    /// Owned handle to the scheduled expiration task, if the entry has a
    /// TTL. Replacing the field cancels the previous timer.
    pub(crate) timer: Option<ExpireTimer>,
}

impl<V> Entry<V> {
    /// A brand-new entry whose production is still in flight. The timer is
    /// armed later, once the producer completes, because the TTL counts
    /// from completion.
    pub(crate) fn generating(current: ValueFuture<V>, generation: u64) -> Self {
        Entry {
            current,
            next: None,
            expired: false,
            generation,
            timer: None,
        }
    }
}

/// Owned handle to a scheduled expiration task.
///
/// Aborts the task on drop, so assigning a new timer into
/// [`Entry::timer`] is the cancel-then-replace the entry lifecycle
/// requires.
pub(crate) struct ExpireTimer {
    handle: AbortHandle,
}

impl ExpireTimer {
    pub(crate) fn new(handle: AbortHandle) -> Self {
        ExpireTimer { handle }
    }
}

impl Drop for ExpireTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
