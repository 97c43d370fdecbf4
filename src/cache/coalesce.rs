//! Single-flight request coalescing.
//!
//! At most one provider fetch is in flight per key. The first caller for a
//! stale or absent key spawns the fetch as its own task; callers arriving
//! while it runs join the same shared handle and receive a clone of its
//! result. The task finishes and releases its slot even if every caller has
//! gone away.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};

use super::entry::CacheKey;
use crate::error::{ProviderError, ProviderResult};

type SharedFetch<P> = Shared<BoxFuture<'static, ProviderResult<P>>>;

/// How a caller got its answer
pub enum Flight<P: Clone> {
    /// A fresh entry appeared while the slot was being claimed
    Ready(P),
    /// This caller started the fetch
    Leader(SharedFetch<P>),
    /// This caller joined a fetch started by someone else
    Follower(SharedFetch<P>),
}

/// Per-key map of in-flight fetches
pub struct InFlight<P: Clone> {
    pending: Arc<DashMap<CacheKey, SharedFetch<P>>>,
}

impl<P: Clone + Send + Sync + 'static> InFlight<P> {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Number of keys with a fetch in flight
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Join the fetch in flight for `key`, or spawn `task` as a new one.
    ///
    /// `recheck` runs while the key's slot is held and before `task` is
    /// registered; a hit there means an earlier flight already refreshed the
    /// store. `task` must write the store before it completes: the marker is
    /// removed right after, and later callers rely on finding the entry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn join_or_start<R, Fut>(&self, key: &CacheKey, recheck: R, task: Fut) -> Flight<P>
    where
        R: FnOnce() -> Option<P>,
        Fut: Future<Output = ProviderResult<P>> + Send + 'static,
    {
        match self.pending.entry(key.clone()) {
            Entry::Occupied(slot) => Flight::Follower(slot.get().clone()),
            Entry::Vacant(slot) => {
                if let Some(payload) = recheck() {
                    return Flight::Ready(payload);
                }

                let release = ReleaseSlot {
                    pending: Arc::clone(&self.pending),
                    key: key.clone(),
                };
                let handle = tokio::spawn(async move {
                    let _release = release;
                    task.await
                });

                let shared = handle
                    .map(|joined| {
                        joined.unwrap_or_else(|e| Err(ProviderError::Interrupted(e.to_string())))
                    })
                    .boxed()
                    .shared();

                slot.insert(shared.clone());
                Flight::Leader(shared)
            }
        }
    }
}

/// Drops the in-flight marker when the fetch task ends, panics included
struct ReleaseSlot<P: Clone> {
    pending: Arc<DashMap<CacheKey, SharedFetch<P>>>,
    key: CacheKey,
}

impl<P: Clone> Drop for ReleaseSlot<P> {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

impl<P: Clone + Send + Sync + 'static> Default for InFlight<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone> std::fmt::Debug for InFlight<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("pending", &self.pending.len())
            .finish()
    }
}
