//! Eviction Sweeper
//!
//! Background task that wakes every `eviction_interval`, scans the store and
//! removes entries older than the TTL.
//!
//! ```text
//!   Idle ──run()──▶ Sleeping ──tick──▶ Sweeping
//!                      ▲                  │
//!                      └──── pass done ───┘
//!                      │
//!                  cancelled ──▶ Stopped
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::clock::Clock;
use super::entry::CacheKey;
use super::metrics::CacheMetrics;
use super::store::EntryStore;

/// Lifecycle state of the sweeper loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SweeperState {
    /// Never started
    Idle = 0,
    /// Waiting for the next tick
    Sleeping = 1,
    /// Scanning the store
    Sweeping = 2,
    /// Shut down; terminal
    Stopped = 3,
}

impl SweeperState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SweeperState::Sleeping,
            2 => SweeperState::Sweeping,
            3 => SweeperState::Stopped,
            _ => SweeperState::Idle,
        }
    }
}

impl std::fmt::Display for SweeperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweeperState::Idle => write!(f, "idle"),
            SweeperState::Sleeping => write!(f, "sleeping"),
            SweeperState::Sweeping => write!(f, "sweeping"),
            SweeperState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Periodic TTL eviction over an [`EntryStore`]
pub struct EvictionSweeper<P> {
    store: Arc<EntryStore<P>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    ttl: Duration,
    interval: Duration,
    state: AtomicU8,
}

impl<P: Clone + Send + Sync + 'static> EvictionSweeper<P> {
    /// Create a sweeper over `store`
    pub fn new(
        store: Arc<EntryStore<P>>,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            metrics,
            ttl,
            interval,
            state: AtomicU8::new(SweeperState::Idle as u8),
        }
    }

    /// Current loop state
    pub fn state(&self) -> SweeperState {
        SweeperState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SweeperState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Run one pass, returning how many entries were removed.
    ///
    /// `now` is taken once at the start of the pass, but each entry's age is
    /// re-evaluated under its shard lock at removal time, so an entry
    /// refreshed mid-pass survives.
    pub fn sweep_once(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut removed = 0;

        for key in self.store.keys() {
            if self.evict_if_expired(&key, now, ttl) {
                removed += 1;
            }
        }

        self.metrics.record_sweep();
        self.metrics.record_evictions(removed as u64);
        removed
    }

    fn evict_if_expired(
        &self,
        key: &CacheKey,
        now: chrono::DateTime<chrono::Utc>,
        ttl: Duration,
    ) -> bool {
        match self.store.remove_if(key, |entry| entry.is_expired_at(now, ttl)) {
            Some(entry) => {
                debug!(
                    key = %key,
                    stored_at = %entry.stored_at,
                    "Evicted expired cache entry"
                );
                true
            }
            None => false,
        }
    }

    /// Run the sweep loop until `shutdown` is cancelled.
    ///
    /// The first pass happens one full interval after start.
    #[instrument(skip(self, shutdown), fields(ttl = ?self.ttl, interval = ?self.interval))]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting eviction sweeper");

        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.set_state(SweeperState::Sleeping);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Eviction sweeper shutting down");
                    break;
                }

                _ = tick.tick() => {
                    self.set_state(SweeperState::Sweeping);
                    let removed = self.sweep_once();
                    if removed > 0 {
                        debug!(removed, remaining = self.store.len(), "Sweep complete");
                    }
                    self.set_state(SweeperState::Sleeping);
                }
            }
        }

        self.set_state(SweeperState::Stopped);
    }
}

// =============================================================================
// Tests
// =============================================================================
