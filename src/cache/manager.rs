//! Read-Through Cache Manager
//!
//! Get-or-fetch orchestration over the [`EntryStore`], plus the lifecycle of
//! the background [`EvictionSweeper`].
//!
//! ```text
//! caller ──▶ lookup ──fresh──▶ payload
//!              │
//!             miss ──▶ single-flight ──▶ provider ──▶ put ──▶ payload
//! ```
//!
//! The provider is never called while a store lock is held.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::coalesce::{Flight, InFlight};
use super::entry::{CacheEntry, CacheKey, Payload};
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::store::EntryStore;
use super::sweeper::{EvictionSweeper, SweeperState};
use super::{DEFAULT_EVICTION_INTERVAL, DEFAULT_SHARD_COUNT, DEFAULT_TTL};
use crate::error::{Error, ProviderError, ProviderResult, Result};

/// Cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum age of a servable entry
    pub ttl: Duration,
    /// Time between eviction sweeps
    pub eviction_interval: Duration,
    /// Number of store partitions (power of two)
    pub shard_count: usize,
    /// Share one provider call between concurrent misses on the same key
    pub coalesce_fetches: bool,
    /// Bound on a single provider attempt (`None` = unbounded)
    pub fetch_timeout: Option<Duration>,
    /// Extra attempts after a retryable provider failure
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub retry_backoff: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            shard_count: DEFAULT_SHARD_COUNT,
            coalesce_fetches: true,
            fetch_timeout: Some(Duration::from_secs(10)),
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl CacheConfig {
    /// The unhardened baseline: no coalescing, no timeout, no retries
    pub fn baseline() -> Self {
        Self {
            coalesce_fetches: false,
            fetch_timeout: None,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Check the configuration for values the cache cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(Error::Config("ttl must be greater than zero".into()));
        }
        if self.eviction_interval.is_zero() {
            return Err(Error::Config(
                "eviction interval must be greater than zero".into(),
            ));
        }
        if self.shard_count == 0 || !self.shard_count.is_power_of_two() {
            return Err(Error::Config(format!(
                "shard count must be a power of two, got {}",
                self.shard_count
            )));
        }
        if matches!(self.fetch_timeout, Some(t) if t.is_zero()) {
            return Err(Error::Config("fetch timeout must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Handle to a running sweeper task
struct SweeperHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Read-through TTL cache
pub struct ReadThroughCache<P: Payload> {
    config: CacheConfig,
    store: Arc<EntryStore<P>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    in_flight: InFlight<P>,
    sweeper: Arc<EvictionSweeper<P>>,
    running: Mutex<Option<SweeperHandle>>,
}

impl<P: Payload> ReadThroughCache<P> {
    /// Create a cache on the wall clock
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(EntryStore::new(config.shard_count));
        let metrics = Arc::new(CacheMetrics::new());
        let sweeper = Arc::new(EvictionSweeper::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&metrics),
            config.ttl,
            config.eviction_interval,
        ));

        Ok(Self {
            config,
            store,
            clock,
            metrics,
            in_flight: InFlight::new(),
            sweeper,
            running: Mutex::new(None),
        })
    }

    /// Return the payload for `key`, fetching it through `fetch` if the
    /// stored entry is missing or stale.
    ///
    /// Provider failures are returned as-is and leave the store untouched.
    #[instrument(skip(self, key, fetch), fields(key = %key))]
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<P>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProviderResult<P>> + Send + 'static,
    {
        if let Some(payload) = self.lookup_fresh(key) {
            self.metrics.record_hit();
            debug!("Cache hit");
            return Ok(payload);
        }

        self.metrics.record_miss();
        debug!("Cache miss");

        let task = self.fetch_and_store(key.clone(), fetch);

        let result = if self.config.coalesce_fetches {
            match self
                .in_flight
                .join_or_start(key, || self.lookup_fresh(key), task)
            {
                Flight::Ready(payload) => Ok(payload),
                Flight::Leader(flight) => flight.await,
                Flight::Follower(flight) => {
                    self.metrics.record_coalesced_wait();
                    debug!("Joined in-flight fetch");
                    flight.await
                }
            }
        } else {
            task.await
        };

        result.map_err(Error::from)
    }

    /// Payload of the entry for `key` if it is still fresh
    fn lookup_fresh(&self, key: &CacheKey) -> Option<P> {
        let entry = self.store.get(key)?;
        entry
            .is_fresh_at(self.clock.now(), self.config.ttl)
            .then_some(entry.payload)
    }

    /// Build the fetch-then-put future for one miss.
    ///
    /// Owns everything it touches so it can be shared between coalesced
    /// callers and outlive the caller that created it.
    fn fetch_and_store<F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> impl Future<Output = ProviderResult<P>> + Send + 'static
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProviderResult<P>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let metrics = Arc::clone(&self.metrics);
        let policy = FetchPolicy::from(&self.config);

        async move {
            match fetch_with_policy(&fetch, &policy, &metrics).await {
                Ok(payload) => {
                    store.put(key.clone(), CacheEntry::new(payload.clone(), clock.now()));
                    debug!(key = %key, "Stored fresh payload");
                    Ok(payload)
                }
                Err(e) => {
                    metrics.record_fetch_failure();
                    warn!(key = %key, error = %e, "Provider fetch failed; nothing cached");
                    Err(e)
                }
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the eviction sweeper on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&self.sweeper).run(shutdown.clone()));
        *running = Some(SweeperHandle { shutdown, task });

        info!(
            ttl = ?self.config.ttl,
            interval = ?self.config.eviction_interval,
            "Cache started"
        );
        Ok(())
    }

    /// Cancel the eviction sweeper and wait for it to finish.
    ///
    /// Stopping a cache that is not running is a no-op.
    pub async fn stop(&self) {
        let handle = self.running.lock().take();
        if let Some(SweeperHandle { shutdown, task }) = handle {
            shutdown.cancel();
            if let Err(e) = task.await {
                warn!("Eviction sweeper task ended abnormally: {}", e);
            }
            info!("Cache stopped");
        }
    }

    /// Whether the sweeper task is active
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Current state of the sweeper loop
    pub fn sweeper_state(&self) -> SweeperState {
        self.sweeper.state()
    }

    /// Run a single eviction pass now, independent of the timer
    pub fn sweep_now(&self) -> usize {
        self.sweeper.sweep_once()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Point-in-time copy of every stored entry
    pub fn snapshot(&self) -> HashMap<CacheKey, CacheEntry<P>> {
        self.store.snapshot()
    }

    /// Stored entry for `key`, fresh or not
    pub fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry<P>> {
        self.store.get(key)
    }

    /// Drop the entry for `key`
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.store.delete(key).is_some()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Number of keys with a provider fetch in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The clock freshness is judged against
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl<P: Payload> Drop for ReadThroughCache<P> {
    fn drop(&mut self) {
        if let Some(SweeperHandle { shutdown, .. }) = self.running.get_mut().take() {
            shutdown.cancel();
            debug!("Cache dropped while running; sweeper cancelled");
        }
    }
}

impl<P: Payload> std::fmt::Debug for ReadThroughCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("config", &self.config)
            .field("entries", &self.store.len())
            .field("sweeper", &self.sweeper.state())
            .finish()
    }
}

// =============================================================================
// Provider call policy
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct FetchPolicy {
    timeout: Option<Duration>,
    max_retries: u32,
    backoff: Duration,
}

impl From<&CacheConfig> for FetchPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            timeout: config.fetch_timeout,
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
        }
    }
}

/// Call the provider with a per-attempt timeout and bounded retries
async fn fetch_with_policy<P, F, Fut>(
    fetch: &F,
    policy: &FetchPolicy,
    metrics: &CacheMetrics,
) -> ProviderResult<P>
where
    P: Payload,
    F: Fn() -> Fut,
    Fut: Future<Output = ProviderResult<P>>,
{
    let mut attempt: u32 = 0;
    loop {
        metrics.record_fetch();
        let outcome = match policy.timeout {
            Some(limit) => tokio::time::timeout(limit, fetch())
                .await
                .unwrap_or(Err(ProviderError::Timeout(limit))),
            None => fetch().await,
        };

        let error = match outcome {
            Ok(payload) if payload.is_empty() => ProviderError::EmptyPayload,
            Ok(payload) => return Ok(payload),
            Err(e) => e,
        };

        if attempt >= policy.max_retries || !error.is_retryable() {
            return Err(error);
        }

        let delay = policy.backoff.saturating_mul(1u32 << attempt.min(16));
        attempt += 1;
        metrics.record_retry();
        debug!(attempt, ?delay, error = %error, "Retrying provider fetch");
        tokio::time::sleep(delay).await;
    }
}

// =============================================================================
// Tests
// =============================================================================
