//! Read-Through TTL Cache
//!
//! In-memory cache fronting a slow, rate-limited data provider.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ReadThroughCache                         │
//! │  ┌────────────────┐   ┌──────────────┐   ┌────────────────┐  │
//! │  │  get_or_fetch  │──▶│   InFlight   │──▶│  DataProvider  │  │
//! │  │ (orchestrator) │   │(single-flight)│   │   (external)   │  │
//! │  └───────┬────────┘   └──────┬───────┘   └────────────────┘  │
//! │          │ get               │ put                            │
//! │          ▼                   ▼                                │
//! │  ┌────────────────────────────────────┐   ┌────────────────┐  │
//! │  │      EntryStore (sharded RwLock)   │◀──│EvictionSweeper │  │
//! │  └────────────────────────────────────┘   └────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Freshness
//!
//! An entry is served while `now - stored_at < ttl`. The sweeper removes
//! entries once `now - stored_at > ttl`, re-checking each entry under its
//! shard lock so a concurrent refresh is never lost.

mod clock;
mod coalesce;
mod entry;
mod manager;
mod metrics;
mod store;
mod sweeper;

#[cfg(test)]
mod proptest;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coalesce::{Flight, InFlight};
pub use entry::{CacheEntry, CacheKey, Payload};
pub use manager::{CacheConfig, ReadThroughCache};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use store::EntryStore;
pub use sweeper::{EvictionSweeper, SweeperState};

use std::time::Duration;

/// Default entry lifetime (30 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Default time between eviction sweeps (1 minute)
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of store partitions
pub const DEFAULT_SHARD_COUNT: usize = 16;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_count_is_power_of_two() {
        assert!(DEFAULT_SHARD_COUNT.is_power_of_two());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_TTL, Duration::from_secs(1800));
        assert_eq!(DEFAULT_EVICTION_INTERVAL, Duration::from_secs(60));
        assert!(DEFAULT_EVICTION_INTERVAL < DEFAULT_TTL);
    }
}
