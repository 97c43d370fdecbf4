//! Property-Based Tests for the Cache Core
//!
//! Uses proptest to check freshness and eviction rules across arbitrary
//! entry ages and key text.
//!
//! # Test Properties
//!
//! 1. **Key Stability**: identical coordinate text always yields the same key
//! 2. **No Normalization**: distinct text yields distinct keys, even when numerically equal
//! 3. **Sweeper Correctness**: after one pass exactly the entries with `age > ttl` are gone
//! 4. **Freshness**: a lookup calls the provider iff `age >= ttl`

#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use super::clock::{Clock, ManualClock};
use super::entry::{CacheEntry, CacheKey};
use super::manager::{CacheConfig, ReadThroughCache};
use super::metrics::CacheMetrics;
use super::store::EntryStore;
use super::sweeper::EvictionSweeper;
use crate::error::ProviderError;

const TTL_SECS: u64 = 1800;

// =============================================================================
// Property Strategies
// =============================================================================

/// Decimal text the way callers send it: optional sign, digits, optional fraction.
fn coordinate_text_strategy() -> impl Strategy<Value = String> {
    "-?[0-9]{1,3}(\\.[0-9]{0,6})?"
}

/// Entry ages in seconds clustered around the TTL boundary.
fn age_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        0u64..TTL_SECS * 2,
        (TTL_SECS - 2)..=(TTL_SECS + 2),
    ]
}

fn aged_entries_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(age_strategy(), 0..64)
}

fn stored_at(clock: &ManualClock, age_secs: u64) -> chrono::DateTime<chrono::Utc> {
    clock.now() - chrono::Duration::seconds(age_secs as i64)
}

// =============================================================================
// Key Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_key_is_stable(lat in coordinate_text_strategy(), lon in coordinate_text_strategy()) {
        let a = CacheKey::from_coordinate_text(&lat, &lon);
        let b = CacheKey::from_coordinate_text(&lat, &lon);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.as_str(), format!("{}:{}", lat, lon));
    }

    #[test]
    fn prop_trailing_zeros_change_the_key(lat in "[0-9]{1,2}\\.[0-9]{1,3}", lon in "-?[0-9]{1,3}") {
        let plain = CacheKey::from_coordinate_text(&lat, &lon);
        let padded = CacheKey::from_coordinate_text(&format!("{}000", lat), &lon);

        // Same number, different text, different key
        prop_assert_eq!(
            lat.parse::<f64>().unwrap(),
            format!("{}000", lat).parse::<f64>().unwrap()
        );
        prop_assert_ne!(plain, padded);
    }
}

// =============================================================================
// Sweeper Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_sweep_removes_exactly_expired(ages in aged_entries_strategy()) {
        let clock = Arc::new(ManualClock::at_epoch());
        clock.advance(Duration::from_secs(TTL_SECS * 4));
        let store = Arc::new(EntryStore::new(8));

        for (i, age) in ages.iter().enumerate() {
            store.put(
                CacheKey::new(format!("k{}", i)),
                CacheEntry::new(format!("payload-{}", i), stored_at(&clock, *age)),
            );
        }

        let sweeper = EvictionSweeper::new(
            Arc::clone(&store),
            clock.clone(),
            Arc::new(CacheMetrics::new()),
            Duration::from_secs(TTL_SECS),
            Duration::from_secs(60),
        );
        let removed = sweeper.sweep_once();

        let expected_removed = ages.iter().filter(|a| **a > TTL_SECS).count();
        prop_assert_eq!(removed, expected_removed);

        for (i, age) in ages.iter().enumerate() {
            let entry = store.get(&CacheKey::new(format!("k{}", i)));
            if *age > TTL_SECS {
                prop_assert!(entry.is_none());
            } else {
                let entry = entry.unwrap();
                prop_assert_eq!(entry.payload, format!("payload-{}", i));
                prop_assert_eq!(entry.stored_at, stored_at(&clock, *age));
            }
        }
    }
}

// =============================================================================
// Freshness Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_provider_called_iff_stale(age in age_strategy()) {
        let clock = Arc::new(ManualClock::at_epoch());
        let config = CacheConfig {
            ttl: Duration::from_secs(TTL_SECS),
            ..CacheConfig::baseline()
        };
        let cache = ReadThroughCache::with_clock(config, clock.clone()).unwrap();
        let key = CacheKey::new("40.0:-75.0");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetch = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, ProviderError>(format!("P{}", n)) }
        };

        let first = tokio_test::block_on(cache.get_or_fetch(&key, fetch.clone())).unwrap();
        prop_assert_eq!(first.as_str(), "P1");

        clock.advance(Duration::from_secs(age));
        let second = tokio_test::block_on(cache.get_or_fetch(&key, fetch)).unwrap();

        if age < TTL_SECS {
            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
            prop_assert_eq!(second.as_str(), "P1");
        } else {
            prop_assert_eq!(calls.load(Ordering::SeqCst), 2);
            prop_assert_eq!(second.as_str(), "P2");
        }
    }
}
