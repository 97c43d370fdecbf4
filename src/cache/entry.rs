//! Cache Entry Types
//!
//! Keys are derived from the caller's raw coordinate text; entries pair an
//! opaque payload with the instant it was stored.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Bound for values the cache can hold.
///
/// The cache never looks inside a payload beyond asking whether it is empty,
/// so empty responses are never stored.
pub trait Payload: Clone + Send + Sync + 'static {
    /// Whether this payload carries no usable data
    fn is_empty(&self) -> bool {
        false
    }
}

impl Payload for String {
    fn is_empty(&self) -> bool {
        String::is_empty(self)
    }
}

impl<T: Payload> Payload for std::sync::Arc<T> {
    fn is_empty(&self) -> bool {
        T::is_empty(self)
    }
}

/// Cache key - canonical `"{lat}:{lon}"` text
///
/// Built from the raw input text, not the parsed numbers: `"12.5"` and
/// `"12.500000"` are different keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// The only key derivation function; used for lookup and storage alike.
    pub fn from_coordinate_text(latitude: &str, longitude: &str) -> Self {
        Self(format!("{}:{}", latitude, longitude))
    }

    /// Wrap an already-canonical key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key text
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A stored payload and the time it was fetched
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheEntry<P> {
    /// Provider response, opaque to the cache
    #[serde(rename = "data")]
    pub payload: P,
    /// When the payload was stored
    #[serde(rename = "timestamp")]
    pub stored_at: DateTime<Utc>,
}

impl<P> CacheEntry<P> {
    /// Create a new entry
    pub fn new(payload: P, stored_at: DateTime<Utc>) -> Self {
        Self { payload, stored_at }
    }

    /// Age of the entry relative to `now` (negative if `now` is earlier)
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.stored_at)
    }

    /// Fresh while `age < ttl`; an entry exactly `ttl` old is stale.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age_at(now) < ttl_delta(ttl)
    }

    /// Eligible for eviction once `age > ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age_at(now) > ttl_delta(ttl)
    }
}

/// Convert a TTL into a chrono delta, saturating on overflow
pub(crate) fn ttl_delta(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
}
