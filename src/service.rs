//! Weather Service
//!
//! Ties coordinate validation, the read-through cache and a [`DataProvider`]
//! together. This is the surface the HTTP layer talks to.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::cache::{
    CacheConfig, CacheEntry, CacheKey, Clock, MetricsSnapshot, ReadThroughCache, SystemClock,
};
use crate::coordinates::Coordinates;
use crate::error::Result;
use crate::provider::DataProvider;

/// Read-through weather lookups for one provider
pub struct WeatherService<D: DataProvider> {
    provider: Arc<D>,
    cache: ReadThroughCache<D::Payload>,
}

impl<D: DataProvider> WeatherService<D> {
    /// Create a service on the wall clock
    pub fn new(config: CacheConfig, provider: D) -> Result<Self> {
        Self::with_clock(config, provider, Arc::new(SystemClock))
    }

    /// Create a service reading time from `clock`
    pub fn with_clock(config: CacheConfig, provider: D, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            provider: Arc::new(provider),
            cache: ReadThroughCache::with_clock(config, clock)?,
        })
    }

    /// Current payload for validated coordinates
    #[instrument(skip(self, coordinates), fields(key = %coordinates.cache_key()))]
    pub async fn resolve(&self, coordinates: &Coordinates) -> Result<D::Payload> {
        let key = coordinates.cache_key();
        let (latitude, longitude) = (coordinates.latitude(), coordinates.longitude());
        let provider = Arc::clone(&self.provider);

        debug!(provider = provider.name(), "Resolving");
        self.cache
            .get_or_fetch(&key, move || {
                let provider = Arc::clone(&provider);
                async move { provider.fetch(latitude, longitude).await }
            })
            .await
    }

    /// Validate raw coordinate text, then resolve it
    pub async fn resolve_text(&self, latitude: &str, longitude: &str) -> Result<D::Payload> {
        let coordinates = Coordinates::parse(latitude, longitude)?;
        self.resolve(&coordinates).await
    }

    /// Copy of every stored entry
    pub fn snapshot(&self) -> HashMap<CacheKey, CacheEntry<D::Payload>> {
        self.cache.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.cache.metrics()
    }

    /// Start background eviction
    pub fn start(&self) -> Result<()> {
        self.cache.start()
    }

    /// Stop background eviction and wait for the sweeper to exit
    pub async fn stop(&self) {
        self.cache.stop().await
    }

    /// The underlying cache
    pub fn cache(&self) -> &ReadThroughCache<D::Payload> {
        &self.cache
    }

    pub fn provider(&self) -> &D {
        &self.provider
    }
}

impl<D: DataProvider> std::fmt::Debug for WeatherService<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherService")
            .field("provider", &self.provider.name())
            .field("cache", &self.cache)
            .finish()
    }
}
