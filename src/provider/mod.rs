//! Data Provider Port
//!
//! The cache depends only on this trait; concrete providers live in the
//! submodules.
//!
//! ```text
//! ┌───────────────────────┐        ┌──────────────────────────┐
//! │   ReadThroughCache    │──────▶ │   DataProvider (trait)   │
//! └───────────────────────┘        └────────────┬─────────────┘
//!                                               │
//!                                  ┌────────────▼─────────────┐
//!                                  │   OpenWeatherProvider    │
//!                                  └──────────────────────────┘
//! ```

mod openweather;

pub use openweather::{
    Clouds, Condition, Coord, MainReadings, OpenWeatherConfig, OpenWeatherProvider, SysInfo,
    WeatherReport, Wind,
};

use async_trait::async_trait;

use crate::cache::Payload;
use crate::error::ProviderResult;

/// Source of fresh payloads for a coordinate pair
#[async_trait]
pub trait DataProvider: Send + Sync + 'static {
    /// Response type; opaque to the cache
    type Payload: Payload;

    /// Perform one round trip to the provider
    async fn fetch(&self, latitude: f64, longitude: f64) -> ProviderResult<Self::Payload>;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "provider"
    }
}
