//! Weather Cache - Read-Through TTL Cache for a Weather Provider
//!
//! Serves current-weather lookups keyed by latitude/longitude text from an
//! in-memory cache, calling the upstream provider only when the stored entry
//! is missing or older than the configured TTL. A background sweeper removes
//! expired entries.
//!
//! # Architecture
//!
//! ```text
//! HTTP (server) → WeatherService → ReadThroughCache → DataProvider
//!                                        ↑
//!                                 EvictionSweeper
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Entry store, eviction sweeper and read-through orchestration
//! - [`config`] - Settings file and duration parsing
//! - [`coordinates`] - Coordinate validation and key derivation
//! - [`error`] - Error types
//! - [`provider`] - Data provider port and the OpenWeather client
//! - [`server`] - HTTP API and Prometheus listeners
//! - [`service`] - Validation + cache + provider wiring

pub mod cache;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod provider;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheEntry, CacheKey, ReadThroughCache};
pub use coordinates::Coordinates;
pub use error::{Error, ProviderError, Result};
pub use provider::{DataProvider, OpenWeatherProvider, WeatherReport};
pub use service::WeatherService;
