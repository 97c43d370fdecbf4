//! OpenWeather Provider
//!
//! Fetches current conditions from the OpenWeather current-weather endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::DataProvider;
use crate::cache::Payload;
use crate::error::{Error, ProviderError, ProviderResult, Result};

/// Default current-weather endpoint
pub const DEFAULT_API_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the OpenWeather client
#[derive(Debug, Clone)]
pub struct OpenWeatherConfig {
    /// Endpoint URL
    pub api_url: String,

    /// API key sent as `appid`
    pub api_key: String,

    /// Unit system (`imperial`, `metric`, `standard`)
    pub units: String,

    /// HTTP client timeout
    pub request_timeout: Duration,
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            units: "imperial".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Current-weather response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherReport {
    pub coord: Coord,
    pub weather: Vec<Condition>,
    pub base: String,
    pub main: MainReadings,
    pub visibility: i64,
    pub wind: Wind,
    pub clouds: Clouds,
    pub dt: i64,
    pub sys: SysInfo,
    pub timezone: i64,
    pub id: i64,
    pub name: String,
    pub cod: i64,
}

impl WeatherReport {
    /// Headline condition (e.g. "Clouds")
    pub fn condition(&self) -> Option<&str> {
        self.weather.first().map(|c| c.main.as_str())
    }
}

impl Payload for WeatherReport {
    fn is_empty(&self) -> bool {
        self.weather.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    pub id: i64,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MainReadings {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: i64,
    pub humidity: i64,
    pub sea_level: i64,
    pub grnd_level: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wind {
    pub speed: f64,
    pub deg: i64,
    pub gust: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Clouds {
    pub all: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysInfo {
    #[serde(rename = "type")]
    pub kind: i64,
    pub id: i64,
    pub country: String,
    pub sunrise: i64,
    pub sunset: i64,
}

// =============================================================================
// Provider
// =============================================================================

/// OpenWeather current-weather client
pub struct OpenWeatherProvider {
    config: OpenWeatherConfig,
    client: Client,
}

impl OpenWeatherProvider {
    /// Create a new provider
    pub fn new(config: OpenWeatherConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("OpenWeather API key is required".into()));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Query parameters for one request; coordinates are sent with six decimals
    fn query(&self, latitude: f64, longitude: f64) -> [(&'static str, String); 4] {
        [
            ("lat", format!("{:.6}", latitude)),
            ("lon", format!("{:.6}", longitude)),
            ("appid", self.config.api_key.clone()),
            ("units", self.config.units.clone()),
        ]
    }
}

impl std::fmt::Debug for OpenWeatherProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherProvider")
            .field("api_url", &self.config.api_url)
            .field("units", &self.config.units)
            .finish()
    }
}

#[async_trait]
impl DataProvider for OpenWeatherProvider {
    type Payload = WeatherReport;

    #[instrument(skip(self))]
    async fn fetch(&self, latitude: f64, longitude: f64) -> ProviderResult<WeatherReport> {
        debug!("Querying OpenWeather");

        let response = self
            .client
            .get(&self.config.api_url)
            .query(&self.query(latitude, longitude))
            .send()
            .await
            .map_err(ProviderError::from)?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                status: response.status().as_u16(),
            });
        }

        let report: WeatherReport = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        debug!(name = %report.name, "OpenWeather answered");
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "openweather"
    }
}
