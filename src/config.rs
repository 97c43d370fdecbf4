//! Service Configuration
//!
//! Settings come from three layers, highest precedence first: command-line
//! flags (or their environment variables), an optional YAML file, then the
//! built-in defaults.
//!
//! ```yaml
//! listen_port: 8080
//! metrics_addr: 0.0.0.0:9090
//! openweather:
//!   api_url: https://api.openweathermap.org/data/2.5/weather
//!   units: imperial
//! cache:
//!   ttl: 30m
//!   eviction_interval: 1m
//!   fetch_timeout: 10s
//!   max_retries: 2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, DEFAULT_EVICTION_INTERVAL, DEFAULT_SHARD_COUNT, DEFAULT_TTL};
use crate::error::{Error, Result};
use crate::provider::OpenWeatherConfig;

/// Top-level settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Port of the weather API listener
    pub listen_port: u16,

    /// Bind address of the Prometheus listener
    pub metrics_addr: String,

    pub openweather: ProviderSettings,

    pub cache: CacheSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            metrics_addr: "0.0.0.0:9090".to_string(),
            openweather: ProviderSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse settings from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

/// OpenWeather client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    pub api_url: String,

    /// Usually supplied through `OPENWEATHER_API_KEY` rather than the file
    pub api_key: Option<String>,

    pub units: String,

    #[serde(with = "duration_text")]
    pub request_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        let defaults = OpenWeatherConfig::default();
        Self {
            api_url: defaults.api_url,
            api_key: None,
            units: defaults.units,
            request_timeout: defaults.request_timeout,
        }
    }
}

impl ProviderSettings {
    pub fn to_provider_config(&self) -> OpenWeatherConfig {
        OpenWeatherConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone().unwrap_or_default(),
            units: self.units.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

/// Cache tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(with = "duration_text")]
    pub ttl: Duration,

    #[serde(with = "duration_text")]
    pub eviction_interval: Duration,

    pub shard_count: usize,

    pub coalesce_fetches: bool,

    /// `none` disables the per-attempt bound
    #[serde(with = "optional_duration_text")]
    pub fetch_timeout: Option<Duration>,

    pub max_retries: u32,

    #[serde(with = "duration_text")]
    pub retry_backoff: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            ttl: DEFAULT_TTL,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            shard_count: DEFAULT_SHARD_COUNT,
            coalesce_fetches: defaults.coalesce_fetches,
            fetch_timeout: defaults.fetch_timeout,
            max_retries: defaults.max_retries,
            retry_backoff: defaults.retry_backoff,
        }
    }
}

impl TryFrom<&CacheSettings> for CacheConfig {
    type Error = Error;

    fn try_from(settings: &CacheSettings) -> Result<Self> {
        let config = CacheConfig {
            ttl: settings.ttl,
            eviction_interval: settings.eviction_interval,
            shard_count: settings.shard_count,
            coalesce_fetches: settings.coalesce_fetches,
            fetch_timeout: settings.fetch_timeout,
            max_retries: settings.max_retries,
            retry_backoff: settings.retry_backoff,
        };
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parse a duration string like "30m", "1h30m", "250ms" or "2d".
///
/// A trailing bare number is taken as seconds. Units are case-insensitive.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut num_buf = String::new();
    let mut unit_buf = String::new();

    let mut flush = |num_buf: &mut String, unit_buf: &mut String| -> Result<()> {
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;

        let step = match unit_buf.to_ascii_lowercase().as_str() {
            "ms" => Duration::from_millis(num),
            "s" | "" => Duration::from_secs(num),
            "m" => Duration::from_secs(num.saturating_mul(60)),
            "h" => Duration::from_secs(num.saturating_mul(3600)),
            "d" => Duration::from_secs(num.saturating_mul(86400)),
            unit => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    unit
                )))
            }
        };
        total = total.saturating_add(step);
        num_buf.clear();
        unit_buf.clear();
        Ok(())
    };

    for c in s.chars() {
        if c.is_ascii_digit() {
            if !unit_buf.is_empty() {
                flush(&mut num_buf, &mut unit_buf)?;
            }
            num_buf.push(c);
        } else if c.is_ascii_alphabetic() {
            unit_buf.push(c);
        } else {
            return Err(Error::DurationParse(format!(
                "unexpected character '{}' in duration: {}",
                c, s
            )));
        }
    }
    flush(&mut num_buf, &mut unit_buf)?;

    if total.is_zero() {
        return Err(Error::DurationParse(
            "duration must be greater than 0".to_string(),
        ));
    }

    Ok(total)
}

/// Like [`parse_duration`], but `none`/`off` mean no bound
pub fn parse_optional_duration(s: &str) -> Result<Option<Duration>> {
    match s.trim().to_ascii_lowercase().as_str() {
        "none" | "off" => Ok(None),
        _ => parse_duration(s).map(Some),
    }
}

/// Render a duration in the largest whole unit
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = d.as_secs();
    match secs {
        s if s % 86400 == 0 && s > 0 => format!("{}d", s / 86400),
        s if s % 3600 == 0 && s > 0 => format!("{}h", s / 3600),
        s if s % 60 == 0 && s > 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        super::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

mod optional_duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_str(&super::format_duration(*d)),
            None => s.serialize_str("none"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let text = String::deserialize(d)?;
        super::parse_optional_duration(&text).map_err(serde::de::Error::custom)
    }
}
