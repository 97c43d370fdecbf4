//! Coordinate validation
//!
//! Inputs arrive as decimal text. The parsed values go to the provider; the
//! original text is kept untouched because the cache key is derived from it.

use crate::cache::CacheKey;
use crate::error::{Error, Result};

/// Valid latitude range in degrees
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);

/// Valid longitude range in degrees
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// A validated latitude/longitude pair with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinates {
    latitude_text: String,
    longitude_text: String,
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    /// Parse and range-check both coordinates
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self> {
        let lat = parse_in_range("latitude", latitude, LATITUDE_RANGE)?;
        let lon = parse_in_range("longitude", longitude, LONGITUDE_RANGE)?;

        Ok(Self {
            latitude_text: latitude.to_string(),
            longitude_text: longitude.to_string(),
            latitude: lat,
            longitude: lon,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude_text(&self) -> &str {
        &self.latitude_text
    }

    pub fn longitude_text(&self) -> &str {
        &self.longitude_text
    }

    /// Cache key for these coordinates, derived from the raw text
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_coordinate_text(&self.latitude_text, &self.longitude_text)
    }
}

fn parse_in_range(field: &'static str, text: &str, (min, max): (f64, f64)) -> Result<f64> {
    if text.is_empty() {
        return Err(Error::InvalidCoordinate {
            field,
            reason: "value is required".into(),
        });
    }

    let value: f64 = text.parse().map_err(|_| Error::InvalidCoordinate {
        field,
        reason: format!("'{}' is not a number", text),
    })?;

    if !value.is_finite() || value < min || value > max {
        return Err(Error::InvalidCoordinate {
            field,
            reason: format!("{} is outside [{}, {}]", text, min, max),
        });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_valid() {
        let c = Coordinates::parse("12.500000", "-98.000000").unwrap();
        assert_eq!(c.latitude(), 12.5);
        assert_eq!(c.longitude(), -98.0);
        assert_eq!(c.latitude_text(), "12.500000");
        assert_eq!(c.cache_key().as_str(), "12.500000:-98.000000");
    }

    #[test]
    fn test_range_edges_are_inclusive() {
        assert!(Coordinates::parse("90", "180").is_ok());
        assert!(Coordinates::parse("-90", "-180").is_ok());
    }

    #[test]
    fn test_out_of_range() {
        assert_matches!(
            Coordinates::parse("90.0001", "0"),
            Err(Error::InvalidCoordinate { field: "latitude", .. })
        );
        assert_matches!(
            Coordinates::parse("0", "-180.5"),
            Err(Error::InvalidCoordinate { field: "longitude", .. })
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert_matches!(
            Coordinates::parse("", "1"),
            Err(Error::InvalidCoordinate { field: "latitude", .. })
        );
        assert_matches!(
            Coordinates::parse("north", "1"),
            Err(Error::InvalidCoordinate { field: "latitude", .. })
        );
        assert!(Coordinates::parse("NaN", "1").is_err());
        assert!(Coordinates::parse("1", "inf").is_err());
    }

    #[test]
    fn test_equal_values_different_keys() {
        let a = Coordinates::parse("40", "-75").unwrap();
        let b = Coordinates::parse("40.0", "-75.0").unwrap();

        assert_eq!(a.latitude(), b.latitude());
        assert_ne!(a.cache_key(), b.cache_key());
    }
}
