use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized city identifier: lowercase, all whitespace removed.
///
/// The same key is used for the coordinate table lookup and as the upstream
/// request path segment, so `"New York"` and `"new york"` are one city.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityKey(String);

impl CityKey {
    /// Normalize free-text input into a key. Returns `None` if nothing is left.
    pub fn normalize(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A successful AQI observation from the nearest monitored station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AqiReading {
    pub value: u32,
    /// Station reported by the upstream; may differ from the requested city.
    pub station_name: String,
    pub dominant_pollutant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("coordinate out of range: lat {latitude}, lon {longitude}")]
pub struct InvalidCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Map position. Always within lat [-90, 90], lon [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinate> {
        if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// One day of a pollutant forecast, in upstream (chronological) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Day label as sent by the upstream, normally an ISO date.
    pub day: String,
    pub value: f64,
}

impl ForecastPoint {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.day, "%Y-%m-%d").ok()
    }
}
