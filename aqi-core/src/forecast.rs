//! Extraction of daily pollutant series from the feed's `forecast` block.
//!
//! Every level of `forecast.daily.<pollutant>[*]` is optional. A level that is
//! missing or has an unexpected JSON type is treated as absent, so the result
//! is an empty series rather than an error.

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

use crate::model::ForecastPoint;

/// The raw `forecast` sub-document, passed through untouched by the feed client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastPayload(Option<Value>);

impl ForecastPayload {
    pub fn new(raw: Option<Value>) -> Self {
        Self(raw)
    }

    pub fn absent() -> Self {
        Self(None)
    }

    pub fn raw(&self) -> Option<&Value> {
        self.0.as_ref()
    }
}

/// Daily series published by the WAQI feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pollutant {
    Pm25,
    Pm10,
    O3,
    Uvi,
}

#[derive(Debug, Default, Deserialize)]
struct RawForecast {
    #[serde(default, deserialize_with = "lenient")]
    daily: Option<RawDaily>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDaily {
    #[serde(default, deserialize_with = "lenient")]
    pm25: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    pm10: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    o3: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    uvi: Option<Vec<Value>>,
}

impl RawDaily {
    fn series(self, pollutant: Pollutant) -> Option<Vec<Value>> {
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::O3 => self.o3,
            Pollutant::Uvi => self.uvi,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    day: String,
    avg: f64,
}

/// Deserialize a field, mapping a shape mismatch to `None`.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Daily PM2.5 averages, in upstream order.
pub fn normalize(payload: &ForecastPayload) -> Vec<ForecastPoint> {
    normalize_pollutant(payload, Pollutant::Pm25)
}

/// Daily averages for `pollutant`, in upstream order. Malformed entries are skipped.
pub fn normalize_pollutant(payload: &ForecastPayload, pollutant: Pollutant) -> Vec<ForecastPoint> {
    let Some(raw) = payload.raw() else {
        return Vec::new();
    };

    let forecast: RawForecast = serde_json::from_value(raw.clone()).unwrap_or_default();

    forecast
        .daily
        .and_then(|daily| daily.series(pollutant))
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawPoint>(entry).ok())
        .map(|p| ForecastPoint {
            day: p.day,
            value: p.avg,
        })
        .collect()
}
