use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::{
    forecast::{ForecastPayload, lenient},
    model::{AqiReading, CityKey},
    provider::{FeedClient, FeedError, FeedSuccess},
};

pub const DEFAULT_BASE_URL: &str = "https://api.waqi.info";

/// Client for the World Air Quality Index city feed (`/feed/{city}/`).
#[derive(Debug, Clone)]
pub struct WaqiFeedClient {
    base_url: String,
    token: String,
    http: Client,
}

impl WaqiFeedClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            http: Client::new(),
        }
    }

    /// Like [`WaqiFeedClient::new`], with a per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for the WAQI feed")?;

        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            http,
        })
    }

    fn feed_url(&self, city: &CityKey) -> String {
        format!(
            "{}/feed/{}/",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(city.as_str())
        )
    }

    async fn fetch_body(&self, city: &CityKey) -> Result<String> {
        let res = self
            .http
            .get(self.feed_url(city))
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .context("Failed to send request to WAQI")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read WAQI response body")?;

        if !status.is_success() {
            anyhow::bail!(
                "WAQI request failed with status {}: {}",
                status,
                truncate_body(&body)
            );
        }

        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct WaqiEnvelope {
    status: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct WaqiStation {
    aqi: WaqiAqi,
    #[serde(default, deserialize_with = "lenient")]
    city: Option<WaqiCity>,
    #[serde(default, deserialize_with = "lenient")]
    dominentpol: Option<String>,
    #[serde(default)]
    forecast: Option<Value>,
}

/// WAQI sends `"-"` in place of a number when a station has no current reading.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WaqiAqi {
    Value(u32),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct WaqiCity {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
}

fn parse_feed(city: &CityKey, body: &str) -> Result<FeedSuccess, FeedError> {
    let transport = |err: anyhow::Error| FeedError::Transport {
        city: city.clone(),
        message: format!("{err:#}"),
    };

    let envelope: WaqiEnvelope = serde_json::from_str(body)
        .context("Failed to parse WAQI JSON")
        .map_err(transport)?;

    if envelope.status != "ok" {
        let reason = match envelope.data {
            Value::String(msg) => msg,
            _ => format!("upstream status '{}'", envelope.status),
        };
        return Err(FeedError::NotFound {
            city: city.clone(),
            reason,
        });
    }

    let station: WaqiStation = serde_json::from_value(envelope.data)
        .context("Failed to parse WAQI station data")
        .map_err(transport)?;

    // Without a usable station name, the requested city stands in for it.
    let station_name = station
        .city
        .and_then(|c| c.name)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| city.to_string());

    let value = match station.aqi {
        WaqiAqi::Value(value) => value,
        WaqiAqi::Text(raw) => match raw.trim().parse::<u32>() {
            Ok(value) => value,
            Err(_) if raw.trim() == "-" => {
                return Err(FeedError::NotFound {
                    city: city.clone(),
                    reason: format!("station '{station_name}' reported no reading"),
                });
            }
            Err(_) => {
                return Err(transport(anyhow::anyhow!(
                    "WAQI station '{station_name}' sent an unreadable AQI '{raw}'"
                )));
            }
        },
    };

    Ok(FeedSuccess {
        reading: AqiReading {
            value,
            station_name,
            dominant_pollutant: station.dominentpol.filter(|p| !p.is_empty()),
        },
        forecast: ForecastPayload::new(station.forecast),
    })
}

#[async_trait]
impl FeedClient for WaqiFeedClient {
    async fn fetch(&self, city: &CityKey) -> Result<FeedSuccess, FeedError> {
        tracing::debug!(%city, "requesting WAQI feed");

        let outcome = match self.fetch_body(city).await {
            Ok(body) => parse_feed(city, &body),
            Err(err) => Err(FeedError::Transport {
                city: city.clone(),
                message: format!("{err:#}"),
            }),
        };

        match &outcome {
            Ok(success) => tracing::debug!(
                %city,
                aqi = success.reading.value,
                station = %success.reading.station_name,
                "WAQI feed answered"
            ),
            Err(err) => tracing::warn!(%city, "{err}"),
        }

        outcome
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
