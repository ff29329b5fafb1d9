use crate::{
    forecast::ForecastPayload,
    model::{AqiReading, CityKey},
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod waqi;

pub use waqi::WaqiFeedClient;

/// A successful feed answer: the current reading plus the untouched forecast block.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSuccess {
    pub reading: AqiReading,
    pub forecast: ForecastPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Transport,
}

/// Terminal, non-retryable outcome of a single feed call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The upstream answered but has no data for the city.
    #[error("No air-quality data for '{city}': {reason}")]
    NotFound { city: CityKey, reason: String },

    /// Network failure, non-success HTTP status, or an unreadable body.
    #[error("Air-quality feed request for '{city}' failed: {message}")]
    Transport { city: CityKey, message: String },
}

impl FeedError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FeedError::NotFound { .. } => FailureKind::NotFound,
            FeedError::Transport { .. } => FailureKind::Transport,
        }
    }

    pub fn city(&self) -> &CityKey {
        match self {
            FeedError::NotFound { city, .. } | FeedError::Transport { city, .. } => city,
        }
    }
}

/// Source of AQI readings keyed by city.
///
/// One call issues one request; implementations never retry or cache.
#[async_trait]
pub trait FeedClient: Send + Sync + Debug {
    async fn fetch(&self, city: &CityKey) -> Result<FeedSuccess, FeedError>;
}
