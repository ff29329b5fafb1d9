//! Core library for the `aqi` CLI.
//!
//! This crate defines:
//! - Configuration handling
//! - The air-quality feed client abstraction and its WAQI implementation
//! - Severity classification, city resolution and forecast normalization
//! - The view controller that orchestrates a query and publishes a view model
//!
//! It is used by `aqi-cli`, but any front end can drive a [`ViewController`].

pub mod config;
pub mod controller;
pub mod forecast;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod severity;

pub use config::Config;
pub use controller::{CompletionPolicy, ControllerSettings, Status, ViewController, ViewModel};
pub use forecast::{ForecastPayload, normalize};
pub use model::{AqiReading, CityKey, Coordinate, ForecastPoint};
pub use provider::{FailureKind, FeedClient, FeedError, FeedSuccess, WaqiFeedClient};
pub use resolver::{CityResolver, CityTable};
pub use severity::{SeverityBand, classify};
