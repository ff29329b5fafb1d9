use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf, sync::Arc, time::Duration};

use crate::{
    controller::{CompletionPolicy, ControllerSettings},
    model::{CityKey, Coordinate},
    provider::{FeedClient, WaqiFeedClient, waqi::DEFAULT_BASE_URL},
    resolver::CityTable,
};

/// Public token accepted by WAQI for light, rate-limited use.
pub const DEMO_TOKEN: &str = "demo";

pub const DEFAULT_CITY: &str = "shanghai";

/// Upstream feed settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub token: Option<String>,

    /// Per-request timeout; no timeout when absent.
    pub timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: None,
        }
    }
}

/// A city coordinate entry in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CityEntry {
    pub lat: f64,
    pub lon: f64,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// City queried at startup, e.g. "shanghai".
    pub default_city: Option<String>,

    #[serde(default)]
    pub completion_policy: CompletionPolicy,

    #[serde(default)]
    pub feed: FeedConfig,

    /// Example TOML:
    /// [cities.lyon]
    /// lat = 45.764
    /// lon = 4.8357
    #[serde(default)]
    pub cities: BTreeMap<String, CityEntry>,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "aqi", "aqi-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Configured token, or the public demo token.
    pub fn token(&self) -> &str {
        self.feed
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEMO_TOKEN)
    }

    pub fn set_token(&mut self, token: String) {
        self.feed.token = Some(token);
    }

    pub fn default_city(&self) -> Result<CityKey> {
        let raw = self.default_city.as_deref().unwrap_or(DEFAULT_CITY);
        CityKey::normalize(raw).ok_or_else(|| {
            anyhow!(
                "Configured default city is blank.\n\
                 Hint: run `aqi configure` and enter a city name."
            )
        })
    }

    pub fn set_default_city(&mut self, city: &str) -> Result<()> {
        let key = CityKey::normalize(city).ok_or_else(|| anyhow!("City name is empty"))?;
        self.default_city = Some(key.to_string());
        Ok(())
    }

    /// Add or replace a city coordinate, validating its range.
    pub fn upsert_city(&mut self, name: &str, lat: f64, lon: f64) -> Result<()> {
        Coordinate::new(lat, lon).with_context(|| format!("Invalid coordinate for '{name}'"))?;
        let key = CityKey::normalize(name).ok_or_else(|| anyhow!("City name is empty"))?;
        self.cities.insert(key.to_string(), CityEntry { lat, lon });
        Ok(())
    }

    /// Built-in cities with the `[cities]` section layered on top.
    pub fn city_table(&self) -> Result<CityTable> {
        let overrides = self.cities.iter().map(|(name, c)| (name.as_str(), c.lat, c.lon));
        CityTable::builtin()
            .with_overrides(overrides)
            .context("Invalid entry in [cities] config section")
    }

    pub fn feed_client(&self) -> Result<Arc<dyn FeedClient>> {
        let client = match self.feed.timeout_secs {
            Some(secs) => WaqiFeedClient::with_timeout(
                self.feed.base_url.clone(),
                self.token(),
                Duration::from_secs(secs),
            )?,
            None => WaqiFeedClient::new(self.feed.base_url.clone(), self.token()),
        };
        Ok(Arc::new(client))
    }

    pub fn controller_settings(&self) -> Result<ControllerSettings> {
        Ok(ControllerSettings {
            default_city: self.default_city()?,
            fallback_coordinate: Coordinate::new(0.0, 0.0)?,
            policy: self.completion_policy,
        })
    }
}
