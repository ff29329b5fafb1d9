//! City name to map coordinate resolution.

use std::{collections::BTreeMap, fmt::Debug};

use crate::model::{CityKey, Coordinate, InvalidCoordinate};

/// Resolves a city key to a map position.
///
/// `None` is a miss. Implementations never hold controller state; whether a
/// miss keeps the previous coordinate is the caller's decision.
pub trait CityResolver: Send + Sync + Debug {
    fn resolve(&self, key: &CityKey) -> Option<Coordinate>;
}

const BUILTIN_CITIES: &[(&str, f64, f64)] = &[
    ("beijing", 39.9042, 116.4074),
    ("delhi", 28.6139, 77.2090),
    ("hongkong", 22.3193, 114.1694),
    ("london", 51.5074, -0.1278),
    ("losangeles", 34.0522, -118.2437),
    ("mumbai", 19.0760, 72.8777),
    ("newyork", 40.7128, -74.0060),
    ("paris", 48.8566, 2.3522),
    ("saopaulo", -23.5505, -46.6333),
    ("seoul", 37.5665, 126.9780),
    ("shanghai", 31.2304, 121.4737),
    ("singapore", 1.3521, 103.8198),
    ("sydney", -33.8688, 151.2093),
    ("tokyo", 35.6762, 139.6503),
];

/// Static exact-match table of known cities.
#[derive(Debug, Clone, Default)]
pub struct CityTable {
    entries: BTreeMap<CityKey, Coordinate>,
}

impl CityTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The bundled dataset of major cities.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for &(name, lat, lon) in BUILTIN_CITIES {
            if let (Some(key), Ok(coord)) = (CityKey::normalize(name), Coordinate::new(lat, lon)) {
                table.entries.insert(key, coord);
            }
        }
        table
    }

    /// Insert or replace an entry. Names are normalized like user input.
    pub fn insert(
        &mut self,
        name: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), InvalidCoordinate> {
        let coord = Coordinate::new(latitude, longitude)?;
        if let Some(key) = CityKey::normalize(name) {
            self.entries.insert(key, coord);
        }
        Ok(())
    }

    /// Layer `overrides` on top of this table, replacing entries with the same key.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Result<Self, InvalidCoordinate>
    where
        I: IntoIterator<Item = (&'a str, f64, f64)>,
    {
        for (name, lat, lon) in overrides {
            self.insert(name, lat, lon)?;
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CityKey, &Coordinate)> {
        self.entries.iter()
    }
}

impl CityResolver for CityTable {
    fn resolve(&self, key: &CityKey) -> Option<Coordinate> {
        self.entries.get(key).copied()
    }
}
