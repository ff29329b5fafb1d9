//! Health-advisory bands for AQI values.

use serde::{Serialize, Serializer, ser::SerializeStruct};
use std::fmt;

/// AQI severity, in ascending order.
///
/// Serializes as `{ kind, label, color, advice, emoji }` so a front end gets
/// the whole advisory without its own lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeverityBand {
    Good,
    Moderate,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl SeverityBand {
    pub const fn all() -> &'static [SeverityBand] {
        &[
            SeverityBand::Good,
            SeverityBand::Moderate,
            SeverityBand::Unhealthy,
            SeverityBand::VeryUnhealthy,
            SeverityBand::Hazardous,
        ]
    }

    /// Stable snake_case identifier.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Moderate => "moderate",
            Self::Unhealthy => "unhealthy",
            Self::VeryUnhealthy => "very_unhealthy",
            Self::Hazardous => "hazardous",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }

    /// Color token for the rendering layer (hex RGB).
    pub fn color(&self) -> &'static str {
        match self {
            Self::Good => "#009966",
            Self::Moderate => "#ffde33",
            Self::Unhealthy => "#cc0033",
            Self::VeryUnhealthy => "#660099",
            Self::Hazardous => "#7e0023",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            Self::Good => "Air quality is satisfactory; enjoy outdoor activities.",
            Self::Moderate => {
                "Acceptable; unusually sensitive people should limit prolonged outdoor exertion."
            }
            Self::Unhealthy => "Everyone may feel effects; reduce prolonged outdoor exertion.",
            Self::VeryUnhealthy => "Health alert; avoid outdoor exertion and keep windows closed.",
            Self::Hazardous => "Emergency conditions; stay indoors and avoid all outdoor activity.",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Good => "😊",
            Self::Moderate => "😐",
            Self::Unhealthy => "😷",
            Self::VeryUnhealthy => "🤢",
            Self::Hazardous => "☠️",
        }
    }
}

impl fmt::Display for SeverityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for SeverityBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut band = serializer.serialize_struct("SeverityBand", 5)?;
        band.serialize_field("kind", self.kind())?;
        band.serialize_field("label", self.label())?;
        band.serialize_field("color", self.color())?;
        band.serialize_field("advice", self.advice())?;
        band.serialize_field("emoji", self.emoji())?;
        band.end()
    }
}

/// Classify an AQI value. Upper bounds are inclusive; negatives count as Good.
pub fn classify(aqi: i64) -> SeverityBand {
    match aqi {
        ..=50 => SeverityBand::Good,
        51..=100 => SeverityBand::Moderate,
        101..=200 => SeverityBand::Unhealthy,
        201..=300 => SeverityBand::VeryUnhealthy,
        _ => SeverityBand::Hazardous,
    }
}
