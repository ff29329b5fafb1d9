//! Plain-text rendering of query results.

use std::fmt::Write;

use aqi_core::{CityTable, Status, ViewModel};

const BAR_WIDTH: f64 = 40.0;
const BAR_SCALE_MAX: f64 = 300.0;

pub fn render_view(view: &ViewModel) -> String {
    let mut out = String::new();

    match (&view.reading, view.band) {
        (Some(reading), Some(band)) => {
            let _ = writeln!(out, "Station:  {}", reading.station_name);
            let _ = writeln!(out, "AQI:      {}", reading.value);
            let _ = writeln!(out, "Status:   {} {}", band.label(), band.emoji());
            let _ = writeln!(out, "Advice:   {}", band.advice());
            if let Some(pol) = &reading.dominant_pollutant {
                let _ = writeln!(out, "Dominant: {pol}");
            }
        }
        _ => {
            let _ = writeln!(out, "No air-quality data yet.");
        }
    }

    let _ = writeln!(out, "Map:      {}", view.coordinate);

    if !view.forecast.is_empty() {
        let _ = writeln!(out, "\nPM2.5 daily forecast:");
        for point in &view.forecast {
            let day = point
                .date()
                .map(|d| d.format("%a %Y-%m-%d").to_string())
                .unwrap_or_else(|| point.day.clone());
            let _ = writeln!(out, "  {day:<14} {:>6.1} {}", point.value, bar(point.value));
        }
    }

    if let (Status::Error, Some(err)) = (view.status, &view.error) {
        let _ = writeln!(out, "\nError: {err}");
    }

    out
}

fn bar(value: f64) -> String {
    let filled = (value.clamp(0.0, BAR_SCALE_MAX) / BAR_SCALE_MAX * BAR_WIDTH).round() as usize;
    "#".repeat(filled)
}

pub fn render_cities(table: &CityTable) -> String {
    let mut out = String::new();
    for (key, coord) in table.iter() {
        let _ = writeln!(out, "{:<16} {coord}", key.as_str());
    }
    out
}
