use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

const KELVIN_OFFSET: f64 = 273.15;

/// Longitude/latitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinates {
    /// Placeholder used for cities whose position has not been looked up yet.
    pub const UNRESOLVED: Coordinates = Coordinates { lon: 0.0, lat: 0.0 };

    pub fn new(lon: f64, lat: f64) -> Result<Self, CatalogError> {
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(CatalogError::InvalidCoordinates { lon, lat });
        }
        Ok(Self { lon, lat })
    }

    pub fn is_unresolved(&self) -> bool {
        *self == Self::UNRESOLVED
    }
}

/// A city known to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub coords: Coordinates,
    pub selected: bool,
    pub weather: Option<WeatherSnapshot>,
}

impl City {
    pub fn new(name: impl Into<String>, coords: Coordinates) -> Self {
        Self {
            name: name.into(),
            coords,
            selected: false,
            weather: None,
        }
    }
}

/// Canonical name and position returned by a geocode lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub coords: Coordinates,
}

/// Current conditions for one city, as reported by the weather service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Short category such as "Clear", "Clouds" or "Rain".
    pub category: String,
    pub description: String,
    pub temperature_k: f64,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    /// Unix seconds.
    pub sunrise: i64,
    /// Unix seconds.
    pub sunset: i64,
}

impl WeatherSnapshot {
    pub fn temperature_c(&self) -> f64 {
        kelvin_to_celsius(self.temperature_k)
    }

    pub fn sunrise_hhmm(&self) -> String {
        unix_to_hhmm(self.sunrise)
    }

    pub fn sunset_hhmm(&self) -> String {
        unix_to_hhmm(self.sunset)
    }
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// Render a Unix timestamp as `HH:MM` in the local timezone.
pub fn unix_to_hhmm(ts: i64) -> String {
    unix_to_hhmm_in(ts, &Local)
}

/// Same as [`unix_to_hhmm`] for an explicit timezone.
pub fn unix_to_hhmm_in<Tz: TimeZone>(ts: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match DateTime::<Utc>::from_timestamp(ts, 0) {
        Some(utc) => utc.with_timezone(tz).format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}
