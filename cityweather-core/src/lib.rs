//! Core library for the `cityweather` CLI.
//!
//! This crate defines:
//! - The city catalog and "My List" favorites partition
//! - Concurrent weather fetch rounds over a set of selected cities
//! - Place lookups (forward and reverse geocoding) and favorites persistence
//! - Configuration, the OpenWeather client and shared domain models
//!
//! It is used by `cityweather-cli`, but can also be driven by other front ends.

pub mod app;
pub mod catalog;
pub mod config;
pub mod error;
pub mod favorites;
pub mod geocode;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod seed;

pub use app::CityWeatherApp;
pub use catalog::CityCatalog;
pub use config::{Config, FetchConfig};
pub use error::{AppError, CatalogError, FetchError, GeocodeError};
pub use favorites::FavoritesStore;
pub use geocode::{GeocodeQuery, GeocodeResolver};
pub use model::{City, Coordinates, Place, WeatherSnapshot};
pub use orchestrator::{RoundHandle, RoundLatch, RoundReport, WeatherFetchOrchestrator};
pub use provider::{Geocoder, WeatherProvider, openweather::OpenWeatherProvider};
