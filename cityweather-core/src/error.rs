//! Error types for catalog mutation, geocoding and fetch rounds.
//!
//! Catalog and round errors are returned synchronously to the caller; per-city
//! fetch failures never surface here and are only logged by the orchestrator.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("City '{0}' already exists")]
    DuplicateCity(String),

    #[error("City '{0}' is in My List and cannot be deleted")]
    ProtectedEntry(String),

    #[error("City '{0}' is not in the catalog")]
    UnknownCity(String),

    #[error("City '{0}' is in My List and cannot be selected from the catalog")]
    NotSelectable(String),

    #[error("City name must not be empty")]
    EmptyName,

    #[error("City name {0:?} contains a line break")]
    InvalidName(String),

    #[error("Coordinates out of range: lon={lon}, lat={lat}")]
    InvalidCoordinates { lon: f64, lat: f64 },
}

impl CatalogError {
    pub fn user_message(&self) -> &'static str {
        match self {
            CatalogError::DuplicateCity(_) => "That city is already in one of your lists.",
            CatalogError::ProtectedEntry(_) => "Cannot delete a city that is in 'My List'.",
            CatalogError::UnknownCity(_) => "That city is not in the list.",
            CatalogError::NotSelectable(_) => "Cities in 'My List' can not be selected here.",
            CatalogError::EmptyName => "Please enter a city name.",
            CatalogError::InvalidName(_) => "City names must fit on one line.",
            CatalogError::InvalidCoordinates { .. } => "The city position is invalid.",
        }
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("No place found for {0}")]
    NotFound(String),

    #[error("Geocode lookup failed: {0:#}")]
    LookupFailed(anyhow::Error),
}

impl GeocodeError {
    pub fn user_message(&self) -> &'static str {
        match self {
            GeocodeError::NotFound(_) => "City not found. Check the name and try again.",
            GeocodeError::LookupFailed(_) => {
                "Could not reach the lookup service. Please try again."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("No cities selected")]
    NoSelection,
}

impl FetchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::NoSelection => "Please select at least one city to see the weather.",
        }
    }
}

/// Errors surfaced by [`crate::CityWeatherApp`] operations.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to save My List: {0:#}")]
    Persist(anyhow::Error),
}

impl AppError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Catalog(e) => e.user_message(),
            AppError::Geocode(e) => e.user_message(),
            AppError::Fetch(e) => e.user_message(),
            AppError::Persist(_) => "My List could not be saved, so it was left unchanged.",
        }
    }
}
