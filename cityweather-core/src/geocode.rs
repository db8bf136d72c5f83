//! Turns user input or random positions into a named place.

use rand::Rng;
use std::{fmt, sync::Arc};

use crate::{
    error::GeocodeError,
    model::{Coordinates, Place},
    provider::Geocoder,
};

#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeQuery {
    /// Free-text place name (forward lookup).
    Name(String),
    /// Position to name (reverse lookup).
    Coordinates(Coordinates),
}

impl GeocodeQuery {
    /// Reverse query for a uniformly random point on the globe.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        GeocodeQuery::Coordinates(Coordinates {
            lon: rng.gen_range(-180.0..=180.0),
            lat: rng.gen_range(-90.0..=90.0),
        })
    }
}

impl fmt::Display for GeocodeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodeQuery::Name(name) => write!(f, "'{name}'"),
            GeocodeQuery::Coordinates(c) => write!(f, "lat={:.4}, lon={:.4}", c.lat, c.lon),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeocodeResolver {
    geocoder: Arc<dyn Geocoder>,
}

impl GeocodeResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    /// Resolve `query` with a single lookup, taking the first candidate.
    ///
    /// Forward lookups keep the name as typed by the user; reverse lookups
    /// take the name the service reports.
    pub async fn resolve(&self, query: &GeocodeQuery) -> Result<Place, GeocodeError> {
        let found = match query {
            GeocodeQuery::Name(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(GeocodeError::NotFound(query.to_string()));
                }
                self.geocoder
                    .lookup_name(name)
                    .await
                    .map(|place| {
                        place.map(|p| Place {
                            name: name.to_string(),
                            coords: p.coords,
                        })
                    })
            }
            GeocodeQuery::Coordinates(coords) => self.geocoder.lookup_coordinates(*coords).await,
        };

        match found {
            Ok(Some(place)) => {
                tracing::debug!(query = %query, place = %place.name, "resolved place");
                Ok(place)
            }
            Ok(None) => Err(GeocodeError::NotFound(query.to_string())),
            Err(e) => {
                tracing::warn!(query = %query, "geocode lookup failed: {e:#}");
                Err(GeocodeError::LookupFailed(e))
            }
        }
    }

    pub async fn resolve_name(&self, name: &str) -> Result<Place, GeocodeError> {
        self.resolve(&GeocodeQuery::Name(name.to_string())).await
    }

    pub async fn resolve_random(&self) -> Result<Place, GeocodeError> {
        self.resolve(&GeocodeQuery::random()).await
    }
}
