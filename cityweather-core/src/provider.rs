use crate::{
    Config,
    model::{Coordinates, Place, WeatherSnapshot},
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// Source of current weather for a position.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current_weather(&self, coords: Coordinates) -> anyhow::Result<WeatherSnapshot>;
}

/// Place lookups. `Ok(None)` means the service answered but had no candidate.
#[async_trait]
pub trait Geocoder: Send + Sync + Debug {
    async fn lookup_name(&self, name: &str) -> anyhow::Result<Option<Place>>;

    async fn lookup_coordinates(&self, coords: Coordinates) -> anyhow::Result<Option<Place>>;
}

/// Construct the OpenWeather client from config and the API key read at startup.
pub fn provider_from_config(
    config: &Config,
    api_key: String,
) -> anyhow::Result<OpenWeatherProvider> {
    if api_key.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "The OpenWeather API key is empty.\n\
             Hint: run `cityweather configure` and enter your API key."
        ));
    }

    Ok(OpenWeatherProvider::with_base_url(api_key, config.base_url.clone()))
}
