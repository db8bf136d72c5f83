use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::model::{Coordinates, Place, WeatherSnapshot};

use super::{Geocoder, WeatherProvider};

pub const DEFAULT_BASE_URL: &str = "http://api.openweathermap.org";

/// Client for the OpenWeather current-weather and geocoding endpoints.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "OpenWeather {what} request");

        let res = self
            .http
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("Failed to send request to OpenWeather ({what})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read OpenWeather {what} response body"))?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeather {} request failed with status {}: {}",
                what,
                status,
                truncate_body(&body),
            ));
        }

        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse OpenWeather {what} JSON"))
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    sys: OwSys,
}

impl TryFrom<OwCurrentResponse> for WeatherSnapshot {
    type Error = anyhow::Error;

    fn try_from(parsed: OwCurrentResponse) -> Result<Self> {
        let weather = parsed
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OpenWeather response contained no weather entries"))?;

        Ok(WeatherSnapshot {
            category: weather.main,
            description: weather.description,
            temperature_k: parsed.main.temp,
            humidity_pct: parsed.main.humidity,
            wind_speed_mps: parsed.wind.speed,
            sunrise: parsed.sys.sunrise,
            sunset: parsed.sys.sunset,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwGeoEntry {
    name: String,
    lat: f64,
    lon: f64,
}

impl TryFrom<OwGeoEntry> for Place {
    type Error = anyhow::Error;

    fn try_from(entry: OwGeoEntry) -> Result<Self> {
        let coords = Coordinates::new(entry.lon, entry.lat)
            .context("OpenWeather geocoding returned an invalid position")?;
        Ok(Place {
            name: entry.name,
            coords,
        })
    }
}

fn first_place(entries: Vec<OwGeoEntry>) -> Result<Option<Place>> {
    entries.into_iter().next().map(Place::try_from).transpose()
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_weather(&self, coords: Coordinates) -> Result<WeatherSnapshot> {
        let parsed: OwCurrentResponse = self
            .get_json(
                "/data/2.5/weather",
                &[("lat", coords.lat.to_string()), ("lon", coords.lon.to_string())],
                "current weather",
            )
            .await?;

        WeatherSnapshot::try_from(parsed)
    }
}

#[async_trait]
impl Geocoder for OpenWeatherProvider {
    async fn lookup_name(&self, name: &str) -> Result<Option<Place>> {
        let entries: Vec<OwGeoEntry> = self
            .get_json(
                "/geo/1.0/direct",
                &[("q", name.to_string()), ("limit", "1".to_string())],
                "geocoding",
            )
            .await?;

        first_place(entries)
    }

    async fn lookup_coordinates(&self, coords: Coordinates) -> Result<Option<Place>> {
        let entries: Vec<OwGeoEntry> = self
            .get_json(
                "/geo/1.0/reverse",
                &[
                    ("lat", coords.lat.to_string()),
                    ("lon", coords.lon.to_string()),
                    ("limit", "1".to_string()),
                ],
                "reverse geocoding",
            )
            .await?;

        first_place(entries)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
