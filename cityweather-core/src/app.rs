//! The control path behind every user action: catalog edits, My List
//! moves with persistence, place lookups and weather rounds.

use std::{collections::BTreeSet, sync::Arc};

use crate::{
    Config,
    catalog::{self, CityCatalog},
    error::{AppError, CatalogError},
    favorites::FavoritesStore,
    geocode::GeocodeResolver,
    model::{City, Place},
    orchestrator::{RoundReport, WeatherFetchOrchestrator},
    provider::{Geocoder, WeatherProvider},
};

#[derive(Debug)]
pub struct CityWeatherApp {
    catalog: Arc<CityCatalog>,
    resolver: GeocodeResolver,
    orchestrator: WeatherFetchOrchestrator,
    store: FavoritesStore,
    refresh_demoted: bool,
}

impl CityWeatherApp {
    /// Assemble an app from its parts. `orchestrator` must write into `catalog`.
    pub fn new(
        catalog: Arc<CityCatalog>,
        resolver: GeocodeResolver,
        orchestrator: WeatherFetchOrchestrator,
        store: FavoritesStore,
    ) -> Self {
        Self {
            catalog,
            resolver,
            orchestrator,
            store,
            refresh_demoted: false,
        }
    }

    pub fn with_refresh_demoted(mut self, refresh: bool) -> Self {
        self.refresh_demoted = refresh;
        self
    }

    /// Seed the default catalog and restore the saved My List.
    pub async fn bootstrap<P>(provider: Arc<P>, config: &Config) -> anyhow::Result<Self>
    where
        P: WeatherProvider + Geocoder + 'static,
    {
        let catalog = Arc::new(CityCatalog::with_defaults());
        let geocoder: Arc<dyn Geocoder> = provider.clone();
        let weather: Arc<dyn WeatherProvider> = provider;

        let app = Self::new(
            Arc::clone(&catalog),
            GeocodeResolver::new(geocoder),
            WeatherFetchOrchestrator::new(catalog, weather, config.fetch.clone()),
            FavoritesStore::new(config.favorites_path()?),
        )
        .with_refresh_demoted(config.refresh_demoted);

        app.load_favorites().await?;
        Ok(app)
    }

    pub fn catalog(&self) -> &Arc<CityCatalog> {
        &self.catalog
    }

    pub fn orchestrator(&self) -> &WeatherFetchOrchestrator {
        &self.orchestrator
    }

    pub async fn load_favorites(&self) -> anyhow::Result<BTreeSet<String>> {
        let favorites = self.store.load(&self.resolver).await?;
        self.catalog.restore_favorites(&favorites);
        Ok(favorites)
    }

    /// Look up a typed city name and add it to the catalog.
    pub async fn add_place(&self, name: &str) -> Result<Place, AppError> {
        let name = catalog::validate_name(name)?;
        if self.catalog.contains(name) || self.catalog.is_favorite(name) {
            return Err(CatalogError::DuplicateCity(name.to_string()).into());
        }

        let place = self.resolver.resolve_name(name).await?;
        self.catalog.insert(&place.name, place.coords)?;
        Ok(place)
    }

    /// Add whatever city a reverse lookup of a random position returns.
    pub async fn add_random_city(&self) -> Result<Place, AppError> {
        let place = self.resolver.resolve_random().await?;
        self.catalog.insert(&place.name, place.coords)?;
        Ok(place)
    }

    /// Move the selected catalog cities into My List and save it.
    ///
    /// If My List cannot be saved the move is undone and the selection kept.
    pub fn add_selected_to_favorites(&self) -> Result<BTreeSet<String>, AppError> {
        let selected: Vec<City> = self
            .catalog
            .cities()
            .into_iter()
            .filter(|c| c.selected)
            .collect();
        let moved = self
            .catalog
            .promote_to_favorites(selected.iter().map(|c| c.name.as_str()));

        let saved = if moved.is_empty() { Ok(()) } else { self.persist() };
        if let Err(e) = saved {
            self.catalog
                .reinstate(selected.into_iter().filter(|c| moved.contains(&c.name)));
            return Err(e);
        }
        self.catalog.deselect_all();
        Ok(moved)
    }

    /// Move `names` out of My List, save it, and optionally look up real
    /// coordinates for the returned cities. A failed save puts the names back.
    pub async fn remove_from_favorites(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, AppError> {
        let moved = self.catalog.demote_from_favorites(names);
        if moved.is_empty() {
            return Ok(moved);
        }
        if let Err(e) = self.persist() {
            self.catalog.restore_favorites(&moved);
            return Err(e);
        }

        if self.refresh_demoted {
            for name in &moved {
                match self.resolver.resolve_name(name).await {
                    Ok(place) => {
                        if let Err(e) = self.catalog.update_coordinates(name, place.coords) {
                            tracing::warn!(city = %name, "could not refresh coordinates: {e}");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(city = %name, "keeping placeholder coordinates: {e}");
                    }
                }
            }
        }
        Ok(moved)
    }

    pub fn delete(&self, names: &BTreeSet<String>) -> Result<Vec<String>, AppError> {
        Ok(self.catalog.delete_many(names)?)
    }

    pub fn delete_selected(&self) -> Vec<String> {
        self.catalog.delete_selected()
    }

    /// Fetch weather for `names` and wait for the round to finish.
    pub async fn fetch(&self, names: &BTreeSet<String>) -> Result<RoundReport, AppError> {
        let handle = self.orchestrator.start_round(names)?;
        Ok(handle.wait().await)
    }

    /// Fetch weather for the current selection, clearing it.
    pub async fn fetch_selected(&self) -> Result<RoundReport, AppError> {
        let handle = self.orchestrator.start_selected_round()?;
        Ok(handle.wait().await)
    }

    fn persist(&self) -> Result<(), AppError> {
        self.store
            .save(&self.catalog.favorites())
            .map_err(AppError::Persist)
    }
}
