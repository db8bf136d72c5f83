//! The city catalog and the favorites ("My List") partition.
//!
//! Every known city name lives in exactly one of two places: the browsable
//! catalog (with coordinates, selection flag and weather snapshot) or the
//! favorites name set. All state sits behind a single lock, so every
//! operation below observes and leaves the partition consistent.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

use crate::{
    error::CatalogError,
    model::{City, Coordinates, WeatherSnapshot},
    seed,
};

/// Trim `name` and check it can be stored as a city name.
///
/// My List is saved one name per line, so line breaks are rejected.
pub(crate) fn validate_name(name: &str) -> Result<&str, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::EmptyName);
    }
    if name.contains(['\n', '\r']) {
        return Err(CatalogError::InvalidName(name.to_string()));
    }
    Ok(name)
}

#[derive(Debug, Default)]
struct CatalogState {
    cities: Vec<City>,
    favorites: BTreeSet<String>,
    /// Latest fetch round started for each catalog name.
    rounds: HashMap<String, u64>,
    last_round: u64,
}

impl CatalogState {
    fn position(&self, name: &str) -> Option<usize> {
        self.cities.iter().position(|c| c.name == name)
    }

    fn city_mut(&mut self, name: &str) -> Option<&mut City> {
        self.cities.iter_mut().find(|c| c.name == name)
    }

    fn is_known(&self, name: &str) -> bool {
        self.favorites.contains(name) || self.position(name).is_some()
    }
}

/// How a fetched snapshot was handled by [`CityCatalog::apply_round_weather`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeResult {
    Applied,
    /// The city left the catalog.
    Missing,
    /// A newer round targeted the city, or it was removed and added again.
    Superseded,
}

#[derive(Debug, Default)]
pub struct CityCatalog {
    state: Mutex<CatalogState>,
}

impl CityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with the built-in list of world cities.
    pub fn with_defaults() -> Self {
        Self::from_cities(seed::default_cities())
    }

    /// Build a catalog from `cities`; later duplicates of a name are ignored.
    pub fn from_cities(cities: impl IntoIterator<Item = City>) -> Self {
        let mut state = CatalogState::default();
        for city in cities {
            if state.position(&city.name).is_none() {
                state.cities.push(city);
            }
        }
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().cities.is_empty()
    }

    /// Clone of the catalog entries in display order.
    pub fn cities(&self) -> Vec<City> {
        self.state.lock().cities.clone()
    }

    pub fn favorites(&self) -> BTreeSet<String> {
        self.state.lock().favorites.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().position(name).is_some()
    }

    pub fn is_favorite(&self, name: &str) -> bool {
        self.state.lock().favorites.contains(name)
    }

    pub fn coordinates_of(&self, name: &str) -> Option<Coordinates> {
        let state = self.state.lock();
        state.position(name).map(|i| state.cities[i].coords)
    }

    pub fn weather_of(&self, name: &str) -> Option<WeatherSnapshot> {
        let state = self.state.lock();
        state
            .position(name)
            .and_then(|i| state.cities[i].weather.clone())
    }

    pub fn selected_names(&self) -> BTreeSet<String> {
        self.state
            .lock()
            .cities
            .iter()
            .filter(|c| c.selected)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Flip the selection flag of a catalog entry and return the new value.
    pub fn toggle_selection(&self, name: &str) -> Result<bool, CatalogError> {
        let mut state = self.state.lock();
        if state.favorites.contains(name) {
            return Err(CatalogError::NotSelectable(name.to_string()));
        }
        let city = state
            .city_mut(name)
            .ok_or_else(|| CatalogError::UnknownCity(name.to_string()))?;
        city.selected = !city.selected;
        Ok(city.selected)
    }

    pub fn set_selected(&self, name: &str, selected: bool) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        if state.favorites.contains(name) {
            return Err(CatalogError::NotSelectable(name.to_string()));
        }
        let city = state
            .city_mut(name)
            .ok_or_else(|| CatalogError::UnknownCity(name.to_string()))?;
        city.selected = selected;
        Ok(())
    }

    pub fn select_all(&self, selected: bool) {
        for city in self.state.lock().cities.iter_mut() {
            city.selected = selected;
        }
    }

    pub fn deselect_all(&self) {
        self.select_all(false);
    }

    /// Add a new, unselected city without weather.
    pub fn insert(&self, name: &str, coords: Coordinates) -> Result<(), CatalogError> {
        let name = validate_name(name)?;
        // Re-validate: the fields are public and may have been built by hand.
        let coords = Coordinates::new(coords.lon, coords.lat)?;

        let mut state = self.state.lock();
        if state.is_known(name) {
            return Err(CatalogError::DuplicateCity(name.to_string()));
        }
        state.rounds.remove(name);
        state.cities.push(City::new(name, coords));
        tracing::info!(city = name, lon = coords.lon, lat = coords.lat, "added city to catalog");
        Ok(())
    }

    /// Move every selected catalog entry among `names` into favorites.
    ///
    /// Returns the names that actually moved; names that are already
    /// favorites, unknown, or unselected are skipped.
    pub fn promote_to_favorites<I, S>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        let mut moved = BTreeSet::new();

        for name in names {
            let name: &str = name.as_ref();
            let Some(i) = state.position(name) else {
                continue;
            };
            if !state.cities[i].selected {
                continue;
            }
            let city = state.cities.remove(i);
            state.favorites.insert(city.name.clone());
            moved.insert(city.name);
        }

        if !moved.is_empty() {
            tracing::info!(count = moved.len(), "moved cities to My List");
        }
        moved
    }

    /// Move favorites back into the catalog.
    ///
    /// Each demoted city gets [`Coordinates::UNRESOLVED`] and no selection;
    /// callers that want real coordinates refresh them with
    /// [`CityCatalog::update_coordinates`]. Names that are not favorites are
    /// skipped. Returns the names that moved.
    pub fn demote_from_favorites<I, S>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        let mut moved = BTreeSet::new();

        for name in names {
            let name: &str = name.as_ref();
            if !state.favorites.remove(name) {
                continue;
            }
            state.rounds.remove(name);
            state.cities.push(City::new(name, Coordinates::UNRESOLVED));
            moved.insert(name.to_string());
        }

        if !moved.is_empty() {
            tracing::info!(count = moved.len(), "moved cities out of My List");
        }
        moved
    }

    /// Undo a promotion: take each city out of favorites and put the entry
    /// back at the end of the catalog as it was. Cities that are no longer
    /// favorites are skipped.
    pub fn reinstate(&self, cities: impl IntoIterator<Item = City>) {
        let mut state = self.state.lock();
        for city in cities {
            if state.favorites.remove(&city.name) {
                state.cities.push(city);
            }
        }
    }

    /// Startup path: put saved favorites back into the favorites set,
    /// taking them out of the catalog if seeding put them there.
    pub fn restore_favorites<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        for name in names {
            let name: &str = name.as_ref();
            if let Some(i) = state.position(name) {
                state.cities.remove(i);
            }
            state.favorites.insert(name.to_string());
        }
    }

    pub fn delete(&self, name: &str) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        if state.favorites.contains(name) {
            return Err(CatalogError::ProtectedEntry(name.to_string()));
        }
        let i = state
            .position(name)
            .ok_or_else(|| CatalogError::UnknownCity(name.to_string()))?;
        state.cities.remove(i);
        tracing::info!(city = name, "deleted city");
        Ok(())
    }

    /// Delete several cities at once, or none of them if any is a favorite.
    ///
    /// Names that are not in the catalog are skipped. Returns the names removed.
    pub fn delete_many<I, S>(&self, names: I) -> Result<Vec<String>, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        let mut state = self.state.lock();

        for name in &names {
            let name: &str = name.as_ref();
            if state.favorites.contains(name) {
                return Err(CatalogError::ProtectedEntry(name.to_string()));
            }
        }

        let mut removed = Vec::new();
        for name in &names {
            if let Some(i) = state.position(name.as_ref()) {
                removed.push(state.cities.remove(i).name);
            }
        }
        Ok(removed)
    }

    /// Remove every selected catalog entry and return their names.
    pub fn delete_selected(&self) -> Vec<String> {
        let mut state = self.state.lock();
        let (removed, kept): (Vec<City>, Vec<City>) =
            std::mem::take(&mut state.cities).into_iter().partition(|c| c.selected);
        state.cities = kept;
        removed.into_iter().map(|c| c.name).collect()
    }

    pub fn update_coordinates(&self, name: &str, coords: Coordinates) -> Result<(), CatalogError> {
        let coords = Coordinates::new(coords.lon, coords.lat)?;
        let mut state = self.state.lock();
        let city = state
            .city_mut(name)
            .ok_or_else(|| CatalogError::UnknownCity(name.to_string()))?;
        city.coords = coords;
        Ok(())
    }

    /// Attach a snapshot to a catalog entry.
    ///
    /// Returns `false` if the city left the catalog while its fetch was in
    /// flight; the snapshot is dropped in that case.
    pub fn apply_weather(&self, name: &str, snapshot: WeatherSnapshot) -> bool {
        let mut state = self.state.lock();
        match state.city_mut(name) {
            Some(city) => {
                city.weather = Some(snapshot);
                true
            }
            None => false,
        }
    }

    /// Clear the snapshots of `names` and tag them with a new round id.
    ///
    /// Only results merged with [`CityCatalog::apply_round_weather`] under
    /// the latest id for a city are kept. Names not in the catalog are skipped.
    pub fn begin_round<I, S>(&self, names: I) -> u64
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        state.last_round += 1;
        let round = state.last_round;
        for name in names {
            let name: &str = name.as_ref();
            let Some(city) = state.city_mut(name) else {
                continue;
            };
            city.weather = None;
            state.rounds.insert(name.to_string(), round);
        }
        round
    }

    /// Attach a snapshot fetched by `round`, unless the city has left the
    /// catalog or a later round has started for it.
    pub fn apply_round_weather(
        &self,
        name: &str,
        round: u64,
        snapshot: WeatherSnapshot,
    ) -> MergeResult {
        let mut state = self.state.lock();
        let latest = state.rounds.get(name).copied();
        let Some(city) = state.city_mut(name) else {
            return MergeResult::Missing;
        };
        if latest != Some(round) {
            return MergeResult::Superseded;
        }
        city.weather = Some(snapshot);
        MergeResult::Applied
    }

    pub fn clear_all_weather(&self) {
        for city in self.state.lock().cities.iter_mut() {
            city.weather = None;
        }
    }

    /// Clear the snapshots of `names` only, leaving other cities untouched.
    pub fn clear_weather<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        for name in names {
            if let Some(city) = state.city_mut(name.as_ref()) {
                city.weather = None;
            }
        }
    }
}
