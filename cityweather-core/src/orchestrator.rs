//! Concurrent weather fetching for a set of selected cities.
//!
//! A round spawns one task per city. Each task reads the city's coordinates,
//! asks the provider for current weather under a timeout, merges the result
//! into the catalog and then counts itself done on the round's latch. The
//! latch only reaches its target once every task has finished its merge, so
//! results read after [`RoundHandle::wait`] are complete.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{Notify, Semaphore},
    task::JoinHandle,
};

use crate::{
    catalog::{CityCatalog, MergeResult},
    config::FetchConfig,
    error::FetchError,
    provider::WeatherProvider,
};

/// Single-use countdown shared by the tasks of one round.
#[derive(Debug)]
pub struct RoundLatch {
    expected: usize,
    completed: AtomicUsize,
    notify: Notify,
}

impl RoundLatch {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            completed: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.completed() >= self.expected
    }

    pub fn count_down(&self) {
        let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if done >= self.expected {
            self.notify.notify_waiters();
        }
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a count_down in between is not missed.
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}

/// Counts the owning task down on drop, including on panic.
struct CompletionGuard(Arc<RoundLatch>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

/// Result of one city's fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum CityOutcome {
    Updated,
    /// Fetched, but the city left the catalog before the merge.
    Discarded,
    /// Fetched, but a later round targeted the city first.
    Superseded,
    Failed(String),
}

/// Per-city results of a finished round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundReport {
    pub succeeded: BTreeSet<String>,
    /// City name to failure reason.
    pub failed: BTreeMap<String, String>,
}

impl RoundReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Handle to an in-flight round.
#[derive(Debug)]
pub struct RoundHandle {
    latch: Arc<RoundLatch>,
    tasks: Vec<(String, JoinHandle<CityOutcome>)>,
}

impl RoundHandle {
    pub fn dispatched(&self) -> usize {
        self.latch.expected()
    }

    pub fn completed(&self) -> usize {
        self.latch.completed()
    }

    /// True once every task has merged its result and exited.
    pub fn is_finished(&self) -> bool {
        self.latch.is_done()
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|(name, _)| name.as_str())
    }

    pub fn latch(&self) -> Arc<RoundLatch> {
        Arc::clone(&self.latch)
    }

    /// Wait for the latch, then join every task.
    pub async fn wait(self) -> RoundReport {
        self.latch.wait().await;

        let mut report = RoundReport::default();
        for (name, task) in self.tasks {
            match task.await {
                Ok(CityOutcome::Updated) => {
                    report.succeeded.insert(name);
                }
                Ok(CityOutcome::Discarded) => {
                    report
                        .failed
                        .insert(name, "city was removed during the fetch".to_string());
                }
                Ok(CityOutcome::Superseded) => {
                    report
                        .failed
                        .insert(name, "superseded by a newer round".to_string());
                }
                Ok(CityOutcome::Failed(reason)) => {
                    report.failed.insert(name, reason);
                }
                Err(e) => {
                    report.failed.insert(name, format!("fetch task panicked: {e}"));
                }
            }
        }

        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "weather round finished"
        );
        report
    }

    /// Give up on the round without joining.
    ///
    /// Outstanding tasks keep running detached. A late result still lands if
    /// no newer round has targeted its city; otherwise it is dropped.
    pub fn abandon(self) {
        let outstanding = self.latch.expected().saturating_sub(self.latch.completed());
        tracing::info!(outstanding, "abandoned weather round");
    }
}

/// Dispatches fetch rounds against a [`WeatherProvider`].
///
/// Rounds may overlap; each city keeps only the result of the latest round
/// that targeted it.
#[derive(Debug, Clone)]
pub struct WeatherFetchOrchestrator {
    catalog: Arc<CityCatalog>,
    provider: Arc<dyn WeatherProvider>,
    config: FetchConfig,
}

impl WeatherFetchOrchestrator {
    pub fn new(
        catalog: Arc<CityCatalog>,
        provider: Arc<dyn WeatherProvider>,
        config: FetchConfig,
    ) -> Self {
        Self {
            catalog,
            provider,
            config,
        }
    }

    /// Start one fetch task per city in `selected`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_round(&self, selected: &BTreeSet<String>) -> Result<RoundHandle, FetchError> {
        if selected.is_empty() {
            return Err(FetchError::NoSelection);
        }

        let round = self.catalog.begin_round(selected);

        let latch = Arc::new(RoundLatch::new(selected.len()));
        let limit = self
            .config
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let timeout = self.config.request_timeout();

        tracing::info!(
            cities = selected.len(),
            max_concurrency = ?self.config.max_concurrency,
            "starting weather round"
        );

        let tasks = selected
            .iter()
            .map(|name| {
                let task = FetchTask {
                    name: name.clone(),
                    catalog: Arc::clone(&self.catalog),
                    provider: Arc::clone(&self.provider),
                    round,
                    limit: limit.clone(),
                    timeout,
                };
                let guard = CompletionGuard(Arc::clone(&latch));
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    task.run().await
                });
                (name.clone(), handle)
            })
            .collect();

        Ok(RoundHandle { latch, tasks })
    }

    /// Start a round for the catalog's current selection, then clear the selection.
    pub fn start_selected_round(&self) -> Result<RoundHandle, FetchError> {
        let selected = self.catalog.selected_names();
        let handle = self.start_round(&selected)?;
        self.catalog.deselect_all();
        Ok(handle)
    }
}

struct FetchTask {
    name: String,
    catalog: Arc<CityCatalog>,
    provider: Arc<dyn WeatherProvider>,
    round: u64,
    limit: Option<Arc<Semaphore>>,
    timeout: Duration,
}

impl FetchTask {
    async fn run(self) -> CityOutcome {
        let _permit = match &self.limit {
            Some(limit) => Arc::clone(limit).acquire_owned().await.ok(),
            None => None,
        };

        let Some(coords) = self.catalog.coordinates_of(&self.name) else {
            tracing::warn!(city = %self.name, "city is not in the catalog, skipping fetch");
            return CityOutcome::Failed("city is not in the catalog".to_string());
        };

        match tokio::time::timeout(self.timeout, self.provider.current_weather(coords)).await {
            Ok(Ok(snapshot)) => {
                match self.catalog.apply_round_weather(&self.name, self.round, snapshot) {
                    MergeResult::Applied => {
                        tracing::debug!(city = %self.name, "weather updated");
                        CityOutcome::Updated
                    }
                    MergeResult::Missing => {
                        tracing::info!(
                            city = %self.name,
                            "city removed during fetch, result dropped"
                        );
                        CityOutcome::Discarded
                    }
                    MergeResult::Superseded => {
                        tracing::info!(
                            city = %self.name,
                            round = self.round,
                            "stale round result dropped"
                        );
                        CityOutcome::Superseded
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(city = %self.name, "failed to fetch weather: {e:#}");
                CityOutcome::Failed(format!("{e:#}"))
            }
            Err(_) => {
                tracing::warn!(
                    city = %self.name,
                    timeout = ?self.timeout,
                    "weather request timed out"
                );
                CityOutcome::Failed(format!("timed out after {:?}", self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{City, Coordinates, WeatherSnapshot};
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Ok(f64),
        Fail,
        Hang,
        Panic,
    }

    /// Provider answering by longitude, which the tests use as a city id.
    #[derive(Debug, Default)]
    struct StubProvider {
        behavior: HashMap<i64, Behavior>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        /// Deletes this city from the catalog while its own fetch is in flight.
        delete_during_fetch: Option<(String, Arc<CityCatalog>)>,
    }

    fn snapshot(temperature_k: f64) -> WeatherSnapshot {
        WeatherSnapshot {
            category: "Clear".into(),
            description: "clear sky".into(),
            temperature_k,
            humidity_pct: 50,
            wind_speed_mps: 2.0,
            sunrise: 1_700_000_000,
            sunset: 1_700_040_000,
        }
    }

    #[async_trait]
    impl WeatherProvider for StubProvider {
        async fn current_weather(&self, coords: Coordinates) -> anyhow::Result<WeatherSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some((name, catalog)) = &self.delete_during_fetch {
                let _ = catalog.delete(name);
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.behavior.get(&(coords.lon as i64)).copied() {
                Some(Behavior::Ok(k)) => Ok(snapshot(k)),
                Some(Behavior::Fail) | None => anyhow::bail!("status 500 Internal Server Error"),
                Some(Behavior::Hang) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Some(Behavior::Panic) => panic!("provider blew up"),
            }
        }
    }

    fn catalog_of(names: &[&str]) -> Arc<CityCatalog> {
        Arc::new(CityCatalog::from_cities(names.iter().enumerate().map(
            |(i, name)| City::new(*name, Coordinates { lon: i as f64, lat: 10.0 }),
        )))
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn orchestrator(
        catalog: &Arc<CityCatalog>,
        provider: StubProvider,
        config: FetchConfig,
    ) -> (WeatherFetchOrchestrator, Arc<StubProvider>) {
        let provider = Arc::new(provider);
        (
            WeatherFetchOrchestrator::new(Arc::clone(catalog), provider.clone(), config),
            provider,
        )
    }

    #[tokio::test]
    async fn empty_selection_is_rejected_without_network() {
        let catalog = catalog_of(&["Paris"]);
        let (orch, provider) =
            orchestrator(&catalog, StubProvider::default(), FetchConfig::default());

        let err = orch.start_round(&BTreeSet::new()).unwrap_err();
        assert_eq!(err, FetchError::NoSelection);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn mixed_round_populates_only_successes() {
        let catalog = catalog_of(&["Paris", "Berlin", "Rome", "Oslo", "Lima"]);
        let provider = StubProvider {
            behavior: HashMap::from([
                (0, Behavior::Ok(300.15)),
                (1, Behavior::Fail),
                (2, Behavior::Ok(280.0)),
                (3, Behavior::Fail),
                (4, Behavior::Ok(290.0)),
            ]),
            delay: Duration::from_millis(10),
            ..StubProvider::default()
        };
        let (orch, provider) = orchestrator(&catalog, provider, FetchConfig::default());

        let handle = orch
            .start_round(&names(&["Paris", "Berlin", "Rome", "Oslo", "Lima"]))
            .expect("round started");
        assert_eq!(handle.dispatched(), 5);

        let report = handle.wait().await;
        assert_eq!(report.succeeded, names(&["Lima", "Paris", "Rome"]));
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed["Berlin"].contains("500"));
        assert_eq!(report.total(), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);

        assert_eq!(
            catalog.weather_of("Paris").map(|s| format!("{:.2}", s.temperature_c())),
            Some("27.00".to_string())
        );
        assert!(catalog.weather_of("Berlin").is_none());
        assert!(catalog.weather_of("Oslo").is_none());
        assert!(catalog.weather_of("Rome").is_some());
    }

    #[tokio::test]
    async fn round_clears_only_targeted_snapshots() {
        let catalog = catalog_of(&["Paris", "Berlin"]);
        catalog.apply_weather("Paris", snapshot(1.0));
        catalog.apply_weather("Berlin", snapshot(2.0));

        let provider = StubProvider {
            behavior: HashMap::from([(0, Behavior::Fail)]),
            ..StubProvider::default()
        };
        let (orch, _) = orchestrator(&catalog, provider, FetchConfig::default());

        let report = orch.start_round(&names(&["Paris"])).expect("started").wait().await;
        assert!(report.succeeded.is_empty());
        assert!(catalog.weather_of("Paris").is_none());
        assert_eq!(catalog.weather_of("Berlin"), Some(snapshot(2.0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn latch_fires_after_every_merge() {
        let catalog = catalog_of(&["Paris", "Berlin", "Rome"]);
        let provider = StubProvider {
            behavior: HashMap::from([
                (0, Behavior::Ok(290.0)),
                (1, Behavior::Ok(291.0)),
                (2, Behavior::Ok(292.0)),
            ]),
            delay: Duration::from_millis(5),
            ..StubProvider::default()
        };
        let (orch, _) = orchestrator(&catalog, provider, FetchConfig::default());

        let handle = orch.start_round(&names(&["Paris", "Berlin", "Rome"])).expect("started");
        handle.latch().wait().await;

        assert!(handle.is_finished());
        assert_eq!(handle.completed(), 3);
        for city in ["Paris", "Berlin", "Rome"] {
            assert!(catalog.weather_of(city).is_some(), "{city} merged before latch");
        }
        assert_eq!(handle.wait().await.succeeded.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_limit_bounds_in_flight_requests() {
        let list = ["A", "B", "C", "D", "E", "F"];
        let catalog = catalog_of(&list);
        let provider = StubProvider {
            behavior: (0..6).map(|i| (i, Behavior::Ok(280.0))).collect(),
            delay: Duration::from_millis(20),
            ..StubProvider::default()
        };
        let config = FetchConfig {
            max_concurrency: Some(2),
            ..FetchConfig::default()
        };
        let (orch, provider) = orchestrator(&catalog, provider, config);

        let report = orch.start_round(&names(&list)).expect("started").wait().await;
        assert_eq!(report.succeeded.len(), 6);
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_request_times_out_without_stalling_round() {
        let catalog = catalog_of(&["Paris", "Berlin"]);
        let provider = StubProvider {
            behavior: HashMap::from([(0, Behavior::Hang), (1, Behavior::Ok(280.0))]),
            ..StubProvider::default()
        };
        let (orch, _) = orchestrator(&catalog, provider, FetchConfig::default());

        let report = orch.start_round(&names(&["Paris", "Berlin"])).expect("started").wait().await;
        assert_eq!(report.succeeded, names(&["Berlin"]));
        assert!(report.failed["Paris"].contains("timed out"));
    }

    #[tokio::test]
    async fn panicking_task_still_completes_round() {
        let catalog = catalog_of(&["Paris", "Berlin"]);
        let provider = StubProvider {
            behavior: HashMap::from([(0, Behavior::Panic), (1, Behavior::Ok(280.0))]),
            ..StubProvider::default()
        };
        let (orch, _) = orchestrator(&catalog, provider, FetchConfig::default());

        let report = orch.start_round(&names(&["Paris", "Berlin"])).expect("started").wait().await;
        assert_eq!(report.succeeded, names(&["Berlin"]));
        assert!(report.failed["Paris"].contains("panicked"));
    }

    #[tokio::test]
    async fn unknown_city_counts_as_failure() {
        let catalog = catalog_of(&["Paris"]);
        let provider = StubProvider {
            behavior: HashMap::from([(0, Behavior::Ok(280.0))]),
            ..StubProvider::default()
        };
        let (orch, provider) = orchestrator(&catalog, provider, FetchConfig::default());

        let report = orch
            .start_round(&names(&["Paris", "Atlantis"]))
            .expect("started")
            .wait()
            .await;
        assert_eq!(report.succeeded, names(&["Paris"]));
        assert!(report.failed.contains_key("Atlantis"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn result_for_deleted_city_is_discarded() {
        let catalog = catalog_of(&["Paris"]);
        let provider = StubProvider {
            behavior: HashMap::from([(0, Behavior::Ok(280.0))]),
            delete_during_fetch: Some(("Paris".to_string(), Arc::clone(&catalog))),
            ..StubProvider::default()
        };
        let (orch, _) = orchestrator(&catalog, provider, FetchConfig::default());

        let report = orch.start_round(&names(&["Paris"])).expect("started").wait().await;
        assert!(report.succeeded.is_empty());
        assert!(report.failed["Paris"].contains("removed"));
        assert!(!catalog.contains("Paris"));
    }

    #[tokio::test]
    async fn selected_round_clears_selection() {
        let catalog = catalog_of(&["Paris", "Berlin"]);
        catalog.set_selected("Berlin", true).expect("select");
        let provider = StubProvider {
            behavior: HashMap::from([(1, Behavior::Ok(280.0))]),
            ..StubProvider::default()
        };
        let (orch, _) = orchestrator(&catalog, provider, FetchConfig::default());

        let handle = orch.start_selected_round().expect("started");
        assert!(catalog.selected_names().is_empty());
        assert_eq!(handle.targets().collect::<Vec<_>>(), vec!["Berlin"]);
        assert_eq!(handle.wait().await.succeeded, names(&["Berlin"]));
    }

    #[tokio::test]
    async fn abandon_returns_while_task_is_stuck() {
        let catalog = catalog_of(&["Paris"]);
        let provider = StubProvider {
            behavior: HashMap::from([(0, Behavior::Hang)]),
            ..StubProvider::default()
        };
        let config = FetchConfig {
            request_timeout_secs: 3600,
            ..FetchConfig::default()
        };
        let (orch, _) = orchestrator(&catalog, provider, config);

        let handle = orch.start_round(&names(&["Paris"])).expect("started");
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        handle.abandon();
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_of_older_round_is_dropped() {
        let catalog = catalog_of(&["Paris"]);
        let slow = StubProvider {
            behavior: HashMap::from([(0, Behavior::Ok(280.0))]),
            delay: Duration::from_secs(10),
            ..StubProvider::default()
        };
        let fast = StubProvider {
            behavior: HashMap::from([(0, Behavior::Ok(300.0))]),
            ..StubProvider::default()
        };
        let (slow_orch, _) = orchestrator(&catalog, slow, FetchConfig::default());
        let (fast_orch, _) = orchestrator(&catalog, fast, FetchConfig::default());

        let stale = slow_orch.start_round(&names(&["Paris"])).expect("started");
        let report = fast_orch.start_round(&names(&["Paris"])).expect("started").wait().await;
        assert_eq!(report.succeeded, names(&["Paris"]));

        let report = stale.wait().await;
        assert_eq!(
            report.failed.get("Paris").map(String::as_str),
            Some("superseded by a newer round")
        );
        assert_eq!(catalog.weather_of("Paris"), Some(snapshot(300.0)));
    }

    #[tokio::test]
    async fn latch_wait_returns_after_count_down() {
        let latch = Arc::new(RoundLatch::new(2));
        let waiter = {
            let latch = Arc::clone(&latch);
            tokio::spawn(async move { latch.wait().await })
        };

        latch.count_down();
        assert!(!latch.is_done());
        latch.count_down();
        assert!(latch.is_done());

        waiter.await.expect("waiter joined");
        assert_eq!(latch.completed(), 2);
    }
}
