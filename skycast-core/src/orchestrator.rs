//! Cache-first orchestration of the fetch pipeline.
//!
//! Owns the loading/error/success state machine the display layer reads.
//! Every `resolve` gets a monotonic sequence number and a completion is
//! applied only while it is still the latest outstanding sequence, so a
//! background refresh finishing after a newer search can never clobber the
//! newer result.

use std::sync::{Arc, Mutex};

use crate::{
    cache::{FRESHNESS_WINDOW, WeatherCache},
    error::FetchError,
    location::{self, Geolocator},
    model::{DisplayModel, Query},
    provider::WeatherFetcher,
};

/// Temperature unit selected by the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl Unit {
    pub fn toggled(self) -> Self {
        match self {
            Unit::Celsius => Unit::Fahrenheit,
            Unit::Fahrenheit => Unit::Celsius,
        }
    }
}

impl DisplayModel {
    /// Current temperature in the selected unit.
    pub fn current_temp(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Celsius => self.current_temp_c,
            Unit::Fahrenheit => self.current_temp_f,
        }
    }

    /// Feels-like temperature in the selected unit.
    pub fn feels_like(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Celsius => self.feels_like_c,
            Unit::Fahrenheit => self.feels_like_f,
        }
    }
}

/// State the display layer renders from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DisplayState {
    #[default]
    Idle,
    Loading,
    Success(DisplayModel),
    Error(String),
}

/// What the display layer reads each time it renders.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: DisplayState,
    pub unit: Unit,
}

/// Display state plus the latest issued resolve sequence. One mutex guards
/// both so the sequence check and the state write are a single atomic step;
/// a superseded completion can never pass the check and then write after a
/// newer request has landed.
#[derive(Default)]
struct StateCell {
    state: DisplayState,
    latest_seq: u64,
}

struct Shared {
    cell: Mutex<StateCell>,
    unit: Mutex<Unit>,
}

impl Shared {
    fn lock_cell(&self) -> std::sync::MutexGuard<'_, StateCell> {
        self.cell.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Issue the next resolve sequence; all earlier sequences are superseded
    /// from this point on.
    fn next_seq(&self) -> u64 {
        let mut cell = self.lock_cell();
        cell.latest_seq += 1;
        cell.latest_seq
    }

    fn apply(&self, seq: u64, next: DisplayState) {
        let mut cell = self.lock_cell();
        if seq != cell.latest_seq {
            tracing::debug!(seq, "dropping state update from superseded request");
            return;
        }

        cell.state = next;
    }

    fn set_state(&self, next: DisplayState) {
        self.lock_cell().state = next;
    }

    fn state(&self) -> DisplayState {
        self.lock_cell().state.clone()
    }
}

/// Cache-first orchestrator: serves fresh cached snapshots immediately with
/// a silent background refresh, or fetches synchronously when the cache
/// can't help.
pub struct Orchestrator {
    fetcher: Arc<dyn WeatherFetcher>,
    cache: Arc<WeatherCache>,
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn WeatherFetcher>, cache: WeatherCache) -> Self {
        Orchestrator {
            fetcher,
            cache: Arc::new(cache),
            shared: Arc::new(Shared {
                cell: Mutex::new(StateCell::default()),
                unit: Mutex::new(Unit::default()),
            }),
        }
    }

    /// Application-start entry point: transition to `Loading` while the
    /// location resolver runs, then resolve the query it produces.
    pub async fn initial(&self, geolocator: Option<&dyn Geolocator>) -> DisplayState {
        self.shared.set_state(DisplayState::Loading);

        let query = location::resolve(geolocator).await;
        self.resolve(query).await
    }

    /// Resolve one query through the cache-first policy and return the
    /// resulting display state.
    pub async fn resolve(&self, query: Query) -> DisplayState {
        let seq = self.shared.next_seq();

        let Some(key) = query.cache_key() else {
            self.shared.apply(seq, DisplayState::Error(FetchError::InvalidQuery.to_string()));
            return self.state();
        };

        if let Some(cached) = self.cache.fresh(&key, FRESHNESS_WINDOW) {
            // Serve the snapshot immediately; refresh off the critical path.
            self.shared.apply(seq, DisplayState::Success(cached));
            self.spawn_background_refresh(seq, key, query);
            return self.state();
        }

        self.shared.apply(seq, DisplayState::Loading);

        match self.fetcher.fetch(&query).await {
            Ok(model) => {
                self.persist(&key, &model);
                self.shared.apply(seq, DisplayState::Success(model));
            }
            Err(err) => {
                // Error clears any previously displayed model.
                self.shared.apply(seq, DisplayState::Error(err.to_string()));
            }
        }

        self.state()
    }

    /// Refresh the cache for a query that was just served from cache. The
    /// caller is not waiting on this: success updates the cache and, if
    /// still the latest request, the displayed state; failure is logged and
    /// the displayed snapshot stays untouched.
    fn spawn_background_refresh(&self, seq: u64, key: String, query: Query) {
        let fetcher = Arc::clone(&self.fetcher);
        let cache = Arc::clone(&self.cache);
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            match fetcher.fetch(&query).await {
                Ok(model) => {
                    if let Err(err) = cache.set(&key, &model) {
                        tracing::warn!(key = %key, %err, "failed to persist refreshed weather data");
                    }
                    shared.apply(seq, DisplayState::Success(model));
                }
                Err(err) => {
                    tracing::warn!(key = %key, %err, "background refresh failed, keeping cached data");
                }
            }
        });
    }

    fn persist(&self, key: &str, model: &DisplayModel) {
        if let Err(err) = self.cache.set(key, model) {
            tracing::warn!(key, %err, "failed to persist weather data");
        }
    }

    pub fn state(&self) -> DisplayState {
        self.shared.state()
    }

    pub fn unit(&self) -> Unit {
        *self.shared.unit.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_unit(&self, unit: Unit) {
        *self.shared.unit.lock().unwrap_or_else(|e| e.into_inner()) = unit;
    }

    pub fn toggle_unit(&self) -> Unit {
        let mut guard = self.shared.unit.lock().unwrap_or_else(|e| e.into_inner());
        *guard = guard.toggled();
        *guard
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot { state: self.state(), unit: self.unit() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KvStore, MemoryStore};
    use crate::test_support::sample_model;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Scripted fetcher: answers by the query's cache key so test outcomes
    /// don't depend on task scheduling order.
    #[derive(Debug, Default)]
    struct ScriptedFetcher {
        responses: Mutex<HashMap<String, Result<DisplayModel, FetchError>>>,
        calls: AtomicU64,
    }

    impl ScriptedFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn respond(&self, key: &str, result: Result<DisplayModel, FetchError>) {
            self.responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.to_string(), result);
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherFetcher for ScriptedFetcher {
        async fn fetch(&self, query: &Query) -> Result<DisplayModel, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            query
                .cache_key()
                .and_then(|key| {
                    self.responses.lock().unwrap_or_else(|e| e.into_inner()).get(&key).cloned()
                })
                .unwrap_or(Err(FetchError::Network("no scripted response".to_string())))
        }
    }

    fn orchestrator_with(fetcher: &Arc<ScriptedFetcher>) -> Orchestrator {
        let cache = WeatherCache::new(Box::new(MemoryStore::new()));
        Orchestrator::new(fetcher.clone(), cache)
    }

    /// Give spawned background tasks a chance to run on the current-thread
    /// test runtime.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn refreshed_model() -> DisplayModel {
        let mut model = sample_model();
        model.current_temp_c = 11.5;
        model
    }

    #[tokio::test]
    async fn starts_idle() {
        let orch = orchestrator_with(&ScriptedFetcher::new());
        assert_eq!(orch.state(), DisplayState::Idle);
    }

    #[tokio::test]
    async fn miss_fetches_synchronously_and_caches() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond("weather_london", Ok(sample_model()));
        let orch = orchestrator_with(&fetcher);

        let state = orch.resolve(Query::city("London")).await;

        assert_eq!(state, DisplayState::Success(sample_model()));
        assert_eq!(fetcher.calls(), 1);

        // The fetch result landed in the cache under the normalized key.
        let cached = orch.cache.fresh("weather_london", FRESHNESS_WINDOW);
        assert_eq!(cached, Some(sample_model()));
    }

    #[tokio::test]
    async fn invalid_query_errors_without_fetching() {
        let fetcher = ScriptedFetcher::new();
        let orch = orchestrator_with(&fetcher);

        let state = orch.resolve(Query::city("   ")).await;

        assert_eq!(state, DisplayState::Error(FetchError::InvalidQuery.to_string()));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn sync_failure_clears_previous_model() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond("weather_london", Ok(sample_model()));
        fetcher.respond("weather_atlantis", Err(FetchError::provider(404, "city not found")));
        let orch = orchestrator_with(&fetcher);

        orch.resolve(Query::city("London")).await;
        let state = orch.resolve(Query::city("Atlantis")).await;

        assert_eq!(state, DisplayState::Error("city not found".to_string()));
    }

    #[tokio::test]
    async fn fresh_cache_serves_immediately_then_refreshes_in_background() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond("weather_london", Ok(refreshed_model()));
        let orch = orchestrator_with(&fetcher);
        orch.cache.set("weather_london", &sample_model()).expect("seed cache");

        let state = orch.resolve(Query::city("London")).await;

        // Served from cache without touching the network on the critical path.
        assert_eq!(state, DisplayState::Success(sample_model()));

        settle().await;

        // The background refresh replaced both the cache and the display.
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(orch.state(), DisplayState::Success(refreshed_model()));
        let cached = orch.cache.fresh("weather_london", FRESHNESS_WINDOW);
        assert_eq!(cached, Some(refreshed_model()));
    }

    #[tokio::test]
    async fn background_refresh_failure_keeps_displayed_success() {
        let fetcher = ScriptedFetcher::new();
        fetcher
            .respond("weather_london", Err(FetchError::Network("connection reset".to_string())));
        let orch = orchestrator_with(&fetcher);
        orch.cache.set("weather_london", &sample_model()).expect("seed cache");

        let state = orch.resolve(Query::city("London")).await;
        assert_eq!(state, DisplayState::Success(sample_model()));

        settle().await;

        // Refresh ran and failed; the good snapshot is still displayed and
        // still cached.
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(orch.state(), DisplayState::Success(sample_model()));
        assert!(orch.cache.fresh("weather_london", FRESHNESS_WINDOW).is_some());
    }

    #[tokio::test]
    async fn stale_background_refresh_does_not_clobber_newer_search() {
        let mut berlin = sample_model();
        berlin.city = "Berlin".to_string();

        let fetcher = ScriptedFetcher::new();
        fetcher.respond("weather_london", Ok(refreshed_model()));
        fetcher.respond("weather_berlin", Ok(berlin.clone()));
        let orch = orchestrator_with(&fetcher);
        orch.cache.set("weather_london", &sample_model()).expect("seed cache");

        // Cache hit schedules a background refresh under one sequence...
        orch.resolve(Query::city("London")).await;
        // ...and a newer search supersedes it before that refresh lands.
        let state = orch.resolve(Query::city("Berlin")).await;
        assert_eq!(state, DisplayState::Success(berlin.clone()));

        settle().await;

        // The late refresh updated its cache entry but not the displayed
        // state.
        assert_eq!(orch.state(), DisplayState::Success(berlin));
        assert!(orch.cache.get("weather_london").is_some());
    }

    #[tokio::test]
    async fn stale_cache_goes_through_the_loading_path() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond("weather_london", Ok(refreshed_model()));

        // Seed a 31-minute-old entry through the raw store.
        let mut entry = crate::model::CacheEntry::new(sample_model());
        entry.timestamp -= 31 * 60 * 1000;
        let store = MemoryStore::new();
        store
            .set("weather_london", &serde_json::to_string(&entry).expect("serialize"))
            .expect("seed");
        let orch = Orchestrator::new(fetcher.clone(), WeatherCache::new(Box::new(store)));

        let state = orch.resolve(Query::city("London")).await;

        // Synchronous fetch, not the cached snapshot.
        assert_eq!(state, DisplayState::Success(refreshed_model()));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn initial_without_capability_resolves_fallback_city() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond("weather_london", Ok(sample_model()));
        let orch = orchestrator_with(&fetcher);

        let state = orch.initial(None).await;

        assert_eq!(state, DisplayState::Success(sample_model()));
        assert_eq!(fetcher.calls(), 1);
        // The fallback city landed under its normalized key.
        assert!(orch.cache.get("weather_london").is_some());
    }

    #[tokio::test]
    async fn unit_toggle_round_trips() {
        let orch = orchestrator_with(&ScriptedFetcher::new());

        assert_eq!(orch.unit(), Unit::Celsius);
        assert_eq!(orch.toggle_unit(), Unit::Fahrenheit);
        assert_eq!(orch.snapshot().unit, Unit::Fahrenheit);

        orch.set_unit(Unit::Celsius);
        assert_eq!(orch.unit(), Unit::Celsius);
    }

    #[test]
    fn superseded_completion_cannot_land_after_the_newer_one() {
        let mut berlin = sample_model();
        berlin.city = "Berlin".to_string();

        let shared = Shared {
            cell: Mutex::new(StateCell::default()),
            unit: Mutex::new(Unit::default()),
        };

        // Two outstanding resolves; the second completes first.
        let first = shared.next_seq();
        let second = shared.next_seq();
        shared.apply(second, DisplayState::Success(berlin.clone()));

        // The first sequence finishes late. Its write must be dropped: the
        // sequence check and the state write share one lock, so there is no
        // window between checking and writing for the guard to go stale.
        shared.apply(first, DisplayState::Success(sample_model()));

        assert_eq!(shared.state(), DisplayState::Success(berlin));
    }

    #[test]
    fn model_reads_temperature_for_selected_unit() {
        let model = sample_model();
        assert_eq!(model.current_temp(Unit::Celsius), 10.0);
        assert_eq!(model.current_temp(Unit::Fahrenheit), 50.0);
        assert_eq!(model.feels_like(Unit::Celsius), 9.0);
        assert_eq!(model.feels_like(Unit::Fahrenheit), 48.2);
    }
}
