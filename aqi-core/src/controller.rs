//! Query orchestration: owns the query state and publishes a view model.
//!
//! State changes happen only in [`ViewController::begin`] (a query is issued)
//! and [`ViewController::finish`] (a fetch completed). A completion replaces
//! the reading and the forecast together or leaves both alone.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    forecast,
    model::{AqiReading, CityKey, Coordinate, ForecastPoint},
    provider::{FeedClient, FeedError, FeedSuccess},
    resolver::CityResolver,
    severity::{SeverityBand, classify},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Loading,
    Loaded,
    Error,
}

/// Which completion is allowed to write state when fetches overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionPolicy {
    /// Every completion is applied; a slow, older request can overwrite a newer one.
    #[default]
    LastResolvedWins,
    /// Only the most recently issued request may write state.
    LatestIssuedWins,
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompletionPolicy::LastResolvedWins => "last-resolved-wins",
            CompletionPolicy::LatestIssuedWins => "latest-issued-wins",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub default_city: CityKey,
    /// Used when the default city is not known to the resolver.
    pub fallback_coordinate: Coordinate,
    pub policy: CompletionPolicy,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("City name is empty")]
    EmptyCity,
}

/// Handle for an issued query; pass it back to [`ViewController::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
    city: CityKey,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn city(&self) -> &CityKey {
        &self.city
    }
}

#[derive(Debug, Clone)]
struct QueryState {
    status: Status,
    city_in_flight: Option<CityKey>,
    last_reading: Option<AqiReading>,
    last_coordinate: Coordinate,
    last_forecast: Vec<ForecastPoint>,
    last_error: Option<FeedError>,
    issued: u64,
}

/// Snapshot handed to the rendering layer after every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub status: Status,
    pub city_in_flight: Option<CityKey>,
    pub reading: Option<AqiReading>,
    pub band: Option<SeverityBand>,
    pub coordinate: Coordinate,
    pub forecast: Vec<ForecastPoint>,
    pub error: Option<String>,
}

impl QueryState {
    fn view(&self) -> ViewModel {
        ViewModel {
            status: self.status,
            city_in_flight: self.city_in_flight.clone(),
            reading: self.last_reading.clone(),
            band: self.last_reading.as_ref().map(|r| classify(i64::from(r.value))),
            coordinate: self.last_coordinate,
            forecast: self.last_forecast.clone(),
            error: self.last_error.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Debug)]
struct Shared {
    client: Arc<dyn FeedClient>,
    resolver: Arc<dyn CityResolver>,
    policy: CompletionPolicy,
    default_city: CityKey,
    state: Mutex<QueryState>,
    views: watch::Sender<ViewModel>,
}

/// Cheap to clone; clones share one query state.
#[derive(Debug, Clone)]
pub struct ViewController {
    shared: Arc<Shared>,
}

impl ViewController {
    /// Create an idle controller positioned on the default city.
    pub fn new(
        client: Arc<dyn FeedClient>,
        resolver: Arc<dyn CityResolver>,
        settings: ControllerSettings,
    ) -> Self {
        let coordinate = resolver
            .resolve(&settings.default_city)
            .unwrap_or(settings.fallback_coordinate);

        let state = QueryState {
            status: Status::Idle,
            city_in_flight: None,
            last_reading: None,
            last_coordinate: coordinate,
            last_forecast: Vec::new(),
            last_error: None,
            issued: 0,
        };
        let (views, _) = watch::channel(state.view());

        Self {
            shared: Arc::new(Shared {
                client,
                resolver,
                policy: settings.policy,
                default_city: settings.default_city,
                state: Mutex::new(state),
                views,
            }),
        }
    }

    /// Create a controller and immediately query the default city.
    ///
    /// Must be called within a tokio runtime.
    pub fn launch(
        client: Arc<dyn FeedClient>,
        resolver: Arc<dyn CityResolver>,
        settings: ControllerSettings,
    ) -> (Self, JoinHandle<()>) {
        let controller = Self::new(client, resolver, settings);
        let ticket = controller.issue(controller.shared.default_city.clone());
        let handle = controller.spawn_fetch(ticket);
        (controller, handle)
    }

    pub fn view(&self) -> ViewModel {
        self.shared.state.lock().view()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.shared.views.subscribe()
    }

    /// Start a query for `city_text` without fetching.
    ///
    /// Moves the map to the city if the resolver knows it; otherwise the
    /// previous coordinate stays.
    pub fn begin(&self, city_text: &str) -> Result<FetchTicket, QueryError> {
        let city = CityKey::normalize(city_text).ok_or(QueryError::EmptyCity)?;
        Ok(self.issue(city))
    }

    fn issue(&self, city: CityKey) -> FetchTicket {
        let resolved = self.shared.resolver.resolve(&city);

        let mut state = self.shared.state.lock();
        match resolved {
            Some(coordinate) => state.last_coordinate = coordinate,
            None => tracing::debug!(
                %city,
                "city not in coordinate table; keeping previous position"
            ),
        }

        state.issued += 1;
        state.status = Status::Loading;
        state.city_in_flight = Some(city.clone());

        let ticket = FetchTicket {
            seq: state.issued,
            city,
        };
        tracing::info!(city = %ticket.city, seq = ticket.seq, "query issued");

        self.publish(&state);
        ticket
    }

    /// Apply the outcome of the fetch issued as `ticket`.
    ///
    /// Returns `false` if the completion policy discarded it.
    pub fn finish(&self, ticket: FetchTicket, outcome: Result<FeedSuccess, FeedError>) -> bool {
        let mut state = self.shared.state.lock();
        let latest = ticket.seq == state.issued;

        if !latest && self.shared.policy == CompletionPolicy::LatestIssuedWins {
            tracing::debug!(
                city = %ticket.city,
                seq = ticket.seq,
                latest = state.issued,
                "discarding stale completion"
            );
            return false;
        }

        match outcome {
            Ok(success) => {
                let band = classify(i64::from(success.reading.value));
                tracing::info!(
                    city = %ticket.city,
                    aqi = success.reading.value,
                    band = %band,
                    "query loaded"
                );
                state.last_forecast = forecast::normalize(&success.forecast);
                state.last_reading = Some(success.reading);
                state.last_error = None;
                state.status = Status::Loaded;
            }
            Err(err) => {
                tracing::warn!(city = %ticket.city, kind = ?err.kind(), "query failed: {err}");
                state.last_error = Some(err);
                state.status = Status::Error;
            }
        }

        if latest {
            state.city_in_flight = None;
        }

        self.publish(&state);
        true
    }

    /// Issue a query and fetch it on the tokio runtime.
    ///
    /// Earlier queries still in flight are not cancelled.
    pub fn submit(&self, city_text: &str) -> Result<JoinHandle<()>, QueryError> {
        let ticket = self.begin(city_text)?;
        Ok(self.spawn_fetch(ticket))
    }

    fn spawn_fetch(&self, ticket: FetchTicket) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let outcome = controller.shared.client.fetch(&ticket.city).await;
            controller.finish(ticket, outcome);
        })
    }

    fn publish(&self, state: &QueryState) {
        self.shared.views.send_replace(state.view());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{forecast::ForecastPayload, resolver::CityTable};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::oneshot;

    type Outcome = Result<FeedSuccess, FeedError>;

    fn key(raw: &str) -> CityKey {
        CityKey::normalize(raw).expect("non-empty key")
    }

    fn success(aqi: u32, station: &str) -> Outcome {
        Ok(FeedSuccess {
            reading: AqiReading {
                value: aqi,
                station_name: station.to_string(),
                dominant_pollutant: None,
            },
            forecast: ForecastPayload::new(Some(json!({
                "daily": { "pm25": [ { "day": "2026-10-16", "avg": aqi } ] }
            }))),
        })
    }

    fn not_found(city: &str) -> Outcome {
        Err(FeedError::NotFound {
            city: key(city),
            reason: "Unknown station".into(),
        })
    }

    /// Answers immediately from a fixed table; unknown cities are `NotFound`.
    #[derive(Debug, Default)]
    struct StaticFeed {
        answers: HashMap<String, Outcome>,
    }

    impl StaticFeed {
        fn with(mut self, city: &str, outcome: Outcome) -> Self {
            self.answers.insert(city.to_string(), outcome);
            self
        }
    }

    #[async_trait]
    impl FeedClient for StaticFeed {
        async fn fetch(&self, city: &CityKey) -> Outcome {
            self.answers
                .get(city.as_str())
                .cloned()
                .unwrap_or_else(|| not_found(city.as_str()))
        }
    }

    /// Each city's fetch waits until the test releases it.
    #[derive(Debug, Default)]
    struct GatedFeed {
        gates: Mutex<HashMap<String, oneshot::Receiver<Outcome>>>,
    }

    impl GatedFeed {
        fn gate(&self, city: &str) -> oneshot::Sender<Outcome> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(city.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl FeedClient for GatedFeed {
        async fn fetch(&self, city: &CityKey) -> Outcome {
            let gate = self.gates.lock().remove(city.as_str());
            match gate {
                Some(rx) => rx.await.unwrap_or_else(|_| not_found(city.as_str())),
                None => not_found(city.as_str()),
            }
        }
    }

    fn settings(default_city: &str, policy: CompletionPolicy) -> ControllerSettings {
        ControllerSettings {
            default_city: key(default_city),
            fallback_coordinate: Coordinate::new(0.0, 0.0).expect("valid"),
            policy,
        }
    }

    fn controller(client: Arc<dyn FeedClient>, policy: CompletionPolicy) -> ViewController {
        ViewController::new(client, Arc::new(CityTable::builtin()), settings("tokyo", policy))
    }

    fn tokyo() -> Coordinate {
        CityTable::builtin().resolve(&key("tokyo")).expect("bundled")
    }

    #[tokio::test]
    async fn launch_starts_loading_then_loads_default_city() {
        let feed = StaticFeed::default().with("tokyo", success(42, "Tokyo"));
        let (ctl, handle) = ViewController::launch(
            Arc::new(feed),
            Arc::new(CityTable::builtin()),
            settings("Tokyo", CompletionPolicy::default()),
        );

        assert_eq!(ctl.view().status, Status::Loading);
        handle.await.expect("fetch task");

        let view = ctl.view();
        assert_eq!(view.status, Status::Loaded);
        assert_eq!(view.band, Some(SeverityBand::Good));
        assert_eq!(view.reading.map(|r| r.station_name), Some("Tokyo".to_string()));
        assert_eq!(view.coordinate, tokyo());
        assert_eq!(view.forecast.len(), 1);
        assert_eq!(view.city_in_flight, None);
    }

    #[test]
    fn new_controller_is_idle_on_default_coordinate() {
        let ctl = controller(Arc::new(StaticFeed::default()), CompletionPolicy::default());
        let view = ctl.view();
        assert_eq!(view.status, Status::Idle);
        assert_eq!(view.coordinate, tokyo());
        assert!(view.reading.is_none());
    }

    #[test]
    fn unknown_default_city_uses_fallback_coordinate() {
        let ctl = ViewController::new(
            Arc::new(StaticFeed::default()),
            Arc::new(CityTable::builtin()),
            settings("atlantis", CompletionPolicy::default()),
        );
        assert_eq!(ctl.view().coordinate, Coordinate::new(0.0, 0.0).expect("valid"));
    }

    #[test]
    fn begin_rejects_blank_input_without_transition() {
        let ctl = controller(Arc::new(StaticFeed::default()), CompletionPolicy::default());
        assert_eq!(ctl.begin("   ").unwrap_err(), QueryError::EmptyCity);
        assert_eq!(ctl.view().status, Status::Idle);
    }

    #[test]
    fn begin_moves_map_only_on_resolver_hit() {
        let ctl = controller(Arc::new(StaticFeed::default()), CompletionPolicy::default());

        let ticket = ctl.begin("Paris").expect("valid city");
        assert_eq!(ticket.city().as_str(), "paris");
        let paris = ctl.view().coordinate;
        assert_ne!(paris, tokyo());

        ctl.begin("nowhere").expect("valid city");
        let view = ctl.view();
        assert_eq!(view.status, Status::Loading);
        assert_eq!(view.coordinate, paris);
        assert_eq!(view.city_in_flight, Some(key("nowhere")));
    }

    #[tokio::test]
    async fn not_found_keeps_previous_reading() {
        let feed = StaticFeed::default().with("tokyo", success(42, "Tokyo"));
        let ctl = controller(Arc::new(feed), CompletionPolicy::default());

        ctl.submit("tokyo").expect("valid city").await.expect("fetch task");
        let before = ctl.view();

        ctl.submit("nowhere").expect("valid city").await.expect("fetch task");
        let after = ctl.view();

        assert_eq!(after.status, Status::Error);
        assert_eq!(after.reading, before.reading);
        assert_eq!(after.forecast, before.forecast);
        assert_eq!(after.band, Some(SeverityBand::Good));
        assert!(after.error.as_deref().is_some_and(|e| e.contains("nowhere")));
    }

    #[tokio::test]
    async fn transport_failure_without_prior_reading() {
        let feed = StaticFeed::default().with(
            "tokyo",
            Err(FeedError::Transport {
                city: key("tokyo"),
                message: "connection reset".into(),
            }),
        );
        let ctl = controller(Arc::new(feed), CompletionPolicy::default());

        ctl.submit("Tokyo").expect("valid city").await.expect("fetch task");

        let view = ctl.view();
        assert_eq!(view.status, Status::Error);
        assert!(view.reading.is_none());
        assert!(view.forecast.is_empty());
    }

    #[tokio::test]
    async fn success_after_error_clears_error() {
        let feed = StaticFeed::default().with("delhi", success(250, "Delhi"));
        let ctl = controller(Arc::new(feed), CompletionPolicy::default());

        ctl.submit("nowhere").expect("valid city").await.expect("fetch task");
        ctl.submit("delhi").expect("valid city").await.expect("fetch task");

        let view = ctl.view();
        assert_eq!(view.status, Status::Loaded);
        assert_eq!(view.band, Some(SeverityBand::VeryUnhealthy));
        assert_eq!(view.error, None);
    }

    #[tokio::test]
    async fn last_resolved_wins_lets_slow_request_overwrite() {
        let feed = Arc::new(GatedFeed::default());
        let release_a = feed.gate("a");
        let release_b = feed.gate("b");
        let ctl = controller(feed.clone(), CompletionPolicy::LastResolvedWins);

        let slow = ctl.submit("a").expect("valid city");
        let fast = ctl.submit("b").expect("valid city");

        release_b.send(success(150, "B")).expect("b waiting");
        fast.await.expect("fetch task");
        assert_eq!(ctl.view().reading.map(|r| r.station_name), Some("B".to_string()));

        release_a.send(success(20, "A")).expect("a waiting");
        slow.await.expect("fetch task");

        let view = ctl.view();
        assert_eq!(view.status, Status::Loaded);
        assert_eq!(view.reading.map(|r| r.station_name), Some("A".to_string()));
        assert_eq!(view.band, Some(SeverityBand::Good));
    }

    #[tokio::test]
    async fn latest_issued_wins_discards_stale_completion() {
        let feed = Arc::new(GatedFeed::default());
        let release_a = feed.gate("a");
        let release_b = feed.gate("b");
        let ctl = controller(feed.clone(), CompletionPolicy::LatestIssuedWins);

        let slow = ctl.submit("a").expect("valid city");
        let fast = ctl.submit("b").expect("valid city");

        release_b.send(success(150, "B")).expect("b waiting");
        fast.await.expect("fetch task");
        release_a.send(success(20, "A")).expect("a waiting");
        slow.await.expect("fetch task");

        let view = ctl.view();
        assert_eq!(view.status, Status::Loaded);
        assert_eq!(view.reading.map(|r| r.station_name), Some("B".to_string()));
        assert_eq!(view.band, Some(SeverityBand::Unhealthy));
    }

    #[test]
    fn finish_reports_whether_completion_applied() {
        let ctl = controller(Arc::new(StaticFeed::default()), CompletionPolicy::LatestIssuedWins);
        let first = ctl.begin("a").expect("valid city");
        let second = ctl.begin("b").expect("valid city");

        assert!(!ctl.finish(first, success(10, "A")));
        assert_eq!(ctl.view().status, Status::Loading);
        assert!(ctl.finish(second, success(10, "B")));
        assert_eq!(ctl.view().status, Status::Loaded);
    }

    #[test]
    fn stale_completion_keeps_newer_request_in_flight() {
        let ctl = controller(Arc::new(StaticFeed::default()), CompletionPolicy::LastResolvedWins);
        let first = ctl.begin("a").expect("valid city");
        let _second = ctl.begin("b").expect("valid city");

        assert!(ctl.finish(first, success(10, "A")));
        assert_eq!(ctl.view().city_in_flight, Some(key("b")));
    }

    #[tokio::test]
    async fn subscribers_see_each_transition() {
        let feed = StaticFeed::default().with("seoul", success(80, "Seoul"));
        let ctl = controller(Arc::new(feed), CompletionPolicy::default());
        let mut views = ctl.subscribe();

        let ticket = ctl.begin("seoul").expect("valid city");
        assert!(views.has_changed().expect("sender alive"));
        assert_eq!(views.borrow_and_update().status, Status::Loading);

        let outcome = success(80, "Seoul");
        ctl.finish(ticket, outcome);
        assert!(views.has_changed().expect("sender alive"));
        let view = views.borrow_and_update().clone();
        assert_eq!(view.status, Status::Loaded);
        assert_eq!(view.band, Some(SeverityBand::Moderate));
    }

    #[tokio::test]
    async fn view_model_json_carries_band_advisory() {
        let feed = StaticFeed::default().with("tokyo", success(42, "Tokyo"));
        let ctl = controller(Arc::new(feed), CompletionPolicy::default());
        ctl.submit("tokyo").expect("valid city").await.expect("fetch task");

        let json = serde_json::to_value(ctl.view()).expect("serializable");
        assert_eq!(json["status"], "loaded");
        assert_eq!(json["band"]["kind"], "good");
        assert_eq!(json["band"]["color"], SeverityBand::Good.color());
        assert_eq!(json["band"]["advice"], SeverityBand::Good.advice());
        assert_eq!(json["forecast"][0]["day"], "2026-10-16");
    }
}
