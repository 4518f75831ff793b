//! Deterministic doubles for the service traits and the map surface.
//!
//! Nothing here touches the network; every stub answers from data supplied at
//! construction and records what it was asked.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use geo_types::Rect;
use shared::{Coordinate, NavigationStep, PoiCategory, RouteInfo, SearchResult};

use crate::error::ServiceError;
use crate::overlay::{FitOptions, Layer, LayerKey, MapSurface};
use crate::services::{
    ElevationService, ForecastReport, GeocodingService, PoiElement, PoiService, ReportedConditions,
    ReportedHour, RouteRequest, RoutingService, WeatherService,
};

fn unavailable(service: &str) -> ServiceError {
    ServiceError::Http {
        url: format!("http://{service}.invalid"),
        status: 503,
        message: "service unavailable".to_string(),
    }
}

fn record<T>(log: &Mutex<Vec<T>>, entry: T) {
    log.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
}

fn snapshot<T: Clone>(log: &Mutex<Vec<T>>) -> Vec<T> {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// One call made on a [`RecordingSurface`], keys rendered as `owner/name`.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Upsert(String),
    Remove(String),
    Fit {
        bounds: Rect<f64>,
        padding_px: u32,
        duration_ms: u64,
    },
}

/// Map surface that keeps the current layers and a log of calls.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub ops: Vec<SurfaceOp>,
    pub layers: BTreeMap<String, Layer>,
}

impl RecordingSurface {
    pub fn has_layer(&self, key: &str) -> bool {
        self.layers.contains_key(key)
    }

    pub fn layer(&self, key: &str) -> Option<&Layer> {
        self.layers.get(key)
    }
}

impl MapSurface for RecordingSurface {
    fn upsert_layer(&mut self, key: &LayerKey, layer: &Layer) {
        self.ops.push(SurfaceOp::Upsert(key.to_string()));
        self.layers.insert(key.to_string(), layer.clone());
    }

    fn remove_layer(&mut self, key: &LayerKey) {
        self.ops.push(SurfaceOp::Remove(key.to_string()));
        self.layers.remove(&key.to_string());
    }

    fn fit_bounds(&mut self, bounds: Rect<f64>, options: FitOptions) {
        self.ops.push(SurfaceOp::Fit {
            bounds,
            padding_px: options.padding_px,
            duration_ms: options.duration_ms,
        });
    }
}

/// `n` evenly spaced points from `from` to `to`, both included.
pub fn straight_route(from: Coordinate, to: Coordinate, n: usize) -> Vec<Coordinate> {
    if n <= 1 {
        return vec![from; n];
    }
    let last = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let t = i as f64 / last;
            Coordinate::from_lon_lat(
                from.lon + (to.lon - from.lon) * t,
                from.lat + (to.lat - from.lat) * t,
            )
        })
        .collect()
}

pub const KARACHI: Coordinate = Coordinate::from_lon_lat(67.0011, 24.8607);
pub const ISLAMABAD: Coordinate = Coordinate::from_lon_lat(73.0479, 33.6844);

/// Karachi to Islamabad with a depart/turn/arrive step list.
pub fn sample_route(distance_m: f64, duration_s: f64) -> RouteInfo {
    let geometry = straight_route(KARACHI, ISLAMABAD, 12);
    let step = |kind: &str, modifier: Option<&str>, road: &str, at: Coordinate, share: f64| {
        NavigationStep {
            instruction: crate::routing::describe_step(kind, modifier, road),
            distance_m: distance_m * share,
            duration_s: duration_s * share,
            maneuver_type: kind.to_string(),
            maneuver_modifier: modifier.map(str::to_string),
            road_name: road.to_string(),
            location: at,
        }
    };
    let steps = vec![
        step("depart", None, "Shahrah-e-Faisal", geometry[0], 0.1),
        step("turn", Some("right"), "M-9", geometry[3], 0.9),
        step("arrive", None, "", geometry[11], 0.0),
    ];
    RouteInfo {
        distance_m,
        duration_s,
        geometry,
        steps,
    }
}

pub fn search_hit(id: u64, name: &str) -> SearchResult {
    SearchResult {
        id,
        display_name: name.to_string(),
        lat: 31.5204,
        lon: 74.3587,
        kind: "city".to_string(),
        class: "place".to_string(),
    }
}

/// Routing stub answering every request with the same outcome.
#[derive(Debug)]
pub struct StubRouter {
    response: Result<Vec<RouteInfo>, ServiceError>,
    requests: Mutex<Vec<RouteRequest>>,
}

impl StubRouter {
    pub fn with_routes(routes: Vec<RouteInfo>) -> Self {
        Self {
            response: Ok(routes),
            requests: Mutex::default(),
        }
    }

    pub fn with_error(error: ServiceError) -> Self {
        Self {
            response: Err(error),
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<RouteRequest> {
        snapshot(&self.requests)
    }
}

#[async_trait]
impl RoutingService for StubRouter {
    async fn route(&self, request: &RouteRequest) -> Result<Vec<RouteInfo>, ServiceError> {
        record(&self.requests, *request);
        self.response.clone()
    }
}

/// Geocoder that names every place the same, or fails everything.
#[derive(Debug)]
pub struct StubGeocoder {
    name: Option<String>,
    searches: Mutex<Vec<(String, String, usize)>>,
}

impl StubGeocoder {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            searches: Mutex::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            name: None,
            searches: Mutex::default(),
        }
    }

    /// `(query, country_code, limit)` per search call.
    pub fn searches(&self) -> Vec<(String, String, usize)> {
        snapshot(&self.searches)
    }
}

#[async_trait]
impl GeocodingService for StubGeocoder {
    async fn search(
        &self,
        query: &str,
        country_code: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, ServiceError> {
        record(
            &self.searches,
            (query.to_string(), country_code.to_string(), limit),
        );
        let name = self.name.as_deref().ok_or_else(|| unavailable("geocoder"))?;
        Ok(vec![search_hit(1, name)])
    }

    async fn reverse(&self, _at: Coordinate) -> Result<Option<String>, ServiceError> {
        match &self.name {
            Some(name) => Ok(Some(name.clone())),
            None => Err(unavailable("geocoder")),
        }
    }
}

/// POI stub with fixed elements per category; unknown categories are empty.
#[derive(Debug, Default)]
pub struct StubPois {
    elements: BTreeMap<PoiCategory, Vec<PoiElement>>,
    failing: Vec<PoiCategory>,
}

impl StubPois {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: PoiCategory, elements: Vec<PoiElement>) -> Self {
        self.elements.insert(category, elements);
        self
    }

    pub fn failing_for(mut self, category: PoiCategory) -> Self {
        self.failing.push(category);
        self
    }
}

#[async_trait]
impl PoiService for StubPois {
    async fn query(
        &self,
        _bounds: Rect<f64>,
        category: PoiCategory,
    ) -> Result<Vec<PoiElement>, ServiceError> {
        if self.failing.contains(&category) {
            return Err(unavailable("overpass"));
        }
        Ok(self.elements.get(&category).cloned().unwrap_or_default())
    }
}

#[derive(Debug)]
enum ElevationAnswer {
    ByLatitude,
    Fixed(Vec<f64>),
    Fail,
}

/// Elevation stub that records the size of every batch it receives.
#[derive(Debug)]
pub struct StubElevation {
    answer: ElevationAnswer,
    batches: Mutex<Vec<usize>>,
}

impl StubElevation {
    fn answering(answer: ElevationAnswer) -> Self {
        Self {
            answer,
            batches: Mutex::default(),
        }
    }

    /// Ten meters per degree of latitude.
    pub fn by_latitude() -> Self {
        Self::answering(ElevationAnswer::ByLatitude)
    }

    /// The same array for every batch, whatever its size.
    pub fn fixed(values: Vec<f64>) -> Self {
        Self::answering(ElevationAnswer::Fixed(values))
    }

    pub fn failing() -> Self {
        Self::answering(ElevationAnswer::Fail)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        snapshot(&self.batches)
    }
}

#[async_trait]
impl ElevationService for StubElevation {
    async fn elevations(&self, points: &[Coordinate]) -> Result<Vec<f64>, ServiceError> {
        record(&self.batches, points.len());
        match &self.answer {
            ElevationAnswer::ByLatitude => Ok(points.iter().map(|p| p.lat * 10.0).collect()),
            ElevationAnswer::Fixed(values) => Ok(values.clone()),
            ElevationAnswer::Fail => Err(unavailable("elevation")),
        }
    }
}

/// Forecast stub: 28 °C everywhere, 24 clear hours.
#[derive(Debug, Default)]
pub struct StubWeather {
    fail_at: Option<Coordinate>,
    delay: Option<Duration>,
}

impl StubWeather {
    pub fn mild() -> Self {
        Self::default()
    }

    pub fn failing_at(at: Coordinate) -> Self {
        Self {
            fail_at: Some(at),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl WeatherService for StubWeather {
    async fn forecast(&self, at: Coordinate) -> Result<ForecastReport, ServiceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(at) {
            return Err(unavailable("weather"));
        }
        let midnight = NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .ok_or_else(|| ServiceError::parse("bad stub date"))?;
        let hourly = (0..24)
            .map(|hour| ReportedHour {
                time: midnight + chrono::Duration::hours(hour),
                temperature_c: Some(26.0 + (hour % 6) as f64),
                weather_code: Some(0),
                precipitation_probability: Some(0.0),
            })
            .collect();
        Ok(ForecastReport {
            current: ReportedConditions {
                temperature_c: Some(28.0),
                weather_code: Some(0),
                wind_speed_kmh: Some(12.0),
                humidity_pct: Some(45.0),
                visibility_m: None,
                pressure_hpa: None,
            },
            hourly,
        })
    }
}
