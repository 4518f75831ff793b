//! Contracts for the third-party geodata services the engine consumes.
//!
//! HTTP implementations live in [`crate::providers`]; deterministic doubles in
//! [`crate::test_support`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use geo_types::Rect;
use shared::{Coordinate, PoiCategory, RouteInfo, SearchResult, TravelProfile};

use crate::error::ServiceError;

/// Extra alternatives requested on top of the primary route.
pub const MAX_EXTRA_ALTERNATIVES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub start: Coordinate,
    pub end: Coordinate,
    pub profile: TravelProfile,
    pub alternatives: usize,
}

#[async_trait]
pub trait RoutingService: Send + Sync {
    /// Routes in service order; the first one is the canonical primary.
    async fn route(&self, request: &RouteRequest) -> Result<Vec<RouteInfo>, ServiceError>;
}

#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn search(
        &self,
        query: &str,
        country_code: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, ServiceError>;

    /// Best-effort place name (city, then town, village, county).
    async fn reverse(&self, at: Coordinate) -> Result<Option<String>, ServiceError>;
}

/// A tagged element as returned by the spatial-query service.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiElement {
    pub id: u64,
    pub name: Option<String>,
    pub coordinate: Coordinate,
}

#[async_trait]
pub trait PoiService: Send + Sync {
    /// Elements matching `category` inside `bounds` (`x = lon`, `y = lat`).
    async fn query(
        &self,
        bounds: Rect<f64>,
        category: PoiCategory,
    ) -> Result<Vec<PoiElement>, ServiceError>;
}

#[async_trait]
pub trait ElevationService: Send + Sync {
    /// One elevation in meters per input point, same order.
    async fn elevations(&self, points: &[Coordinate]) -> Result<Vec<f64>, ServiceError>;
}

/// Current snapshot as reported; any field may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportedConditions {
    pub temperature_c: Option<f64>,
    pub weather_code: Option<u16>,
    pub wind_speed_kmh: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub visibility_m: Option<f64>,
    pub pressure_hpa: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportedHour {
    pub time: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub weather_code: Option<u16>,
    pub precipitation_probability: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastReport {
    pub current: ReportedConditions,
    pub hourly: Vec<ReportedHour>,
}

#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn forecast(&self, at: Coordinate) -> Result<ForecastReport, ServiceError>;
}

/// Bound a service call by the client-side timeout.
pub async fn with_deadline<T, F>(timeout: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("service call exceeded {:?}", timeout);
            Err(ServiceError::Timeout {
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}
