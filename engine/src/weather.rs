//! Weather along a route: a few evenly spaced samples, fetched in parallel.

use std::time::Duration;

use futures_util::future::{join, try_join_all};
use shared::{Coordinate, CurrentConditions, HourlyForecast, WeatherSample};

use crate::error::{EngineError, ServiceError};
use crate::routing::{Applied, RequestId};
use crate::services::{with_deadline, ForecastReport, GeocodingService, WeatherService};

pub const MIN_SAMPLES: usize = 3;
pub const MAX_SAMPLES: usize = 5;
const COORDINATES_PER_SAMPLE: usize = 20;
pub const HOURLY_ENTRIES: usize = 24;

const DEFAULT_VISIBILITY_M: f64 = 10_000.0;
const DEFAULT_PRESSURE_HPA: f64 = 1013.0;

/// `clamp(n / 20, 3, 5)` indices, evenly spread, the last one always `n - 1`.
pub fn sample_indices(route_len: usize) -> Vec<usize> {
    if route_len == 0 {
        return Vec::new();
    }
    let count = (route_len / COORDINATES_PER_SAMPLE).clamp(MIN_SAMPLES, MAX_SAMPLES);
    let last = route_len - 1;
    let mut indices: Vec<usize> = (0..count).map(|i| i * last / (count - 1)).collect();
    if let Some(tail) = indices.last_mut() {
        *tail = last;
    }
    indices
}

pub fn sample_points(geometry: &[Coordinate]) -> Vec<Coordinate> {
    sample_indices(geometry.len())
        .into_iter()
        .map(|idx| geometry[idx])
        .collect()
}

/// "Start: ", "End: " or no prefix, over the place name or "Point N".
pub fn sample_label(index: usize, count: usize, place: Option<String>) -> String {
    let place = place.unwrap_or_else(|| format!("Point {}", index + 1));
    if index == 0 {
        format!("Start: {place}")
    } else if index + 1 == count {
        format!("End: {place}")
    } else {
        place
    }
}

/// Fill absent fields with neutral values and keep 24 hours.
pub fn into_sample(label: String, coordinate: Coordinate, report: ForecastReport) -> WeatherSample {
    let reported = report.current;
    let current = CurrentConditions {
        temperature_c: reported.temperature_c.unwrap_or(0.0),
        weather_code: reported.weather_code.unwrap_or(0),
        wind_speed_kmh: reported.wind_speed_kmh.unwrap_or(0.0),
        humidity_pct: reported.humidity_pct.unwrap_or(0.0),
        visibility_m: reported.visibility_m.unwrap_or(DEFAULT_VISIBILITY_M),
        pressure_hpa: reported.pressure_hpa.unwrap_or(DEFAULT_PRESSURE_HPA),
    };
    let hourly = report
        .hourly
        .into_iter()
        .take(HOURLY_ENTRIES)
        .map(|hour| HourlyForecast {
            time: hour.time,
            temperature_c: hour.temperature_c.unwrap_or(0.0),
            weather_code: hour.weather_code.unwrap_or(0),
            precipitation_probability: hour.precipitation_probability.unwrap_or(0.0),
        })
        .collect();
    WeatherSample {
        location_label: label,
        coordinate,
        current,
        hourly,
    }
}

/// Forecast every sample point concurrently.
///
/// Each point's forecast and reverse geocode run side by side; a geocode
/// failure only costs the place name. Any forecast failure fails the whole
/// call.
pub async fn sample_route_weather(
    weather: &dyn WeatherService,
    geocoder: &dyn GeocodingService,
    geometry: &[Coordinate],
    timeout: Duration,
) -> Result<Vec<WeatherSample>, ServiceError> {
    let points = sample_points(geometry);
    if points.is_empty() {
        return Err(ServiceError::InvalidInput("route has no coordinates".to_string()));
    }
    let count = points.len();
    tracing::info!("weather: sampling {count} point(s) along the route");

    let fetches = points.into_iter().enumerate().map(|(idx, at)| async move {
        let (forecast, place) = join(
            with_deadline(timeout, weather.forecast(at)),
            with_deadline(timeout, geocoder.reverse(at)),
        )
        .await;
        let place = place.unwrap_or_else(|err| {
            tracing::debug!("weather: reverse geocode for point {} failed: {err}", idx + 1);
            None
        });
        let report = forecast.inspect_err(|err| {
            tracing::warn!("weather: forecast for point {} failed: {err}", idx + 1);
        })?;
        Ok::<_, ServiceError>(into_sample(sample_label(idx, count, place), at, report))
    });

    try_join_all(fetches).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherQuery {
    pub id: RequestId,
    pub geometry: Vec<Coordinate>,
}

#[derive(Debug, Default)]
pub struct WeatherSampler {
    samples: Vec<WeatherSample>,
    pending: Option<RequestId>,
    next_id: RequestId,
    last_error: Option<ServiceError>,
}

impl WeatherSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[WeatherSample] {
        &self.samples
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_error(&self) -> Option<&ServiceError> {
        self.last_error.as_ref()
    }

    /// # Errors
    /// [`EngineError::EmptyGeometry`] for a route without coordinates.
    pub fn begin(&mut self, geometry: &[Coordinate]) -> Result<WeatherQuery, EngineError> {
        if geometry.is_empty() {
            return Err(EngineError::EmptyGeometry);
        }
        self.next_id += 1;
        self.pending = Some(self.next_id);
        self.samples.clear();
        self.last_error = None;
        Ok(WeatherQuery {
            id: self.next_id,
            geometry: geometry.to_vec(),
        })
    }

    /// # Errors
    /// Returns the failure of the current request after clearing all samples.
    pub fn apply(
        &mut self,
        id: RequestId,
        result: Result<Vec<WeatherSample>, ServiceError>,
    ) -> Result<Applied, EngineError> {
        if self.pending != Some(id) {
            tracing::debug!("weather: discarding stale samples #{id}");
            return Ok(Applied::Stale);
        }
        self.pending = None;
        match result {
            Ok(samples) => {
                self.samples = samples;
                Ok(Applied::Accepted)
            }
            Err(err) => {
                self.samples.clear();
                self.last_error = Some(err.clone());
                Err(err.into())
            }
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.pending = None;
        self.last_error = None;
    }
}

pub async fn run_weather(
    weather: &dyn WeatherService,
    geocoder: &dyn GeocodingService,
    query: &WeatherQuery,
    timeout: Duration,
) -> Result<Vec<WeatherSample>, ServiceError> {
    sample_route_weather(weather, geocoder, &query.geometry, timeout).await
}
