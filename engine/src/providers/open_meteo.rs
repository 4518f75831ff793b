//! Open-Meteo elevation and forecast endpoints.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use shared::Coordinate;

use super::fetch_json;
use crate::config::EngineConfig;
use crate::error::ServiceError;
use crate::services::{
    ElevationService, ForecastReport, ReportedConditions, ReportedHour, WeatherService,
};

const CURRENT_VARIABLES: &str =
    "temperature_2m,weather_code,wind_speed_10m,relative_humidity_2m,visibility,pressure_msl";
const HOURLY_VARIABLES: &str = "temperature_2m,weather_code,precipitation_probability";
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone)]
pub struct OpenMeteoElevation {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl OpenMeteoElevation {
    pub fn new(client: Client, config: &EngineConfig) -> Self {
        Self {
            client,
            url: config.elevation_url.clone(),
            timeout_secs: config.request_timeout.as_secs(),
        }
    }
}

fn joined(points: &[Coordinate], field: impl Fn(&Coordinate) -> f64) -> String {
    points
        .iter()
        .map(|p| field(p).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ElevationService for OpenMeteoElevation {
    async fn elevations(&self, points: &[Coordinate]) -> Result<Vec<f64>, ServiceError> {
        let builder = self.client.get(&self.url).query(&[
            ("latitude", joined(points, |p| p.lat)),
            ("longitude", joined(points, |p| p.lon)),
        ]);
        let response: ElevationResponse = fetch_json(builder, &self.url, self.timeout_secs).await?;
        response
            .elevation
            .ok_or_else(|| ServiceError::parse("elevation response missing `elevation`"))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ElevationResponse {
    pub elevation: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct OpenMeteoWeather {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl OpenMeteoWeather {
    pub fn new(client: Client, config: &EngineConfig) -> Self {
        Self {
            client,
            url: config.weather_url.clone(),
            timeout_secs: config.request_timeout.as_secs(),
        }
    }
}

#[async_trait]
impl WeatherService for OpenMeteoWeather {
    async fn forecast(&self, at: Coordinate) -> Result<ForecastReport, ServiceError> {
        let builder = self.client.get(&self.url).query(&[
            ("latitude", at.lat.to_string()),
            ("longitude", at.lon.to_string()),
            ("current", CURRENT_VARIABLES.to_string()),
            ("hourly", HOURLY_VARIABLES.to_string()),
            ("forecast_days", "1".to_string()),
            ("timezone", "auto".to_string()),
        ]);
        let response: ForecastResponse = fetch_json(builder, &self.url, self.timeout_secs).await?;
        response.into_report()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastResponse {
    #[serde(default)]
    pub current: Current,
    #[serde(default)]
    pub hourly: Hourly,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Current {
    pub temperature_2m: Option<f64>,
    pub weather_code: Option<u16>,
    pub wind_speed_10m: Option<f64>,
    pub relative_humidity_2m: Option<f64>,
    pub visibility: Option<f64>,
    pub pressure_msl: Option<f64>,
}

/// Column-oriented hourly series; columns may be shorter than `time`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Hourly {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub weather_code: Vec<Option<u16>>,
    #[serde(default)]
    pub precipitation_probability: Vec<Option<f64>>,
}

impl ForecastResponse {
    fn into_report(self) -> Result<ForecastReport, ServiceError> {
        let current = ReportedConditions {
            temperature_c: self.current.temperature_2m,
            weather_code: self.current.weather_code,
            wind_speed_kmh: self.current.wind_speed_10m,
            humidity_pct: self.current.relative_humidity_2m,
            visibility_m: self.current.visibility,
            pressure_hpa: self.current.pressure_msl,
        };

        let hourly = &self.hourly;
        let hours = hourly
            .time
            .iter()
            .enumerate()
            .map(|(idx, stamp)| {
                let time = NaiveDateTime::parse_from_str(stamp, TIME_FORMAT)
                    .map_err(|err| ServiceError::parse(format!("hourly time {stamp:?}: {err}")))?;
                Ok(ReportedHour {
                    time,
                    temperature_c: hourly.temperature_2m.get(idx).copied().flatten(),
                    weather_code: hourly.weather_code.get(idx).copied().flatten(),
                    precipitation_probability: hourly
                        .precipitation_probability
                        .get(idx)
                        .copied()
                        .flatten(),
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(ForecastReport {
            current,
            hourly: hours,
        })
    }
}
