//! OSRM `route/v1` client.
//!
//! See: <http://project-osrm.org/docs/v5.24.0/api/#route-service>

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::{Coordinate, NavigationStep, RouteInfo};

use super::{fetch_json, join_url};
use crate::config::EngineConfig;
use crate::error::ServiceError;
use crate::routing::describe_step;
use crate::services::{RouteRequest, RoutingService};

#[derive(Debug, Clone)]
pub struct OsrmRouter {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl OsrmRouter {
    pub fn new(client: Client, config: &EngineConfig) -> Self {
        Self {
            client,
            base_url: config.routing_url.clone(),
            timeout_secs: config.request_timeout.as_secs(),
        }
    }

    /// `{base}/route/v1/{profile}/{lon},{lat};{lon},{lat}`
    fn route_url(&self, request: &RouteRequest) -> String {
        join_url(
            &self.base_url,
            &format!(
                "route/v1/{}/{},{};{},{}",
                request.profile.as_str(),
                request.start.lon,
                request.start.lat,
                request.end.lon,
                request.end.lat
            ),
        )
    }
}

#[async_trait]
impl RoutingService for OsrmRouter {
    async fn route(&self, request: &RouteRequest) -> Result<Vec<RouteInfo>, ServiceError> {
        let url = self.route_url(request);
        let alternatives = request.alternatives.to_string();
        let builder = self.client.get(&url).query(&[
            ("alternatives", alternatives.as_str()),
            ("steps", "true"),
            ("geometries", "geojson"),
            ("overview", "full"),
        ]);
        let response: RouteResponse = fetch_json(builder, &url, self.timeout_secs).await?;
        response.into_routes()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RouteResponse {
    /// `"Ok"` on success, otherwise e.g. `"NoRoute"` or `"InvalidQuery"`.
    pub code: String,
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmRoute {
    pub distance: f64,
    pub duration: f64,
    pub geometry: LineString,
    #[serde(default)]
    pub legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LineString {
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmLeg {
    #[serde(default)]
    pub steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmStep {
    pub distance: f64,
    pub duration: f64,
    #[serde(default)]
    pub name: String,
    pub maneuver: Maneuver,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Maneuver {
    #[serde(rename = "type")]
    pub kind: String,
    pub modifier: Option<String>,
    pub location: [f64; 2],
    pub instruction: Option<String>,
}

impl RouteResponse {
    fn into_routes(self) -> Result<Vec<RouteInfo>, ServiceError> {
        if self.code != "Ok" {
            return Err(ServiceError::Upstream {
                code: self.code,
                message: self.message.unwrap_or_default(),
            });
        }
        Ok(self.routes.into_iter().map(OsrmRoute::into_info).collect())
    }
}

impl OsrmRoute {
    fn into_info(self) -> RouteInfo {
        let geometry = self
            .geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| Coordinate::from_lon_lat(lon, lat))
            .collect();
        let steps = self
            .legs
            .into_iter()
            .flat_map(|leg| leg.steps)
            .map(OsrmStep::into_step)
            .collect();
        RouteInfo {
            distance_m: self.distance,
            duration_s: self.duration,
            geometry,
            steps,
        }
    }
}

impl OsrmStep {
    fn into_step(self) -> NavigationStep {
        let Maneuver {
            kind,
            modifier,
            location: [lon, lat],
            instruction,
        } = self.maneuver;
        let instruction = instruction
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| describe_step(&kind, modifier.as_deref(), &self.name));
        NavigationStep {
            instruction,
            distance_m: self.distance,
            duration_s: self.duration,
            maneuver_type: kind,
            maneuver_modifier: modifier,
            road_name: self.name,
            location: Coordinate::from_lon_lat(lon, lat),
        }
    }
}
