//! Routing coordinator: start/end selection, route requests, alternatives.
//!
//! The coordinator is a synchronous state machine. Network work is split into
//! three steps so overlapping requests stay consistent:
//!
//! 1. a state transition returns a [`RouteQuery`] ticket,
//! 2. the caller runs it with [`fetch_route`],
//! 3. [`RoutingCoordinator::apply_route_response`] applies the result, or
//!    drops it when a newer request has superseded the ticket.

use std::time::Duration;

use shared::{
    AlternativeRank, NavigationStep, RouteAlternative, RouteInfo, RoutePoint, Savings,
    SelectionMode, TravelProfile,
};

use crate::error::{EngineError, ServiceError};
use crate::geodesy;
use crate::overlay::{FitOptions, Layer, LayerOwner, LineStyle, MapSurface, MarkerKind, OwnedLayers};
use crate::services::{with_deadline, RouteRequest, RoutingService, MAX_EXTRA_ALTERNATIVES};

pub type RequestId = u64;

/// An alternative at or under this share of the primary distance is "shortest".
const SHORTEST_DISTANCE_RATIO: f64 = 0.95;

const ROUTE_LAYER: &str = "route-line";
const START_MARKER: &str = "start-marker";
const END_MARKER: &str = "end-marker";

/// A route request issued by the coordinator, to be run by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteQuery {
    pub id: RequestId,
    pub request: RouteRequest,
}

/// Outcome of feeding a service response back into a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    /// The response belonged to a superseded request and was ignored.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRoute {
    alternatives: Vec<RouteAlternative>,
    selected: usize,
    step: usize,
}

impl ActiveRoute {
    pub fn info(&self) -> &RouteInfo {
        &self.alternatives[self.selected].route
    }

    pub fn alternatives(&self) -> &[RouteAlternative] {
        &self.alternatives
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn step_index(&self) -> usize {
        self.step
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingState {
    Idle,
    SelectingStart,
    SelectingEnd {
        start: RoutePoint,
    },
    /// Both endpoints set. `pending` is `None` once the last request failed
    /// and the user may retry.
    Routing {
        start: RoutePoint,
        end: RoutePoint,
        pending: Option<RequestId>,
    },
    HasRoute {
        start: RoutePoint,
        end: RoutePoint,
        route: ActiveRoute,
    },
}

impl RoutingState {
    fn endpoints(&self) -> Option<(&RoutePoint, &RoutePoint)> {
        match self {
            Self::Routing { start, end, .. } | Self::HasRoute { start, end, .. } => {
                Some((start, end))
            }
            _ => None,
        }
    }
}

pub struct RoutingCoordinator {
    state: RoutingState,
    profile: TravelProfile,
    next_id: RequestId,
    last_error: Option<ServiceError>,
    layers: OwnedLayers,
    fit: FitOptions,
}

impl Default for RoutingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingCoordinator {
    pub fn new() -> Self {
        Self {
            state: RoutingState::Idle,
            profile: TravelProfile::default(),
            next_id: 0,
            last_error: None,
            layers: OwnedLayers::new(LayerOwner::Routing),
            fit: FitOptions::default(),
        }
    }

    pub fn with_fit_options(mut self, fit: FitOptions) -> Self {
        self.fit = fit;
        self
    }

    pub fn state(&self) -> &RoutingState {
        &self.state
    }

    pub fn profile(&self) -> TravelProfile {
        self.profile
    }

    pub fn selection_mode(&self) -> SelectionMode {
        match self.state {
            RoutingState::SelectingStart => SelectionMode::SelectingStart,
            RoutingState::SelectingEnd { .. } => SelectionMode::SelectingEnd,
            _ => SelectionMode::Idle,
        }
    }

    pub fn start(&self) -> Option<&RoutePoint> {
        match &self.state {
            RoutingState::SelectingEnd { start }
            | RoutingState::Routing { start, .. }
            | RoutingState::HasRoute { start, .. } => Some(start),
            _ => None,
        }
    }

    pub fn end(&self) -> Option<&RoutePoint> {
        self.state.endpoints().map(|(_, end)| end)
    }

    pub fn active(&self) -> Option<&ActiveRoute> {
        match &self.state {
            RoutingState::HasRoute { route, .. } => Some(route),
            _ => None,
        }
    }

    pub fn route_info(&self) -> Option<&RouteInfo> {
        self.active().map(ActiveRoute::info)
    }

    pub fn alternatives(&self) -> &[RouteAlternative] {
        self.active().map(ActiveRoute::alternatives).unwrap_or(&[])
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            RoutingState::Routing {
                pending: Some(_),
                ..
            }
        )
    }

    /// Error from the most recent failed request, cleared on the next request.
    pub fn last_error(&self) -> Option<&ServiceError> {
        self.last_error.as_ref()
    }

    /// Enter point selection from idle, or leave routing altogether.
    pub fn toggle_routing(&mut self, map: &mut dyn MapSurface) {
        self.state = match self.state {
            RoutingState::Idle => {
                tracing::info!("routing: selecting start point");
                RoutingState::SelectingStart
            }
            _ => {
                tracing::info!("routing: leaving route mode");
                RoutingState::Idle
            }
        };
        self.last_error = None;
        self.redraw(map);
    }

    /// A map click or search selection. Only meaningful while selecting.
    pub fn pick_location(
        &mut self,
        point: RoutePoint,
        map: &mut dyn MapSurface,
    ) -> Option<RouteQuery> {
        let query = match std::mem::replace(&mut self.state, RoutingState::Idle) {
            RoutingState::SelectingStart => {
                tracing::debug!(
                    "routing: start set to ({:.5}, {:.5})",
                    point.coordinate.lon,
                    point.coordinate.lat
                );
                self.state = RoutingState::SelectingEnd { start: point };
                None
            }
            RoutingState::SelectingEnd { start } => {
                tracing::debug!(
                    "routing: end set to ({:.5}, {:.5})",
                    point.coordinate.lon,
                    point.coordinate.lat
                );
                Some(self.issue(start, point))
            }
            other => {
                tracing::debug!("routing: location pick ignored outside selection");
                self.state = other;
                None
            }
        };
        self.redraw(map);
        query
    }

    /// Change travel mode; re-requests the route when both points are set.
    pub fn set_profile(
        &mut self,
        profile: TravelProfile,
        map: &mut dyn MapSurface,
    ) -> Option<RouteQuery> {
        if profile == self.profile {
            return None;
        }
        self.profile = profile;
        let (start, end) = self
            .state
            .endpoints()
            .map(|(start, end)| (start.clone(), end.clone()))?;
        let query = self.issue(start, end);
        self.redraw(map);
        Some(query)
    }

    /// Re-issue the request after a failure.
    pub fn retry(&mut self) -> Option<RouteQuery> {
        match &self.state {
            RoutingState::Routing {
                start,
                end,
                pending: None,
            } => {
                let (start, end) = (start.clone(), end.clone());
                Some(self.issue(start, end))
            }
            _ => None,
        }
    }

    fn issue(&mut self, start: RoutePoint, end: RoutePoint) -> RouteQuery {
        self.next_id += 1;
        let id = self.next_id;
        let request = RouteRequest {
            start: start.coordinate,
            end: end.coordinate,
            profile: self.profile,
            alternatives: MAX_EXTRA_ALTERNATIVES,
        };
        tracing::info!("routing: issuing request #{id} ({})", self.profile.as_str());
        self.last_error = None;
        self.state = RoutingState::Routing {
            start,
            end,
            pending: Some(id),
        };
        RouteQuery { id, request }
    }

    /// Apply the outcome of a request issued earlier.
    ///
    /// # Errors
    /// Returns the service error when the current request failed; the
    /// coordinator keeps both points and allows [`RoutingCoordinator::retry`].
    pub fn apply_route_response(
        &mut self,
        id: RequestId,
        result: Result<Vec<RouteInfo>, ServiceError>,
        map: &mut dyn MapSurface,
    ) -> Result<Applied, EngineError> {
        let (start, end) = match &self.state {
            RoutingState::Routing {
                start,
                end,
                pending: Some(pending),
            } if *pending == id => (start.clone(), end.clone()),
            _ => {
                tracing::debug!("routing: discarding stale response #{id}");
                return Ok(Applied::Stale);
            }
        };

        let routes = result.and_then(|routes| {
            if routes.is_empty() {
                Err(ServiceError::Upstream {
                    code: "NoRoute".to_string(),
                    message: "no route between the selected points".to_string(),
                })
            } else {
                Ok(routes)
            }
        });

        match routes {
            Ok(routes) => {
                let alternatives = rank_alternatives(routes);
                tracing::info!(
                    "routing: request #{id} returned {} route(s), primary {}",
                    alternatives.len(),
                    geodesy::format_distance(alternatives[0].route.distance_m)
                );
                self.state = RoutingState::HasRoute {
                    start,
                    end,
                    route: ActiveRoute {
                        alternatives,
                        selected: 0,
                        step: 0,
                    },
                };
                self.redraw(map);
                self.fit_route(map);
                Ok(Applied::Accepted)
            }
            Err(err) => {
                tracing::warn!("routing: request #{id} failed: {err}");
                self.state = RoutingState::Routing {
                    start,
                    end,
                    pending: None,
                };
                self.last_error = Some(err.clone());
                self.redraw(map);
                Err(err.into())
            }
        }
    }

    /// Swap the active route without a new request.
    ///
    /// # Errors
    /// Fails when no route is active or `index` is out of range.
    pub fn select_alternative(
        &mut self,
        index: usize,
        map: &mut dyn MapSurface,
    ) -> Result<(), EngineError> {
        let RoutingState::HasRoute { route, .. } = &mut self.state else {
            return Err(EngineError::NoActiveRoute);
        };
        if index >= route.alternatives.len() {
            return Err(EngineError::AlternativeOutOfRange {
                index,
                available: route.alternatives.len(),
            });
        }
        route.selected = index;
        route.step = 0;
        tracing::debug!("routing: alternative {index} selected");
        self.redraw(map);
        self.fit_route(map);
        Ok(())
    }

    /// Drop the route and both points, then wait for a new start point.
    pub fn clear_route(&mut self, map: &mut dyn MapSurface) {
        tracing::info!("routing: route cleared");
        self.state = RoutingState::SelectingStart;
        self.last_error = None;
        self.layers.clear(map);
    }

    pub fn current_step(&self) -> Option<&NavigationStep> {
        let route = self.active()?;
        route.info().steps.get(route.step)
    }

    pub fn next_step(&mut self) -> Option<&NavigationStep> {
        if let RoutingState::HasRoute { route, .. } = &mut self.state {
            let last = route.info().steps.len().saturating_sub(1);
            route.step = (route.step + 1).min(last);
        }
        self.current_step()
    }

    pub fn previous_step(&mut self) -> Option<&NavigationStep> {
        if let RoutingState::HasRoute { route, .. } = &mut self.state {
            route.step = route.step.saturating_sub(1);
        }
        self.current_step()
    }

    fn redraw(&mut self, map: &mut dyn MapSurface) {
        let mut desired = Vec::with_capacity(3);
        if let Some(start) = self.start() {
            desired.push((START_MARKER.to_string(), endpoint_marker(start, MarkerKind::Start)));
        }
        if let Some(end) = self.end() {
            desired.push((END_MARKER.to_string(), endpoint_marker(end, MarkerKind::End)));
        }
        if let Some(info) = self.route_info() {
            desired.push((
                ROUTE_LAYER.to_string(),
                Layer::Line {
                    path: info.geometry.clone(),
                    style: LineStyle::Route,
                },
            ));
        }
        self.layers.sync(desired, map);
    }

    fn fit_route(&self, map: &mut dyn MapSurface) {
        if let Some(bounds) = self.route_info().and_then(|info| geodesy::bounds(&info.geometry)) {
            map.fit_bounds(bounds, self.fit);
        }
    }
}

fn endpoint_marker(point: &RoutePoint, kind: MarkerKind) -> Layer {
    Layer::Marker {
        at: point.coordinate,
        kind,
        label: point.label.clone(),
    }
}

/// Run a route query against the service, bounded by `timeout`.
pub async fn fetch_route(
    service: &dyn RoutingService,
    query: &RouteQuery,
    timeout: Duration,
) -> Result<Vec<RouteInfo>, ServiceError> {
    with_deadline(timeout, service.route(&query.request)).await
}

/// Label routes in service order.
///
/// The first route is "fastest" by convention of the service. Others are
/// "shortest" when at most 95% of its distance, "balanced" otherwise.
pub fn rank_alternatives(routes: Vec<RouteInfo>) -> Vec<RouteAlternative> {
    let Some(primary) = routes.first().cloned() else {
        return Vec::new();
    };
    routes
        .into_iter()
        .take(1 + MAX_EXTRA_ALTERNATIVES)
        .enumerate()
        .map(|(idx, route)| {
            if idx == 0 {
                return RouteAlternative {
                    route,
                    rank: AlternativeRank::Fastest,
                    savings_vs_fastest: None,
                };
            }
            let rank = if route.distance_m <= SHORTEST_DISTANCE_RATIO * primary.distance_m {
                AlternativeRank::Shortest
            } else {
                AlternativeRank::Balanced
            };
            let savings = Savings {
                time_s: primary.duration_s - route.duration_s,
                distance_m: primary.distance_m - route.distance_m,
            };
            RouteAlternative {
                route,
                rank,
                savings_vs_fastest: Some(savings),
            }
        })
        .collect()
}

/// Render a turn instruction from a maneuver when the service sent no text.
pub fn describe_step(maneuver_type: &str, modifier: Option<&str>, road_name: &str) -> String {
    let onto = if road_name.is_empty() {
        String::new()
    } else {
        format!(" onto {road_name}")
    };
    match (maneuver_type, modifier) {
        ("depart", _) if road_name.is_empty() => "Depart".to_string(),
        ("depart", _) => format!("Depart on {road_name}"),
        ("arrive", _) => "Arrive at destination".to_string(),
        ("roundabout" | "rotary", _) => format!("Enter the roundabout and exit{onto}"),
        (_, Some("uturn")) => format!("Make a U-turn{onto}"),
        (_, Some("straight")) => format!("Continue straight{onto}"),
        ("turn" | "end of road" | "fork", Some(side)) => {
            format!("{} {side}{onto}", capitalize(maneuver_type_verb(maneuver_type)))
        }
        ("merge", Some(side)) => format!("Merge {side}{onto}"),
        ("on ramp", _) => format!("Take the ramp{onto}"),
        ("off ramp", _) => format!("Take the exit{onto}"),
        ("new name" | "continue", _) => format!("Continue{onto}"),
        (other, Some(side)) => format!("{} {side}{onto}", capitalize(other)),
        (other, None) => format!("{}{onto}", capitalize(other)),
    }
}

fn maneuver_type_verb(maneuver_type: &str) -> &str {
    match maneuver_type {
        "fork" => "keep",
        _ => "turn",
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
