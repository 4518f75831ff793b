//! One map session: every component wired to its services and one map surface.
//!
//! The components stay usable on their own through their begin/apply methods;
//! [`MapSession`] runs each request to completion before returning, so late
//! responses can only arise when callers drive the components themselves.

use std::sync::Arc;

use futures_util::future::join_all;
use geo_types::Rect;
use shared::{Coordinate, MeasureMode, MeasureResult, PoiCategory, RoutePoint, TravelProfile};

use crate::config::EngineConfig;
use crate::elevation::{run_elevation, BandedEstimator, ElevationEstimator, ElevationSampler};
use crate::error::EngineError;
use crate::geodesy;
use crate::measurement::MeasurementEngine;
use crate::overlay::MapSurface;
use crate::poi::{fetch_pois, PoiOverlayManager};
use crate::providers::{
    http_client, NominatimGeocoder, OpenMeteoElevation, OpenMeteoWeather, OsrmRouter, OverpassPois,
};
use crate::routing::{fetch_route, Applied, RouteQuery, RoutingCoordinator};
use crate::search::{run_search, PlaceSearch};
use crate::services::{
    ElevationService, GeocodingService, PoiService, RoutingService, WeatherService,
};
use crate::weather::{run_weather, WeatherSampler};

/// Service handles shared by a session.
#[derive(Clone)]
pub struct Services {
    pub router: Arc<dyn RoutingService>,
    pub geocoder: Arc<dyn GeocodingService>,
    pub pois: Arc<dyn PoiService>,
    pub elevation: Arc<dyn ElevationService>,
    pub weather: Arc<dyn WeatherService>,
}

impl Services {
    /// HTTP providers for every service, sharing one client.
    ///
    /// # Errors
    /// Fails when the HTTP client cannot be built.
    pub fn http(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = http_client(config)?;
        Ok(Self {
            router: Arc::new(OsrmRouter::new(client.clone(), config)),
            geocoder: Arc::new(NominatimGeocoder::new(client.clone(), config)),
            pois: Arc::new(OverpassPois::new(client.clone(), config)),
            elevation: Arc::new(OpenMeteoElevation::new(client.clone(), config)),
            weather: Arc::new(OpenMeteoWeather::new(client, config)),
        })
    }
}

pub struct MapSession<M> {
    map: M,
    config: EngineConfig,
    services: Services,
    estimator: Box<dyn ElevationEstimator>,
    routing: RoutingCoordinator,
    measurement: MeasurementEngine,
    pois: PoiOverlayManager,
    elevation: ElevationSampler,
    weather: WeatherSampler,
    search: PlaceSearch,
}

impl<M: MapSurface> MapSession<M> {
    pub fn new(map: M, config: EngineConfig, services: Services) -> Self {
        let search = PlaceSearch::new(config.country_code.clone());
        Self {
            map,
            config,
            services,
            estimator: Box::new(BandedEstimator::non_reproducible()),
            routing: RoutingCoordinator::new(),
            measurement: MeasurementEngine::new(),
            pois: PoiOverlayManager::new(),
            elevation: ElevationSampler::new(),
            weather: WeatherSampler::new(),
            search,
        }
    }

    /// Replace the synthetic elevation estimator, e.g. with a seeded one.
    pub fn with_estimator(mut self, estimator: Box<dyn ElevationEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn into_map(self) -> M {
        self.map
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn routing(&self) -> &RoutingCoordinator {
        &self.routing
    }

    pub fn measurement(&self) -> &MeasurementEngine {
        &self.measurement
    }

    pub fn pois(&self) -> &PoiOverlayManager {
        &self.pois
    }

    pub fn elevation(&self) -> &ElevationSampler {
        &self.elevation
    }

    pub fn weather(&self) -> &WeatherSampler {
        &self.weather
    }

    pub fn search(&self) -> &PlaceSearch {
        &self.search
    }

    /// Bounding box of the active route, if any.
    pub fn route_bounds(&self) -> Option<Rect<f64>> {
        self.routing
            .route_info()
            .and_then(|info| geodesy::bounds(&info.geometry))
    }

    pub fn toggle_routing(&mut self) {
        self.routing.toggle_routing(&mut self.map);
        self.forget_route_samples();
    }

    /// Feed a start or end point; the second one triggers the route request.
    ///
    /// # Errors
    /// Returns the routing failure; both points are kept for a retry.
    pub async fn pick_location(
        &mut self,
        point: RoutePoint,
    ) -> Result<Option<Applied>, EngineError> {
        let query = self.routing.pick_location(point, &mut self.map);
        self.run_route_query(query).await
    }

    pub async fn pick_coordinate(
        &mut self,
        coordinate: Coordinate,
    ) -> Result<Option<Applied>, EngineError> {
        self.pick_location(RoutePoint::new(coordinate)).await
    }

    /// # Errors
    /// Returns the routing failure of the re-issued request.
    pub async fn set_profile(
        &mut self,
        profile: TravelProfile,
    ) -> Result<Option<Applied>, EngineError> {
        let query = self.routing.set_profile(profile, &mut self.map);
        self.run_route_query(query).await
    }

    /// # Errors
    /// Returns the routing failure of the repeated request.
    pub async fn retry_route(&mut self) -> Result<Option<Applied>, EngineError> {
        let query = self.routing.retry();
        self.run_route_query(query).await
    }

    async fn run_route_query(
        &mut self,
        query: Option<RouteQuery>,
    ) -> Result<Option<Applied>, EngineError> {
        let Some(query) = query else {
            return Ok(None);
        };
        self.forget_route_samples();
        let result = fetch_route(
            self.services.router.as_ref(),
            &query,
            self.config.request_timeout,
        )
        .await;
        self.routing
            .apply_route_response(query.id, result, &mut self.map)
            .map(Some)
    }

    /// # Errors
    /// Fails without an active route or for an unknown index.
    pub fn select_alternative(&mut self, index: usize) -> Result<(), EngineError> {
        self.routing.select_alternative(index, &mut self.map)?;
        self.forget_route_samples();
        Ok(())
    }

    pub fn clear_route(&mut self) {
        self.routing.clear_route(&mut self.map);
        self.forget_route_samples();
    }

    pub fn next_step(&mut self) -> Option<String> {
        self.routing.next_step().map(|step| step.instruction.clone())
    }

    pub fn previous_step(&mut self) -> Option<String> {
        self.routing.previous_step().map(|step| step.instruction.clone())
    }

    /// Elevation and weather samples describe one route geometry only.
    fn forget_route_samples(&mut self) {
        self.elevation.reset();
        self.weather.reset();
    }

    pub fn set_measure_mode(&mut self, mode: Option<MeasureMode>) {
        self.measurement.set_mode(mode, &mut self.map);
    }

    pub fn add_measure_point(&mut self, coordinate: Coordinate) -> Option<MeasureResult> {
        self.measurement.add_point(coordinate, &mut self.map)
    }

    pub fn clear_measurement(&mut self) {
        self.measurement.clear(&mut self.map);
    }

    /// Toggle one category over `viewport`.
    ///
    /// # Errors
    /// Returns the category's fetch failure; other categories are untouched.
    pub async fn toggle_poi(
        &mut self,
        category: PoiCategory,
        viewport: Rect<f64>,
    ) -> Result<Option<Applied>, EngineError> {
        let Some(query) = self.pois.toggle_category(category, viewport, &mut self.map) else {
            return Ok(None);
        };
        let result = fetch_pois(
            self.services.pois.as_ref(),
            &query,
            self.config.request_timeout,
        )
        .await;
        self.pois
            .apply_poi_response(&query, result, &mut self.map)
            .map(Some)
    }

    /// Toggle several categories, fetching the newly active ones concurrently.
    /// Each category succeeds or fails on its own.
    pub async fn toggle_pois(
        &mut self,
        categories: &[PoiCategory],
        viewport: Rect<f64>,
    ) -> Vec<(PoiCategory, Result<Option<Applied>, EngineError>)> {
        let mut outcomes = Vec::with_capacity(categories.len());
        let mut queries = Vec::new();
        for &category in categories {
            match self.pois.toggle_category(category, viewport, &mut self.map) {
                Some(query) => queries.push(query),
                None => outcomes.push((category, Ok(None))),
            }
        }

        let service = self.services.pois.as_ref();
        let timeout = self.config.request_timeout;
        let results =
            join_all(queries.iter().map(|query| fetch_pois(service, query, timeout))).await;

        for (query, result) in queries.iter().zip(results) {
            let applied = self
                .pois
                .apply_poi_response(query, result, &mut self.map)
                .map(Some);
            outcomes.push((query.category, applied));
        }
        outcomes
    }

    pub fn clear_pois(&mut self) {
        self.pois.clear_all(&mut self.map);
    }

    /// Sample elevation along the active route. Service failures fall back
    /// to estimates, so only a missing route is an error.
    ///
    /// # Errors
    /// [`EngineError::NoActiveRoute`] or [`EngineError::EmptyGeometry`].
    pub async fn show_elevation(&mut self) -> Result<Applied, EngineError> {
        let geometry = self
            .routing
            .route_info()
            .map(|info| info.geometry.clone())
            .ok_or(EngineError::NoActiveRoute)?;
        let query = self.elevation.begin(&geometry)?;
        let profile = run_elevation(
            self.services.elevation.as_ref(),
            &query,
            &mut *self.estimator,
            self.config.request_timeout,
        )
        .await?;
        Ok(self.elevation.apply(query.id, profile))
    }

    /// Sample weather along the active route.
    ///
    /// # Errors
    /// Fails without a route, or when any sample point's forecast fails.
    pub async fn show_weather(&mut self) -> Result<Applied, EngineError> {
        let geometry = self
            .routing
            .route_info()
            .map(|info| info.geometry.clone())
            .ok_or(EngineError::NoActiveRoute)?;
        let query = self.weather.begin(&geometry)?;
        let result = run_weather(
            self.services.weather.as_ref(),
            self.services.geocoder.as_ref(),
            &query,
            self.config.request_timeout,
        )
        .await;
        self.weather.apply(query.id, result)
    }

    /// # Errors
    /// Returns the search service failure.
    pub async fn search_places(&mut self, text: &str) -> Result<Option<Applied>, EngineError> {
        let Some(query) = self.search.begin_search(text) else {
            return Ok(None);
        };
        let result = run_search(
            self.services.geocoder.as_ref(),
            &query,
            self.config.request_timeout,
        )
        .await;
        self.search.apply_search(query.id, result).map(Some)
    }

    /// Use a search result as the next route endpoint.
    ///
    /// # Errors
    /// Returns the routing failure when this completes the endpoint pair.
    pub async fn choose_search_result(
        &mut self,
        index: usize,
    ) -> Result<Option<Applied>, EngineError> {
        let Some(point) = self.search.choose(index) else {
            return Ok(None);
        };
        self.search.clear();
        self.pick_location(point).await
    }
}

#[cfg(test)]
mod tests {
    use geo_types::coord;
    use shared::SelectionMode;

    use super::*;
    use crate::elevation::ElevationSource;
    use crate::error::ServiceError;
    use crate::services::PoiElement;
    use crate::test_support::{
        sample_route, RecordingSurface, StubElevation, StubGeocoder, StubPois, StubRouter,
        StubWeather, ISLAMABAD, KARACHI,
    };

    fn services(router: StubRouter, pois: StubPois, elevation: StubElevation) -> Services {
        Services {
            router: Arc::new(router),
            geocoder: Arc::new(StubGeocoder::named("Punjab")),
            pois: Arc::new(pois),
            elevation: Arc::new(elevation),
            weather: Arc::new(StubWeather::mild()),
        }
    }

    fn session(router: StubRouter) -> MapSession<RecordingSurface> {
        MapSession::new(
            RecordingSurface::default(),
            EngineConfig::default(),
            services(router, StubPois::new(), StubElevation::failing()),
        )
        .with_estimator(Box::new(BandedEstimator::seeded(11)))
    }

    fn viewport() -> Rect<f64> {
        Rect::new(coord! { x: 66.9, y: 24.7 }, coord! { x: 67.2, y: 25.0 })
    }

    #[tokio::test]
    async fn route_then_samples() {
        let routes = vec![sample_route(1_410_000.0, 61_000.0), sample_route(1_320_000.0, 64_000.0)];
        let mut session = session(StubRouter::with_routes(routes));
        session.toggle_routing();
        assert_eq!(session.routing().selection_mode(), SelectionMode::SelectingStart);

        assert_eq!(session.pick_coordinate(KARACHI).await.unwrap(), None);
        let applied = session.pick_coordinate(ISLAMABAD).await.unwrap();
        assert_eq!(applied, Some(Applied::Accepted));
        assert_eq!(session.routing().alternatives().len(), 2);

        session.show_elevation().await.unwrap();
        assert_eq!(session.elevation().source(), Some(ElevationSource::Estimated));
        assert_eq!(session.elevation().points().len(), 12);

        session.show_weather().await.unwrap();
        assert_eq!(session.weather().samples().len(), 3);

        session.select_alternative(1).unwrap();
        assert!(session.elevation().points().is_empty());
        assert!(session.weather().samples().is_empty());
    }

    #[tokio::test]
    async fn samples_need_a_route() {
        let mut session = session(StubRouter::with_routes(Vec::new()));
        assert!(matches!(
            session.show_elevation().await,
            Err(EngineError::NoActiveRoute)
        ));
        assert!(matches!(
            session.show_weather().await,
            Err(EngineError::NoActiveRoute)
        ));
    }

    #[tokio::test]
    async fn failed_route_can_be_retried() {
        let router = StubRouter::with_error(ServiceError::Timeout { timeout_secs: 30 });
        let mut session = session(router);
        session.toggle_routing();
        session.pick_coordinate(KARACHI).await.unwrap();
        let err = session.pick_coordinate(ISLAMABAD).await.unwrap_err();
        assert!(matches!(err, EngineError::Service(ServiceError::Timeout { .. })));
        assert!(!session.routing().is_loading());
        assert!(session.routing().end().is_some());
        assert!(session.retry_route().await.is_err());
    }

    #[tokio::test]
    async fn categories_fail_independently() {
        let pois = StubPois::new()
            .with(
                PoiCategory::School,
                vec![PoiElement {
                    id: 4,
                    name: Some("Karachi Grammar School".into()),
                    coordinate: Coordinate::from_lon_lat(67.03, 24.85),
                }],
            )
            .failing_for(PoiCategory::Hospital);
        let mut session = MapSession::new(
            RecordingSurface::default(),
            EngineConfig::default(),
            services(StubRouter::with_routes(Vec::new()), pois, StubElevation::failing()),
        );

        let outcomes = session
            .toggle_pois(&[PoiCategory::Hospital, PoiCategory::School], viewport())
            .await;
        assert!(outcomes[0].1.is_err());
        assert!(matches!(outcomes[1].1, Ok(Some(Applied::Accepted))));
        assert_eq!(session.pois().pois().len(), 1);
        assert!(session.pois().is_active(PoiCategory::Hospital));

        session.toggle_poi(PoiCategory::School, viewport()).await.unwrap();
        assert!(session.pois().pois().is_empty());
        assert!(!session.map().has_layer("poi/poi-school-4"));
    }

    #[tokio::test]
    async fn search_result_becomes_endpoint() {
        let mut session = session(StubRouter::with_routes(vec![sample_route(10.0, 10.0)]));
        session.toggle_routing();
        session.search_places("Lahore").await.unwrap();
        assert_eq!(session.search().results().len(), 1);

        session.choose_search_result(0).await.unwrap();
        assert_eq!(session.routing().start().and_then(|p| p.label.as_deref()), Some("Punjab"));
        assert!(session.search().results().is_empty());
    }

    #[tokio::test]
    async fn measuring_does_not_touch_route_layers() {
        let mut session = session(StubRouter::with_routes(vec![sample_route(10.0, 10.0)]));
        session.toggle_routing();
        session.pick_coordinate(KARACHI).await.unwrap();
        session.pick_coordinate(ISLAMABAD).await.unwrap();

        session.set_measure_mode(Some(MeasureMode::Distance));
        session.add_measure_point(KARACHI);
        assert!(session.add_measure_point(ISLAMABAD).is_some());
        session.clear_measurement();

        assert!(session.map().has_layer("routing/route-line"));
        assert!(!session.map().has_layer("measurement/measure-shape"));
    }
}
