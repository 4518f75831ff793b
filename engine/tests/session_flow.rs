use std::sync::Arc;

use engine::elevation::ElevationSource;
use engine::routing::RoutingCoordinator;
use engine::test_support::{
    sample_route, straight_route, RecordingSurface, StubElevation, StubGeocoder, StubPois,
    StubRouter, StubWeather, ISLAMABAD, KARACHI,
};
use engine::{Applied, EngineConfig, MapSession, Services};
use geo_types::{coord, Rect};
use shared::{AlternativeRank, MeasureMode, MeasureResult, PoiCategory, RouteInfo, TravelProfile};

fn karachi_islamabad(distance_m: f64, duration_s: f64) -> RouteInfo {
    let mut route = sample_route(distance_m, duration_s);
    route.geometry = straight_route(KARACHI, ISLAMABAD, 240);
    route
}

fn test_session(router: StubRouter) -> MapSession<RecordingSurface> {
    let services = Services {
        router: Arc::new(router),
        geocoder: Arc::new(StubGeocoder::failing()),
        pois: Arc::new(StubPois::new()),
        elevation: Arc::new(StubElevation::by_latitude()),
        weather: Arc::new(StubWeather::mild()),
    };
    MapSession::new(RecordingSurface::default(), EngineConfig::default(), services)
}

#[tokio::test]
async fn karachi_to_islamabad_by_car() {
    let router = Arc::new(StubRouter::with_routes(vec![
        karachi_islamabad(1_412_000.0, 61_500.0),
        karachi_islamabad(1_330_000.0, 66_000.0),
        karachi_islamabad(1_420_000.0, 63_000.0),
    ]));
    let services = Services {
        router: router.clone(),
        geocoder: Arc::new(StubGeocoder::failing()),
        pois: Arc::new(StubPois::new()),
        elevation: Arc::new(StubElevation::by_latitude()),
        weather: Arc::new(StubWeather::mild()),
    };
    let mut session =
        MapSession::new(RecordingSurface::default(), EngineConfig::default(), services);

    session.toggle_routing();
    session.pick_coordinate(KARACHI).await.unwrap();
    let applied = session.pick_coordinate(ISLAMABAD).await.unwrap();
    assert_eq!(applied, Some(Applied::Accepted));

    let request = router.requests()[0];
    assert_eq!(request.profile, TravelProfile::Driving);
    assert_eq!(request.alternatives, 2);

    let info = session.routing().route_info().unwrap();
    assert!(info.distance_m > 0.0);
    assert!(info.duration_s > 0.0);
    assert!(info.geometry.len() >= 2);

    let ranks: Vec<_> = session.routing().alternatives().iter().map(|a| a.rank).collect();
    assert_eq!(
        ranks,
        vec![AlternativeRank::Fastest, AlternativeRank::Shortest, AlternativeRank::Balanced]
    );

    session.select_alternative(2).unwrap();
    session.select_alternative(0).unwrap();
    let primary = session.routing().route_info().unwrap();
    assert_eq!(primary.distance_m, 1_412_000.0);
    assert_eq!(primary.duration_s, 61_500.0);
    let destination = *primary.geometry.last().unwrap();

    session.show_elevation().await.unwrap();
    assert_eq!(session.elevation().source(), Some(ElevationSource::Measured));
    assert_eq!(session.elevation().points().len(), 50);

    session.show_weather().await.unwrap();
    let samples = session.weather().samples();
    assert_eq!(samples.len(), 5);
    assert_eq!(samples.last().unwrap().coordinate, destination);
    assert_eq!(samples[0].location_label, "Start: Point 1");
    assert_eq!(samples[0].current.pressure_hpa, 1013.0);
}

#[tokio::test]
async fn area_of_one_degree_square() {
    let mut session = test_session(StubRouter::with_routes(Vec::new()));
    session.set_measure_mode(Some(MeasureMode::Area));
    let mut result = None;
    for (lon, lat) in [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)] {
        result = session.add_measure_point(shared::Coordinate::from_lon_lat(lon, lat));
    }
    let Some(MeasureResult::AreaSqMeters(area)) = result else {
        panic!("expected an area, got {result:?}");
    };
    let expected = 111_320.0_f64 * 111_320.0 * 0.5_f64.to_radians().cos();
    assert!((area - expected).abs() / expected < 1e-9);
    assert!(session.map().has_layer("measurement/measure-shape"));
}

#[tokio::test]
async fn hospital_with_no_matches_stays_active() {
    let mut session = test_session(StubRouter::with_routes(Vec::new()));
    let viewport = Rect::new(coord! { x: 66.9, y: 24.7 }, coord! { x: 67.2, y: 25.0 });
    let applied = session
        .toggle_poi(PoiCategory::Hospital, viewport)
        .await
        .unwrap();
    assert_eq!(applied, Some(Applied::Accepted));
    assert!(session.pois().pois().is_empty());
    assert_eq!(
        session.pois().active_categories().collect::<Vec<_>>(),
        vec![PoiCategory::Hospital]
    );
}

#[test]
fn late_route_response_is_ignored_after_new_endpoints() {
    let mut map = RecordingSurface::default();
    let mut routing = RoutingCoordinator::new();
    routing.toggle_routing(&mut map);
    routing.pick_location(shared::RoutePoint::new(KARACHI), &mut map);
    let first = routing
        .pick_location(shared::RoutePoint::new(ISLAMABAD), &mut map)
        .unwrap();

    routing.clear_route(&mut map);
    routing.pick_location(shared::RoutePoint::new(ISLAMABAD), &mut map);
    let second = routing
        .pick_location(shared::RoutePoint::new(KARACHI), &mut map)
        .unwrap();

    let stale = routing
        .apply_route_response(first.id, Ok(vec![sample_route(1.0, 1.0)]), &mut map)
        .unwrap();
    assert_eq!(stale, Applied::Stale);
    assert!(routing.is_loading());

    routing
        .apply_route_response(second.id, Ok(vec![sample_route(2.0, 2.0)]), &mut map)
        .unwrap();
    assert_eq!(routing.route_info().unwrap().distance_m, 2.0);
}

fn assert_send<T: Send>(_: T) {}

#[test]
fn sampling_workflows_can_be_spawned() {
    let mut session = test_session(StubRouter::with_routes(Vec::new()));
    assert_send(session.show_weather());
    assert_send(session.show_elevation());
    assert_send(session.search_places("Lahore"));
}
