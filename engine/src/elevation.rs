//! Elevation profile along a route.
//!
//! The route is downsampled to at most [`MAX_SAMPLES`] points, elevations are
//! requested in sequential batches of [`BATCH_SIZE`], and any failure falls
//! back to a latitude-banded synthetic estimate. Once requested, a non-empty
//! route always yields a profile.

use std::ops::Range;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Coordinate, ElevationPoint};

use crate::error::{EngineError, ServiceError};
use crate::geodesy::cumulative_km;
use crate::routing::{Applied, RequestId};
use crate::services::{with_deadline, ElevationService};

pub const MAX_SAMPLES: usize = 50;
pub const BATCH_SIZE: usize = 20;

const HIGHLAND_LAT: f64 = 34.0;
const FOOTHILL_LAT: f64 = 30.0;
const EASTERN_LON: f64 = 75.0;
const EASTERN_BONUS_M: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationSource {
    Measured,
    Estimated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElevationProfile {
    pub points: Vec<ElevationPoint>,
    pub source: ElevationSource,
}

/// Summary figures for display. Not stored by the sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationStats {
    pub min_m: f64,
    pub max_m: f64,
    pub total_ascent_m: f64,
    pub total_descent_m: f64,
    /// `None` when the profile covers no distance.
    pub average_grade_pct: Option<f64>,
}

impl ElevationStats {
    pub fn from_points(points: &[ElevationPoint]) -> Option<Self> {
        let first = points.first()?;
        let last = points.last()?;

        let mut min_m = f64::INFINITY;
        let mut max_m = f64::NEG_INFINITY;
        for p in points {
            min_m = min_m.min(p.elevation_m);
            max_m = max_m.max(p.elevation_m);
        }

        let mut total_ascent_m = 0.0;
        let mut total_descent_m = 0.0;
        for pair in points.windows(2) {
            let diff = pair[1].elevation_m - pair[0].elevation_m;
            if diff > 0.0 {
                total_ascent_m += diff;
            } else {
                total_descent_m += diff.abs();
            }
        }

        let total_m = last.distance_from_start_km * 1000.0;
        let average_grade_pct =
            (total_m > 0.0).then(|| (last.elevation_m - first.elevation_m) / total_m * 100.0);

        Some(Self {
            min_m,
            max_m,
            total_ascent_m,
            total_descent_m,
            average_grade_pct,
        })
    }
}

/// Keep every `max(1, n / 50)`-th coordinate, capped at 50 samples.
pub fn downsample(geometry: &[Coordinate]) -> Vec<Coordinate> {
    let rate = (geometry.len() / MAX_SAMPLES).max(1);
    geometry
        .iter()
        .step_by(rate)
        .take(MAX_SAMPLES)
        .copied()
        .collect()
}

/// Synthetic elevation used when the service cannot answer.
pub trait ElevationEstimator: Send {
    fn estimate(&mut self, at: Coordinate) -> f64;
}

/// Uniform draw inside a latitude band, plus a bonus east of 75°E.
///
/// Not reproducible across runs unless built with [`BandedEstimator::seeded`].
pub struct BandedEstimator<R> {
    rng: R,
}

impl BandedEstimator<StdRng> {
    pub fn non_reproducible() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> BandedEstimator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> ElevationEstimator for BandedEstimator<R> {
    fn estimate(&mut self, at: Coordinate) -> f64 {
        let base = self.rng.gen_range(latitude_band(at.lat)).floor();
        base + eastern_bonus(at.lon)
    }
}

/// Base elevation range (meters) for a latitude.
pub fn latitude_band(lat: f64) -> Range<f64> {
    if lat > HIGHLAND_LAT {
        1000.0..3000.0
    } else if lat >= FOOTHILL_LAT {
        300.0..1000.0
    } else {
        50.0..350.0
    }
}

pub fn eastern_bonus(lon: f64) -> f64 {
    if lon > EASTERN_LON {
        EASTERN_BONUS_M
    } else {
        0.0
    }
}

/// Full range an estimate for `at` can fall in.
pub fn estimate_range(at: Coordinate) -> Range<f64> {
    let band = latitude_band(at.lat);
    let bonus = eastern_bonus(at.lon);
    (band.start + bonus)..(band.end + bonus)
}

/// Build the profile, recovering from every service failure.
///
/// # Errors
/// Only [`EngineError::EmptyGeometry`]; everything else is absorbed by the
/// synthetic fallbacks.
pub async fn profile_route(
    service: &dyn ElevationService,
    geometry: &[Coordinate],
    estimator: &mut dyn ElevationEstimator,
    timeout: Duration,
) -> Result<ElevationProfile, EngineError> {
    if geometry.is_empty() {
        return Err(EngineError::EmptyGeometry);
    }
    let sampled = downsample(geometry);
    tracing::debug!(
        "elevation: {} route points downsampled to {}",
        geometry.len(),
        sampled.len()
    );

    match sample_validated(service, &sampled, estimator, timeout).await {
        Ok(profile) => Ok(profile),
        Err(err) => {
            tracing::warn!("elevation: pipeline failed ({err}), estimating from raw route");
            let resampled = downsample(geometry);
            Ok(estimated_profile(&resampled, estimator))
        }
    }
}

async fn sample_validated(
    service: &dyn ElevationService,
    sampled: &[Coordinate],
    estimator: &mut dyn ElevationEstimator,
    timeout: Duration,
) -> Result<ElevationProfile, ServiceError> {
    let valid: Vec<Coordinate> = sampled.iter().copied().filter(Coordinate::is_valid).collect();
    if valid.is_empty() {
        return Err(ServiceError::InvalidInput(
            "no coordinate within valid bounds".to_string(),
        ));
    }
    if valid.len() < sampled.len() {
        tracing::debug!(
            "elevation: dropped {} out-of-range coordinate(s)",
            sampled.len() - valid.len()
        );
    }

    match fetch_batched(service, &valid, timeout).await {
        Ok(elevations) => Ok(ElevationProfile {
            points: pair_with_distance(&valid, &elevations),
            source: ElevationSource::Measured,
        }),
        Err(err) => {
            tracing::warn!("elevation: service unavailable ({err}), using estimates");
            Ok(estimated_profile(&valid, estimator))
        }
    }
}

async fn fetch_batched(
    service: &dyn ElevationService,
    coords: &[Coordinate],
    timeout: Duration,
) -> Result<Vec<f64>, ServiceError> {
    let mut elevations = Vec::with_capacity(coords.len());
    for (idx, batch) in coords.chunks(BATCH_SIZE).enumerate() {
        let values = with_deadline(timeout, service.elevations(batch)).await?;
        if values.len() != batch.len() {
            return Err(ServiceError::parse(format!(
                "batch {idx}: expected {} elevations, got {}",
                batch.len(),
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ServiceError::parse(format!("batch {idx}: non-finite elevation")));
        }
        elevations.extend(values);
    }
    tracing::debug!("elevation: fetched {} values", elevations.len());
    Ok(elevations)
}

fn estimated_profile(
    coords: &[Coordinate],
    estimator: &mut dyn ElevationEstimator,
) -> ElevationProfile {
    let elevations: Vec<f64> = coords.iter().map(|c| estimator.estimate(*c)).collect();
    ElevationProfile {
        points: pair_with_distance(coords, &elevations),
        source: ElevationSource::Estimated,
    }
}

fn pair_with_distance(coords: &[Coordinate], elevations: &[f64]) -> Vec<ElevationPoint> {
    cumulative_km(coords)
        .into_iter()
        .zip(elevations)
        .map(|(distance_from_start_km, elevation_m)| ElevationPoint {
            distance_from_start_km,
            elevation_m: *elevation_m,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElevationQuery {
    pub id: RequestId,
    pub geometry: Vec<Coordinate>,
}

/// Holds the displayed profile and discards results of superseded requests.
#[derive(Debug, Default)]
pub struct ElevationSampler {
    profile: Option<ElevationProfile>,
    pending: Option<RequestId>,
    next_id: RequestId,
}

impl ElevationSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// [`EngineError::EmptyGeometry`] for a route without coordinates.
    pub fn begin(&mut self, geometry: &[Coordinate]) -> Result<ElevationQuery, EngineError> {
        if geometry.is_empty() {
            return Err(EngineError::EmptyGeometry);
        }
        self.next_id += 1;
        self.pending = Some(self.next_id);
        Ok(ElevationQuery {
            id: self.next_id,
            geometry: geometry.to_vec(),
        })
    }

    pub fn apply(&mut self, id: RequestId, profile: ElevationProfile) -> Applied {
        if self.pending != Some(id) {
            tracing::debug!("elevation: discarding stale profile #{id}");
            return Applied::Stale;
        }
        self.pending = None;
        self.profile = Some(profile);
        Applied::Accepted
    }

    /// Forget the profile and any request in flight.
    pub fn reset(&mut self) {
        self.profile = None;
        self.pending = None;
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn points(&self) -> &[ElevationPoint] {
        self.profile.as_ref().map_or(&[], |p| p.points.as_slice())
    }

    pub fn source(&self) -> Option<ElevationSource> {
        self.profile.as_ref().map(|p| p.source)
    }

    pub fn stats(&self) -> Option<ElevationStats> {
        ElevationStats::from_points(self.points())
    }
}

/// Run an elevation query, bounded per batch by `timeout`.
///
/// # Errors
/// Same as [`profile_route`].
pub async fn run_elevation(
    service: &dyn ElevationService,
    query: &ElevationQuery,
    estimator: &mut dyn ElevationEstimator,
    timeout: Duration,
) -> Result<ElevationProfile, EngineError> {
    profile_route(service, &query.geometry, estimator, timeout)
        .await
        .inspect_err(|err| tracing::warn!("elevation: query {} failed: {err}", query.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{straight_route, StubElevation};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn c(lon: f64, lat: f64) -> Coordinate {
        Coordinate::from_lon_lat(lon, lat)
    }

    #[test]
    fn test_downsample_short_route_is_untouched() {
        let route = straight_route(c(67.0, 24.8), c(73.0, 33.6), 30);
        assert_eq!(downsample(&route), route);
    }

    #[test]
    fn test_downsample_caps_at_fifty() {
        let route = straight_route(c(67.0, 24.8), c(73.0, 33.6), 149);
        let sampled = downsample(&route);
        // rate 2 gives 75 candidates, truncated to the first 50
        assert_eq!(sampled.len(), 50);
        assert_eq!(sampled[1], route[2]);
    }

    #[tokio::test]
    async fn test_batches_are_sequential_and_ordered() {
        let route = straight_route(c(67.0, 24.8), c(73.0, 33.6), 45);
        let service = StubElevation::by_latitude();
        let mut estimator = BandedEstimator::seeded(1);

        let profile = profile_route(&service, &route, &mut estimator, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(profile.source, ElevationSource::Measured);
        assert_eq!(service.batch_sizes(), vec![20, 20, 5]);
        assert_eq!(profile.points.len(), 45);
        assert_eq!(profile.points[0].distance_from_start_km, 0.0);
        for (point, coord) in profile.points.iter().zip(&route) {
            assert_eq!(point.elevation_m, coord.lat * 10.0);
        }
        assert!(profile
            .points
            .windows(2)
            .all(|w| w[1].distance_from_start_km > w[0].distance_from_start_km));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_banded_estimates() {
        let route = vec![c(67.0, 24.8), c(71.5, 31.0), c(74.0, 35.5), c(76.0, 35.9)];
        let service = StubElevation::failing();
        let mut estimator = BandedEstimator::seeded(7);

        let profile = profile_route(&service, &route, &mut estimator, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(profile.source, ElevationSource::Estimated);
        assert_eq!(profile.points.len(), route.len());
        for (point, coord) in profile.points.iter().zip(&route) {
            assert!(estimate_range(*coord).contains(&point.elevation_m));
            assert_eq!(point.elevation_m.fract(), 0.0);
        }
    }

    #[tokio::test]
    async fn test_short_batch_response_triggers_fallback() {
        let route = straight_route(c(67.0, 24.8), c(68.0, 25.8), 10);
        let service = StubElevation::fixed(vec![100.0, 200.0]);
        let mut estimator = BandedEstimator::seeded(3);
        let profile = profile_route(&service, &route, &mut estimator, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(profile.source, ElevationSource::Estimated);
        assert_eq!(profile.points.len(), 10);
    }

    #[tokio::test]
    async fn test_invalid_coordinates_are_dropped() {
        let route = vec![c(67.0, 24.8), c(200.0, 24.9), c(67.2, 95.0), c(67.3, 25.0)];
        let service = StubElevation::by_latitude();
        let mut estimator = BandedEstimator::seeded(3);
        let profile = profile_route(&service, &route, &mut estimator, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(profile.source, ElevationSource::Measured);
        assert_eq!(profile.points.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_with_dropped_coordinates_estimates_valid_ones() {
        let route = vec![c(67.0, 24.8), c(200.0, 24.9), c(76.0, 35.0)];
        let valid: Vec<_> = route.iter().copied().filter(Coordinate::is_valid).collect();
        let service = StubElevation::failing();
        let mut estimator = BandedEstimator::seeded(11);

        let profile = profile_route(&service, &route, &mut estimator, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(profile.source, ElevationSource::Estimated);
        assert_eq!(profile.points.len(), valid.len());
        for (point, coord) in profile.points.iter().zip(&valid) {
            assert!(estimate_range(*coord).contains(&point.elevation_m));
        }
    }

    #[tokio::test]
    async fn test_run_elevation_propagates_empty_geometry() {
        let service = StubElevation::by_latitude();
        let mut estimator = BandedEstimator::seeded(5);
        let query = ElevationQuery {
            id: 1,
            geometry: Vec::new(),
        };
        let err = run_elevation(&service, &query, &mut estimator, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyGeometry));
    }

    #[tokio::test]
    async fn test_all_invalid_uses_secondary_fallback() {
        let route = vec![c(190.0, 95.0), c(191.0, 96.0)];
        let service = StubElevation::by_latitude();
        let mut estimator = BandedEstimator::seeded(3);
        let profile = profile_route(&service, &route, &mut estimator, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(profile.source, ElevationSource::Estimated);
        assert_eq!(profile.points.len(), 2);
        assert!(service.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_empty_route_is_rejected() {
        let service = StubElevation::by_latitude();
        let mut estimator = BandedEstimator::seeded(3);
        let err = profile_route(&service, &[], &mut estimator, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyGeometry));
    }

    #[test]
    fn test_seeded_estimator_is_reproducible() {
        let at = c(70.0, 32.0);
        let mut a = BandedEstimator::seeded(42);
        let mut b = BandedEstimator::seeded(42);
        assert_eq!(a.estimate(at), b.estimate(at));
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(latitude_band(34.5), 1000.0..3000.0);
        assert_eq!(latitude_band(34.0), 300.0..1000.0);
        assert_eq!(latitude_band(30.0), 300.0..1000.0);
        assert_eq!(latitude_band(29.9), 50.0..350.0);
        assert_eq!(eastern_bonus(75.1), 200.0);
        assert_eq!(eastern_bonus(75.0), 0.0);
    }

    #[test]
    fn test_stats() {
        let points = vec![
            ElevationPoint { distance_from_start_km: 0.0, elevation_m: 100.0 },
            ElevationPoint { distance_from_start_km: 1.0, elevation_m: 150.0 },
            ElevationPoint { distance_from_start_km: 2.0, elevation_m: 120.0 },
        ];
        let stats = ElevationStats::from_points(&points).unwrap();
        assert_eq!(stats.min_m, 100.0);
        assert_eq!(stats.max_m, 150.0);
        assert_eq!(stats.total_ascent_m, 50.0);
        assert_eq!(stats.total_descent_m, 30.0);
        assert_eq!(stats.average_grade_pct, Some(1.0));
        assert!(ElevationStats::from_points(&[]).is_none());

        let single = ElevationStats::from_points(&points[..1]).unwrap();
        assert_eq!(single.average_grade_pct, None);
    }

    #[test]
    fn test_sampler_discards_superseded_profile() {
        let route = vec![c(67.0, 24.8), c(67.1, 24.9)];
        let mut sampler = ElevationSampler::new();
        let first = sampler.begin(&route).unwrap();
        let second = sampler.begin(&route).unwrap();
        let profile = ElevationProfile {
            points: vec![ElevationPoint { distance_from_start_km: 0.0, elevation_m: 5.0 }],
            source: ElevationSource::Measured,
        };

        assert_eq!(sampler.apply(first.id, profile.clone()), Applied::Stale);
        assert!(sampler.is_loading());
        assert_eq!(sampler.apply(second.id, profile), Applied::Accepted);
        assert!(!sampler.is_loading());
        assert_eq!(sampler.points().len(), 1);

        sampler.reset();
        assert!(sampler.points().is_empty());
        assert!(sampler.begin(&[]).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_sample_count_matches_rule(n in 1usize..2_000) {
                let route = straight_route(c(60.0, 20.0), c(75.0, 35.0), n);
                let rate = (n / 50).max(1);
                let expected = n.div_ceil(rate).min(50);
                let sampled = downsample(&route);
                prop_assert_eq!(sampled.len(), expected);
                prop_assert!(sampled.len() <= MAX_SAMPLES);
            }

            #[test]
            fn prop_estimates_stay_in_band(
                lat in -90.0f64..90.0,
                lon in -180.0f64..180.0,
                seed in any::<u64>()
            ) {
                let at = c(lon, lat);
                let value = BandedEstimator::seeded(seed).estimate(at);
                prop_assert!(estimate_range(at).contains(&value));
            }
        }
    }
}
