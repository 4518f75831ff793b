//! Pure geometry helpers shared by every subsystem.

use geo_types::{coord, Rect};
use shared::Coordinate;

/// Mean Earth radius (IUGG) in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_009.0;
/// Meters per degree of latitude in the local equirectangular projection.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Great-circle distance in meters.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    haversine_m(a, b) / 1000.0
}

/// Sum of consecutive great-circle legs. Zero below two points.
pub fn path_length_m(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

/// Running total of great-circle distance in km, one entry per point.
pub fn cumulative_km(path: &[Coordinate]) -> Vec<f64> {
    let mut total = 0.0;
    let mut out = Vec::with_capacity(path.len());
    for (idx, point) in path.iter().enumerate() {
        if idx > 0 {
            total += haversine_km(path[idx - 1], *point);
        }
        out.push(total);
    }
    out
}

/// Polygon area in square meters.
///
/// Points are projected onto a local equirectangular plane centred on their
/// mean latitude, then the shoelace formula is applied with the ring
/// implicitly closed. Zero below three points.
pub fn polygon_area_m2(ring: &[Coordinate]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mean_lat = ring.iter().map(|c| c.lat).sum::<f64>() / ring.len() as f64;
    let lon_to_m = METERS_PER_DEGREE * mean_lat.to_radians().cos();
    let lat_to_m = METERS_PER_DEGREE;

    let projected: Vec<(f64, f64)> = ring
        .iter()
        .map(|c| (c.lon * lon_to_m, c.lat * lat_to_m))
        .collect();

    let twice_area: f64 = projected
        .iter()
        .zip(projected.iter().cycle().skip(1))
        .map(|(&(x1, y1), &(x2, y2))| x1 * y2 - x2 * y1)
        .sum();

    twice_area.abs() / 2.0
}

/// Bounding box with `x = lon`, `y = lat`. `None` for an empty path.
pub fn bounds(path: &[Coordinate]) -> Option<Rect<f64>> {
    let first = path.first()?;
    let (mut min_lon, mut max_lon) = (first.lon, first.lon);
    let (mut min_lat, mut max_lat) = (first.lat, first.lat);
    for c in &path[1..] {
        min_lon = min_lon.min(c.lon);
        max_lon = max_lon.max(c.lon);
        min_lat = min_lat.min(c.lat);
        max_lat = max_lat.max(c.lat);
    }
    Some(Rect::new(
        coord! { x: min_lon, y: min_lat },
        coord! { x: max_lon, y: max_lat },
    ))
}

pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

pub fn format_duration(seconds: f64) -> String {
    let total_minutes = (seconds.max(0.0) / 60.0).round() as u64;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours} h {minutes} min")
    } else {
        format!("{minutes} min")
    }
}

pub fn format_area(square_meters: f64) -> String {
    if square_meters < 1_000_000.0 {
        format!("{} m²", group_thousands(square_meters.round() as u64))
    } else {
        format!("{:.2} km²", square_meters / 1_000_000.0)
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lon: f64, lat: f64) -> Coordinate {
        Coordinate::from_lon_lat(lon, lat)
    }

    #[test]
    fn test_haversine_same_point() {
        let point = c(5.0, 45.0);
        assert_eq!(haversine_m(point, point), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Karachi to Islamabad, roughly 1,145 km as the crow flies
        let dist = haversine_km(c(67.0011, 24.8607), c(73.0479, 33.6844));
        assert!((dist - 1145.0).abs() < 15.0, "got {dist}");
    }

    #[test]
    fn test_path_length_short_paths() {
        assert_eq!(path_length_m(&[]), 0.0);
        assert_eq!(path_length_m(&[c(1.0, 1.0)]), 0.0);
    }

    #[test]
    fn test_cumulative_km_starts_at_zero() {
        let path = [c(0.0, 0.0), c(0.0, 1.0), c(0.0, 2.0)];
        let totals = cumulative_km(&path);
        assert_eq!(totals.len(), 3);
        assert_eq!(totals[0], 0.0);
        assert!((totals[2] - 2.0 * totals[1]).abs() < 1e-6);
    }

    #[test]
    fn test_unit_square_area() {
        let square = [c(0.0, 0.0), c(0.0, 1.0), c(1.0, 1.0), c(1.0, 0.0)];
        let expected = METERS_PER_DEGREE * METERS_PER_DEGREE * 0.5_f64.to_radians().cos();
        let area = polygon_area_m2(&square);
        assert!((area - expected).abs() / expected < 1e-9, "got {area}");
    }

    #[test]
    fn test_area_needs_three_points() {
        assert_eq!(polygon_area_m2(&[c(0.0, 0.0), c(1.0, 1.0)]), 0.0);
    }

    #[test]
    fn test_bounds() {
        let rect = bounds(&[c(67.0, 24.8), c(73.0, 33.6), c(70.0, 30.0)]).unwrap();
        assert_eq!(rect.min().x, 67.0);
        assert_eq!(rect.min().y, 24.8);
        assert_eq!(rect.max().x, 73.0);
        assert_eq!(rect.max().y, 33.6);
        assert!(bounds(&[]).is_none());
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_distance(850.4), "850 m");
        assert_eq!(format_distance(12_430.0), "12.4 km");
        assert_eq!(format_duration(45.0 * 60.0), "45 min");
        assert_eq!(format_duration(125.0 * 60.0), "2 h 5 min");
        assert_eq!(format_area(5_000.0), "5,000 m²");
        assert_eq!(format_area(999.0), "999 m²");
        assert_eq!(format_area(2_500_000.0), "2.50 km²");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn valid_coord() -> impl Strategy<Value = Coordinate> {
            (-80.0..=80.0, -179.0..=179.0).prop_map(|(lat, lon)| Coordinate { lat, lon })
        }

        fn local_coord() -> impl Strategy<Value = Coordinate> {
            (24.0..=36.0, 61.0..=77.0).prop_map(|(lat, lon)| Coordinate { lat, lon })
        }

        proptest! {
            #[test]
            fn prop_haversine_symmetric(a in valid_coord(), b in valid_coord()) {
                prop_assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1e-6);
            }

            #[test]
            fn prop_path_length_is_sum_of_legs(
                path in prop::collection::vec(valid_coord(), 2..12)
            ) {
                let expected: f64 = (1..path.len())
                    .map(|i| haversine_m(path[i - 1], path[i]))
                    .sum();
                prop_assert!((path_length_m(&path) - expected).abs() < 1e-6);
            }

            #[test]
            fn prop_area_invariant_under_rotation(
                ring in prop::collection::vec(local_coord(), 3..10),
                shift in 0usize..10
            ) {
                let mut rotated = ring.clone();
                rotated.rotate_left(shift % ring.len());
                let a = polygon_area_m2(&ring);
                let b = polygon_area_m2(&rotated);
                prop_assert!((a - b).abs() <= 1e-6 * a + 1.0);
            }

            #[test]
            fn prop_area_invariant_under_reversal(
                ring in prop::collection::vec(local_coord(), 3..10)
            ) {
                let mut reversed = ring.clone();
                reversed.reverse();
                let a = polygon_area_m2(&ring);
                let b = polygon_area_m2(&reversed);
                prop_assert!((a - b).abs() <= 1e-6 * a + 1.0);
            }

            #[test]
            fn prop_cumulative_matches_total(
                path in prop::collection::vec(valid_coord(), 1..12)
            ) {
                let totals = cumulative_km(&path);
                let last = *totals.last().unwrap();
                prop_assert!((last * 1000.0 - path_length_m(&path)).abs() < 1e-3);
            }
        }
    }
}
