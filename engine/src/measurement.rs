//! Click-accumulated distance and area measurement.

use shared::{Coordinate, MeasureMode, MeasureResult};

use crate::geodesy;
use crate::overlay::{Layer, LayerOwner, LineStyle, MapSurface, MarkerKind, OwnedLayers};

const SHAPE_LAYER: &str = "measure-shape";

/// A measurement point with its 1-based ordinal, as shown on the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberedPoint {
    pub ordinal: usize,
    pub coordinate: Coordinate,
}

pub struct MeasurementEngine {
    mode: Option<MeasureMode>,
    points: Vec<Coordinate>,
    result: Option<MeasureResult>,
    layers: OwnedLayers,
}

impl Default for MeasurementEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementEngine {
    pub fn new() -> Self {
        Self {
            mode: None,
            points: Vec::new(),
            result: None,
            layers: OwnedLayers::new(LayerOwner::Measurement),
        }
    }

    pub fn mode(&self) -> Option<MeasureMode> {
        self.mode
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn numbered_points(&self) -> impl Iterator<Item = NumberedPoint> + '_ {
        self.points
            .iter()
            .enumerate()
            .map(|(idx, coordinate)| NumberedPoint {
                ordinal: idx + 1,
                coordinate: *coordinate,
            })
    }

    /// `None` until the mode's minimum point count is reached.
    pub fn result(&self) -> Option<MeasureResult> {
        self.result
    }

    /// Switch measurement mode. Always starts from an empty point set;
    /// selecting the active mode again turns measurement off.
    pub fn set_mode(&mut self, mode: Option<MeasureMode>, map: &mut dyn MapSurface) {
        self.mode = if mode.is_some() && mode == self.mode {
            None
        } else {
            mode
        };
        tracing::debug!("measurement mode now {:?}", self.mode);
        self.clear(map);
    }

    /// Append a point and recompute the result from scratch.
    /// Ignored when no mode is active.
    pub fn add_point(
        &mut self,
        coordinate: Coordinate,
        map: &mut dyn MapSurface,
    ) -> Option<MeasureResult> {
        let mode = self.mode?;
        self.points.push(coordinate);
        self.result = compute(mode, &self.points);
        self.redraw(map);
        self.result
    }

    pub fn clear(&mut self, map: &mut dyn MapSurface) {
        self.points.clear();
        self.result = None;
        self.layers.clear(map);
    }

    fn redraw(&mut self, map: &mut dyn MapSurface) {
        let mut desired: Vec<(String, Layer)> = self
            .numbered_points()
            .map(|p| {
                (
                    format!("measure-point-{}", p.ordinal),
                    Layer::Marker {
                        at: p.coordinate,
                        kind: MarkerKind::Numbered(p.ordinal),
                        label: Some(p.ordinal.to_string()),
                    },
                )
            })
            .collect();

        let shape = match (self.mode, self.points.len()) {
            (Some(MeasureMode::Area), n) if n >= 3 => Some(Layer::Polygon {
                ring: self.points.clone(),
            }),
            (Some(_), n) if n >= 2 => Some(Layer::Line {
                path: self.points.clone(),
                style: LineStyle::Measurement,
            }),
            _ => None,
        };
        if let Some(shape) = shape {
            desired.push((SHAPE_LAYER.to_string(), shape));
        }

        self.layers.sync(desired, map);
    }
}

fn compute(mode: MeasureMode, points: &[Coordinate]) -> Option<MeasureResult> {
    if points.len() < mode.min_points() {
        return None;
    }
    Some(match mode {
        MeasureMode::Distance => MeasureResult::DistanceMeters(measure_distance(points)),
        MeasureMode::Area => MeasureResult::AreaSqMeters(measure_area(points)),
    })
}

/// Sum of consecutive great-circle distances, 0 below two points.
pub fn measure_distance(points: &[Coordinate]) -> f64 {
    geodesy::path_length_m(points)
}

/// Projected shoelace area of the implicitly closed polygon, 0 below three points.
pub fn measure_area(points: &[Coordinate]) -> f64 {
    geodesy::polygon_area_m2(points)
}
