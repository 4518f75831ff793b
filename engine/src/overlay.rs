//! Map-surface contract and per-component layer ownership.
//!
//! The rendering collaborator only ever sees `upsert_layer` / `remove_layer`
//! (plus a viewport fit). Each component owns an [`OwnedLayers`] registry for
//! its [`LayerOwner`]; keys for another owner cannot be produced through it,
//! so components never touch each other's layers.

use std::collections::BTreeMap;
use std::fmt;

use geo_types::Rect;
use shared::{Coordinate, PoiCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerOwner {
    Routing,
    Measurement,
    Poi,
}

impl LayerOwner {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Measurement => "measurement",
            Self::Poi => "poi",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey {
    owner: LayerOwner,
    name: String,
}

impl LayerKey {
    pub fn owner(&self) -> LayerOwner {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner.as_str(), self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Route,
    Measurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    End,
    /// 1-based ordinal of a measurement point.
    Numbered(usize),
    Poi(PoiCategory),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Line {
        path: Vec<Coordinate>,
        style: LineStyle,
    },
    Polygon {
        ring: Vec<Coordinate>,
    },
    Marker {
        at: Coordinate,
        kind: MarkerKind,
        label: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    pub padding_px: u32,
    pub duration_ms: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            padding_px: 80,
            duration_ms: 1000,
        }
    }
}

/// The rendering collaborator. Drawing never suspends.
pub trait MapSurface {
    fn upsert_layer(&mut self, key: &LayerKey, layer: &Layer);
    fn remove_layer(&mut self, key: &LayerKey);
    /// Fit the viewport to `bounds` (`x = lon`, `y = lat`).
    fn fit_bounds(&mut self, bounds: Rect<f64>, options: FitOptions);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub upserted: usize,
    pub removed: usize,
}

/// Layers currently drawn by one owner.
#[derive(Debug, Clone)]
pub struct OwnedLayers {
    owner: LayerOwner,
    current: BTreeMap<LayerKey, Layer>,
}

impl OwnedLayers {
    pub fn new(owner: LayerOwner) -> Self {
        Self {
            owner,
            current: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> LayerOwner {
        self.owner
    }

    pub fn key(&self, name: impl Into<String>) -> LayerKey {
        LayerKey {
            owner: self.owner,
            name: name.into(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.current.get(&self.key(name))
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.current.keys().map(LayerKey::name)
    }

    /// Bring the surface in line with `desired`, touching only what changed.
    pub fn sync<I>(&mut self, desired: I, map: &mut dyn MapSurface) -> SyncStats
    where
        I: IntoIterator<Item = (String, Layer)>,
    {
        let desired: BTreeMap<LayerKey, Layer> = desired
            .into_iter()
            .map(|(name, layer)| (self.key(name), layer))
            .collect();
        let mut stats = SyncStats::default();

        for key in self.current.keys() {
            if !desired.contains_key(key) {
                map.remove_layer(key);
                stats.removed += 1;
            }
        }
        for (key, layer) in &desired {
            if self.current.get(key) != Some(layer) {
                map.upsert_layer(key, layer);
                stats.upserted += 1;
            }
        }

        if stats != SyncStats::default() {
            tracing::debug!(
                "{} layers synced: {} upserted, {} removed",
                self.owner.as_str(),
                stats.upserted,
                stats.removed
            );
        }
        self.current = desired;
        stats
    }

    pub fn clear(&mut self, map: &mut dyn MapSurface) -> SyncStats {
        self.sync(std::iter::empty(), map)
    }
}
