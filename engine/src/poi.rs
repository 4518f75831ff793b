//! Category-keyed points of interest over the current viewport.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use geo_types::Rect;
use shared::{Poi, PoiCategory};

use crate::error::{EngineError, ServiceError};
use crate::overlay::{Layer, LayerOwner, MapSurface, MarkerKind, OwnedLayers};
use crate::routing::{Applied, RequestId};
use crate::services::{with_deadline, PoiElement, PoiService};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoiQuery {
    pub id: RequestId,
    pub category: PoiCategory,
    pub bounds: Rect<f64>,
}

/// Per-category fetch state for an active category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CategoryFetch {
    InFlight(RequestId),
    Settled,
}

pub struct PoiOverlayManager {
    active: BTreeMap<PoiCategory, CategoryFetch>,
    pois: Vec<Poi>,
    next_id: RequestId,
    layers: OwnedLayers,
}

impl Default for PoiOverlayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PoiOverlayManager {
    pub fn new() -> Self {
        Self {
            active: BTreeMap::new(),
            pois: Vec::new(),
            next_id: 0,
            layers: OwnedLayers::new(LayerOwner::Poi),
        }
    }

    pub fn pois(&self) -> &[Poi] {
        &self.pois
    }

    pub fn is_active(&self, category: PoiCategory) -> bool {
        self.active.contains_key(&category)
    }

    pub fn active_categories(&self) -> impl Iterator<Item = PoiCategory> + '_ {
        self.active.keys().copied()
    }

    pub fn is_loading(&self, category: PoiCategory) -> bool {
        matches!(self.active.get(&category), Some(CategoryFetch::InFlight(_)))
    }

    /// Turn a category off (dropping its POIs) or on (returning a query for
    /// the current viewport).
    pub fn toggle_category(
        &mut self,
        category: PoiCategory,
        viewport: Rect<f64>,
        map: &mut dyn MapSurface,
    ) -> Option<PoiQuery> {
        if self.active.remove(&category).is_some() {
            let before = self.pois.len();
            self.pois.retain(|poi| poi.category != category);
            tracing::info!(
                "poi: {} off, {} marker(s) dropped",
                category.as_str(),
                before - self.pois.len()
            );
            self.redraw(map);
            return None;
        }

        self.next_id += 1;
        let id = self.next_id;
        self.active.insert(category, CategoryFetch::InFlight(id));
        tracing::info!("poi: {} on, query #{id}", category.as_str());
        Some(PoiQuery {
            id,
            category,
            bounds: viewport,
        })
    }

    /// Merge a category's results. Responses for categories that were turned
    /// off or re-queried since are dropped.
    ///
    /// # Errors
    /// Returns the service error for the current query; the category stays
    /// active with no POIs and other categories are unaffected.
    pub fn apply_poi_response(
        &mut self,
        query: &PoiQuery,
        result: Result<Vec<PoiElement>, ServiceError>,
        map: &mut dyn MapSurface,
    ) -> Result<Applied, EngineError> {
        if self.active.get(&query.category) != Some(&CategoryFetch::InFlight(query.id)) {
            tracing::debug!(
                "poi: discarding stale {} response #{}",
                query.category.as_str(),
                query.id
            );
            return Ok(Applied::Stale);
        }
        self.active.insert(query.category, CategoryFetch::Settled);

        let elements = match result {
            Ok(elements) => elements,
            Err(err) => {
                tracing::warn!("poi: {} query failed: {err}", query.category.as_str());
                return Err(err.into());
            }
        };

        let mut seen: HashSet<u64> = self
            .pois
            .iter()
            .filter(|poi| poi.category == query.category)
            .map(|poi| poi.id)
            .collect();
        let before = self.pois.len();
        for element in elements {
            if seen.insert(element.id) {
                self.pois.push(into_poi(element, query.category));
            }
        }
        tracing::info!(
            "poi: {} added {} marker(s)",
            query.category.as_str(),
            self.pois.len() - before
        );
        self.redraw(map);
        Ok(Applied::Accepted)
    }

    /// Forget every category and POI. In-flight responses become stale.
    pub fn clear_all(&mut self, map: &mut dyn MapSurface) {
        self.active.clear();
        self.pois.clear();
        self.layers.clear(map);
    }

    fn redraw(&mut self, map: &mut dyn MapSurface) {
        let desired: Vec<(String, Layer)> = self
            .pois
            .iter()
            .map(|poi| {
                (
                    format!("poi-{}-{}", poi.category.as_str(), poi.id),
                    Layer::Marker {
                        at: poi.coordinate,
                        kind: MarkerKind::Poi(poi.category),
                        label: Some(poi.name.clone()),
                    },
                )
            })
            .collect();
        self.layers.sync(desired, map);
    }
}

fn into_poi(element: PoiElement, category: PoiCategory) -> Poi {
    let name = element
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("Unnamed {}", category.singular()));
    Poi {
        id: element.id,
        category,
        name,
        coordinate: element.coordinate,
    }
}

pub async fn fetch_pois(
    service: &dyn PoiService,
    query: &PoiQuery,
    timeout: Duration,
) -> Result<Vec<PoiElement>, ServiceError> {
    with_deadline(timeout, service.query(query.bounds, query.category)).await
}
