//! Overpass QL queries for category POIs.

use async_trait::async_trait;
use geo_types::Rect;
use reqwest::Client;
use serde::Deserialize;
use shared::{Coordinate, PoiCategory};

use super::fetch_json;
use crate::config::EngineConfig;
use crate::error::ServiceError;
use crate::services::{PoiElement, PoiService};

const SERVER_TIMEOUT_SECS: u64 = 25;

#[derive(Debug, Clone)]
pub struct OverpassPois {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl OverpassPois {
    pub fn new(client: Client, config: &EngineConfig) -> Self {
        Self {
            client,
            url: config.overpass_url.clone(),
            timeout_secs: config.request_timeout.as_secs(),
        }
    }
}

/// Tag filter selecting a category.
pub(crate) fn tag_filter(category: PoiCategory) -> &'static str {
    match category {
        PoiCategory::Hospital => r#"["amenity"="hospital"]"#,
        PoiCategory::School => r#"["amenity"="school"]"#,
        PoiCategory::FuelStation => r#"["amenity"="fuel"]"#,
        PoiCategory::Restaurant => r#"["amenity"="restaurant"]"#,
    }
}

/// Nodes and ways inside `bounds`, ways reduced to their center.
pub(crate) fn build_query(bounds: Rect<f64>, category: PoiCategory) -> String {
    let bbox = format!(
        "{},{},{},{}",
        bounds.min().y,
        bounds.min().x,
        bounds.max().y,
        bounds.max().x
    );
    let filter = tag_filter(category);
    format!(
        "[out:json][timeout:{SERVER_TIMEOUT_SECS}];\n(\n  node{filter}({bbox});\n  way{filter}({bbox});\n);\nout center;"
    )
}

#[async_trait]
impl PoiService for OverpassPois {
    async fn query(
        &self,
        bounds: Rect<f64>,
        category: PoiCategory,
    ) -> Result<Vec<PoiElement>, ServiceError> {
        let builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/plain")
            .body(build_query(bounds, category));
        let response: OverpassResponse = fetch_json(builder, &self.url, self.timeout_secs).await?;
        Ok(response.into_elements())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverpassElement {
    pub id: u64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub center: Option<Center>,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Center {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Tags {
    pub name: Option<String>,
}

impl OverpassResponse {
    /// Elements without a point or center are skipped.
    fn into_elements(self) -> Vec<PoiElement> {
        self.elements
            .into_iter()
            .filter_map(|element| {
                let coordinate = match (element.lat, element.lon, element.center) {
                    (Some(lat), Some(lon), _) => Coordinate::from_lon_lat(lon, lat),
                    (_, _, Some(center)) => Coordinate::from_lon_lat(center.lon, center.lat),
                    _ => {
                        tracing::debug!("overpass: element {} has no position", element.id);
                        return None;
                    }
                };
                Some(PoiElement {
                    id: element.id,
                    name: element.tags.name,
                    coordinate,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use geo_types::coord;

    use super::*;

    #[test]
    fn query_uses_south_west_north_east() {
        let bounds = Rect::new(coord! { x: 66.9, y: 24.7 }, coord! { x: 67.2, y: 25.0 });
        let query = build_query(bounds, PoiCategory::FuelStation);
        assert!(query.starts_with("[out:json]"));
        assert!(query.contains(r#"node["amenity"="fuel"](24.7,66.9,25,67.2);"#));
        assert!(query.ends_with("out center;"));
    }

    #[test]
    fn nodes_and_way_centers_are_decoded() {
        let body = r#"{"elements": [
            {"type": "node", "id": 1, "lat": 24.86, "lon": 67.01, "tags": {"name": "Civil Hospital"}},
            {"type": "way", "id": 2, "center": {"lat": 24.9, "lon": 67.05}, "tags": {}},
            {"type": "relation", "id": 3}
        ]}"#;
        let response: OverpassResponse = serde_json::from_str(body).unwrap();
        let elements = response.into_elements();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].name.as_deref(), Some("Civil Hospital"));
        assert_eq!(elements[1].coordinate, Coordinate::from_lon_lat(67.05, 24.9));
        assert_eq!(elements[1].name, None);
    }
}
