//! Nominatim search and reverse geocoding.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::{Coordinate, SearchResult};

use super::{fetch_json, join_url};
use crate::config::EngineConfig;
use crate::error::ServiceError;
use crate::services::GeocodingService;

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl NominatimGeocoder {
    pub fn new(client: Client, config: &EngineConfig) -> Self {
        Self {
            client,
            base_url: config.geocoder_url.clone(),
            timeout_secs: config.request_timeout.as_secs(),
        }
    }
}

#[async_trait]
impl GeocodingService for NominatimGeocoder {
    async fn search(
        &self,
        query: &str,
        country_code: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, ServiceError> {
        let url = join_url(&self.base_url, "search");
        let limit = limit.to_string();
        let builder = self.client.get(&url).query(&[
            ("q", query),
            ("format", "json"),
            ("countrycodes", country_code),
            ("limit", limit.as_str()),
        ]);
        let places: Vec<Place> = fetch_json(builder, &url, self.timeout_secs).await?;
        places.into_iter().map(Place::into_result).collect()
    }

    async fn reverse(&self, at: Coordinate) -> Result<Option<String>, ServiceError> {
        let url = join_url(&self.base_url, "reverse");
        let builder = self.client.get(&url).query(&[
            ("lat", at.lat.to_string()),
            ("lon", at.lon.to_string()),
            ("format", "json".to_string()),
        ]);
        let reverse: Reverse = fetch_json(builder, &url, self.timeout_secs).await?;
        Ok(reverse.place_name())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Place {
    pub place_id: u64,
    pub display_name: String,
    /// Decimal degrees, sent as strings.
    pub lat: String,
    pub lon: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, alias = "category")]
    pub class: String,
}

impl Place {
    fn into_result(self) -> Result<SearchResult, ServiceError> {
        let parse = |value: &str, field: &str| {
            value.trim().parse::<f64>().map_err(|_| {
                ServiceError::parse(format!("place {}: bad {field} {value:?}", self.place_id))
            })
        };
        Ok(SearchResult {
            id: self.place_id,
            lat: parse(&self.lat, "lat")?,
            lon: parse(&self.lon, "lon")?,
            display_name: self.display_name,
            kind: self.kind,
            class: self.class,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Reverse {
    pub address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Address {
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub county: Option<String>,
}

impl Reverse {
    /// City, then town, village, county.
    fn place_name(self) -> Option<String> {
        let address = self.address?;
        address
            .city
            .or(address.town)
            .or(address.village)
            .or(address.county)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_search_hits() {
        let body = r#"[{
            "place_id": 240109189,
            "display_name": "Lahore, Punjab, Pakistan",
            "lat": "31.5656822",
            "lon": "74.3141829",
            "type": "city",
            "class": "place"
        }]"#;
        let places: Vec<Place> = serde_json::from_str(body).unwrap();
        let hit = places.into_iter().next().unwrap().into_result().unwrap();
        assert_eq!(hit.id, 240109189);
        assert_eq!(hit.kind, "city");
        assert!((hit.lat - 31.5656822).abs() < 1e-9);
    }

    #[test]
    fn bad_coordinate_is_parse_error() {
        let place = Place {
            place_id: 1,
            display_name: "x".into(),
            lat: "north".into(),
            lon: "0".into(),
            kind: String::new(),
            class: String::new(),
        };
        assert!(matches!(place.into_result(), Err(ServiceError::Parse { .. })));
    }

    #[test]
    fn reverse_prefers_city_over_county() {
        let body = r#"{"address": {"county": "Rawalpindi District", "town": "Murree"}}"#;
        let reverse: Reverse = serde_json::from_str(body).unwrap();
        assert_eq!(reverse.place_name().as_deref(), Some("Murree"));

        let body = r#"{"error": "Unable to geocode"}"#;
        let reverse: Reverse = serde_json::from_str(body).unwrap();
        assert_eq!(reverse.place_name(), None);
    }
}
