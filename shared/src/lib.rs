use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// WGS84 position. Services speak `lon,lat`; fields are named to avoid mixups.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn from_lon_lat(lon: f64, lat: f64) -> Self {
        Self { lat, lon }
    }

    /// True when latitude lies in [-90, 90] and longitude in [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A start or end point picked by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub coordinate: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RoutePoint {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            label: None,
        }
    }

    pub fn labelled(coordinate: Coordinate, label: impl Into<String>) -> Self {
        Self {
            coordinate,
            label: Some(label.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelProfile {
    #[default]
    Driving,
    Cycling,
    Walking,
}

impl TravelProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Driving => "driving",
            Self::Cycling => "cycling",
            Self::Walking => "walking",
        }
    }
}

/// What a click on the map currently means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    #[default]
    Idle,
    SelectingStart,
    SelectingEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationStep {
    pub instruction: String,
    pub distance_m: f64,
    pub duration_s: f64,
    pub maneuver_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maneuver_modifier: Option<String>,
    pub road_name: String,
    pub location: Coordinate,
}

/// A complete route as returned by the routing service. Replaced wholesale,
/// never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub distance_m: f64,
    pub duration_s: f64,
    pub geometry: Vec<Coordinate>,
    pub steps: Vec<NavigationStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlternativeRank {
    Fastest,
    Shortest,
    Balanced,
}

/// Positive values mean the alternative is faster/shorter than the primary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    pub time_s: f64,
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAlternative {
    #[serde(flatten)]
    pub route: RouteInfo,
    pub rank: AlternativeRank,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings_vs_fastest: Option<Savings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureMode {
    Distance,
    Area,
}

impl MeasureMode {
    /// Number of points needed before a result exists.
    pub fn min_points(self) -> usize {
        match self {
            Self::Distance => 2,
            Self::Area => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureResult {
    DistanceMeters(f64),
    AreaSqMeters(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiCategory {
    Hospital,
    School,
    FuelStation,
    Restaurant,
}

impl PoiCategory {
    pub const ALL: [PoiCategory; 4] = [
        Self::Hospital,
        Self::School,
        Self::FuelStation,
        Self::Restaurant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hospital => "hospital",
            Self::School => "school",
            Self::FuelStation => "fuel_station",
            Self::Restaurant => "restaurant",
        }
    }

    /// Human-readable singular, used for unnamed placeholders.
    pub fn singular(self) -> &'static str {
        match self {
            Self::Hospital => "hospital",
            Self::School => "school",
            Self::FuelStation => "fuel station",
            Self::Restaurant => "restaurant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: u64,
    pub category: PoiCategory,
    pub name: String,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationPoint {
    pub distance_from_start_km: f64,
    pub elevation_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature_c: f64,
    pub weather_code: u16,
    pub wind_speed_kmh: f64,
    pub humidity_pct: f64,
    pub visibility_m: f64,
    pub pressure_hpa: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub time: NaiveDateTime,
    pub temperature_c: f64,
    pub weather_code: u16,
    pub precipitation_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub location_label: String,
    pub coordinate: Coordinate,
    pub current: CurrentConditions,
    pub hourly: Vec<HourlyForecast>,
}

/// One hit from the place search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: u64,
    pub display_name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub class: String,
}

impl SearchResult {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }

    pub fn to_route_point(&self) -> RoutePoint {
        RoutePoint::labelled(self.coordinate(), self.display_name.clone())
    }
}
