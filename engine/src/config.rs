//! Engine configuration, read from `MAP_SESSION_*` environment variables.

use std::time::Duration;

use crate::error::EngineError;

pub const DEFAULT_ROUTING_URL: &str = "https://router.project-osrm.org";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_ELEVATION_URL: &str = "https://api.open-meteo.com/v1/elevation";
pub const DEFAULT_WEATHER_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_COUNTRY: &str = "pk";
pub const DEFAULT_USER_AGENT: &str = "map-session/0.1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub routing_url: String,
    pub geocoder_url: String,
    pub overpass_url: String,
    pub elevation_url: String,
    pub weather_url: String,
    /// ISO 3166-1 alpha-2 code scoping place search.
    pub country_code: String,
    pub user_agent: String,
    /// Client-side deadline applied to every service call.
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            routing_url: DEFAULT_ROUTING_URL.to_string(),
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            elevation_url: DEFAULT_ELEVATION_URL.to_string(),
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            country_code: DEFAULT_COUNTRY.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidConfig`] when a variable is set but unusable.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = read("MAP_SESSION_ROUTING_URL") {
            config.routing_url = url;
        }
        if let Some(url) = read("MAP_SESSION_GEOCODER_URL") {
            config.geocoder_url = url;
        }
        if let Some(url) = read("MAP_SESSION_OVERPASS_URL") {
            config.overpass_url = url;
        }
        if let Some(url) = read("MAP_SESSION_ELEVATION_URL") {
            config.elevation_url = url;
        }
        if let Some(url) = read("MAP_SESSION_WEATHER_URL") {
            config.weather_url = url;
        }
        if let Some(country) = read("MAP_SESSION_COUNTRY") {
            config.country_code = country.trim().to_lowercase();
        }
        if let Some(agent) = read("MAP_SESSION_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(raw) = read("MAP_SESSION_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|err| EngineError::InvalidConfig {
                    key: "MAP_SESSION_TIMEOUT_SECS",
                    message: err.to_string(),
                })?;
            if secs == 0 {
                return Err(EngineError::InvalidConfig {
                    key: "MAP_SESSION_TIMEOUT_SECS",
                    message: "timeout must be at least one second".to_string(),
                });
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_routing_url(mut self, url: impl Into<String>) -> Self {
        self.routing_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_country(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = country_code.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
