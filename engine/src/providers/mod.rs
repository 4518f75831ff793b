//! HTTP implementations of the service traits.
//!
//! All providers share one [`reqwest::Client`] built by [`http_client`] and map
//! transport failures through [`ServiceError::from_reqwest`].

mod nominatim;
mod open_meteo;
mod osrm;
mod overpass;

pub use nominatim::NominatimGeocoder;
pub use open_meteo::{OpenMeteoElevation, OpenMeteoWeather};
pub use osrm::OsrmRouter;
pub use overpass::OverpassPois;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::config::EngineConfig;
use crate::error::{EngineError, ServiceError};

/// Client with the configured user agent and timeout.
///
/// # Errors
/// Returns [`EngineError::HttpClient`] when the TLS backend cannot start.
pub fn http_client(config: &EngineConfig) -> Result<Client, EngineError> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(config.request_timeout)
        .timeout(config.request_timeout)
        .build()?;
    Ok(client)
}

/// Send a request and decode its JSON body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
    timeout_secs: u64,
) -> Result<T, ServiceError> {
    tracing::debug!("requesting {url}");
    let response = request
        .send()
        .await
        .map_err(|err| ServiceError::from_reqwest(&err, url, timeout_secs))?
        .error_for_status()
        .map_err(|err| ServiceError::from_reqwest(&err, url, timeout_secs))?;
    response
        .json::<T>()
        .await
        .map_err(|err| ServiceError::parse(err.to_string()))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://a/", "/search"), "http://a/search");
        assert_eq!(join_url("http://a", "search"), "http://a/search");
    }

    #[test]
    fn client_builds_from_defaults() {
        assert!(http_client(&EngineConfig::default()).is_ok());
    }
}
