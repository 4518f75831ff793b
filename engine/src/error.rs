use thiserror::Error;

/// Failures talking to an upstream geodata service.
///
/// Invalid input (for example a geometry with no usable coordinates) is
/// reported through the same type so callers handle both the same way.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("{url} answered HTTP {status}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("malformed response: {message}")]
    Parse { message: String },
    #[error("service returned {code}: {message}")]
    Upstream { code: String, message: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ServiceError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub(crate) fn from_reqwest(error: &reqwest::Error, url: &str, timeout_secs: u64) -> Self {
        if error.is_timeout() {
            return Self::Timeout { timeout_secs };
        }
        if let Some(status) = error.status() {
            return Self::Http {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }
        if error.is_decode() {
            return Self::parse(error.to_string());
        }
        Self::Network {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("alternative {index} does not exist ({available} available)")]
    AlternativeOutOfRange { index: usize, available: usize },
    #[error("no route is active")]
    NoActiveRoute,
    #[error("route geometry is empty")]
    EmptyGeometry,
    #[error("invalid configuration for {key}: {message}")]
    InvalidConfig { key: &'static str, message: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
