pub mod config;
pub mod elevation;
pub mod error;
pub mod geodesy;
pub mod measurement;
pub mod overlay;
pub mod poi;
pub mod providers;
pub mod routing;
pub mod search;
pub mod services;
pub mod session;
pub mod weather;

#[doc(hidden)]
pub mod test_support;

pub use config::EngineConfig;
pub use error::{EngineError, ServiceError};
pub use overlay::{Layer, LayerKey, MapSurface};
pub use routing::Applied;
pub use session::{MapSession, Services};
