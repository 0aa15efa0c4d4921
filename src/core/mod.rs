pub mod config;
pub mod error;
pub mod types;

pub use config::{ApiConfig, SeaWatchConfig, SessionConfig};
pub use error::{ApiError, Result, SeaWatchError};
pub use types::{ClientId, OperationId, SessionId};
