use crate::session::stage::LoadingStage;
use thiserror::Error;

/// Failure of a single call against the remote simulation service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Transport-level failure (connection refused, reset, unreadable body)
    #[error("Network error: {0}")]
    Network(String),

    /// The per-call timeout elapsed or the call's cancellation token fired
    #[error("Request timed out")]
    Timeout,

    /// HTTP 404: the session no longer exists server-side
    #[error("Simulation not found")]
    NotFound,

    /// Non-success application status, with the server's message when it sent one
    #[error("{message}")]
    Rejected {
        status: Option<u16>,
        message: String,
        loading_stage: Option<LoadingStage>,
    },
}

impl ApiError {
    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        ApiError::Rejected {
            status,
            message: message.into(),
            loading_stage: None,
        }
    }

    /// Transient failures worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            ApiError::NotFound
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum SeaWatchError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Cannot step a running simulation")]
    StepWhileRunning,

    #[error("Invalid speed: {0}")]
    InvalidSpeed(f64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SeaWatchError>;
