use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited by upstream")]
    Throttled { reset_after: Option<Duration> },

    #[error("transient network failure: {0}")]
    Transient(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("profile could not be resolved for {0}")]
    PartialData(String),

    #[error("collection cancelled")]
    Cancelled,

    #[error("invalid search criteria: {0}")]
    InvalidCriteria(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

impl ScoutError {
    /// Whether a failed request may be reissued under the retry policy.
    pub fn is_transient(&self) -> bool {
        match self {
            ScoutError::Transient(_) | ScoutError::Throttled { .. } => true,
            ScoutError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
