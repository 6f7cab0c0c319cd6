//! Error types for mg-facebook

use thiserror::Error;

/// mg-facebook error type
#[derive(Error, Debug)]
pub enum FacebookError {
    #[error("Facebook API error: {0}")]
    Api(String),

    #[error("Facebook API request failed: {0}")]
    Request(String),

    #[error("Invalid send request: {0}")]
    InvalidSendRequest(String),

    #[error("Page access token mismatch")]
    TokenMismatch,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Core error: {0}")]
    Core(#[from] mg_core::CoreError),
}

impl From<reqwest::Error> for FacebookError {
    fn from(err: reqwest::Error) -> Self {
        FacebookError::Request(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FacebookError>;
