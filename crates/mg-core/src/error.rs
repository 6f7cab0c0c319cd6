//! Error types for mg-core

use thiserror::Error;

/// Main error type for mg-core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification handler error: {0}")]
    Notification(String),
}

/// Result type alias for mg-core
pub type Result<T> = std::result::Result<T, CoreError>;
