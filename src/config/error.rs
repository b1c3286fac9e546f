//! Settings validation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment error: {message}")]
    Environment { message: String },
}
