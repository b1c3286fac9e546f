//! Signature V4 errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Missing required header: {header}")]
    MissingHeader { header: String },

    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },

    /// Key material or a computed header value was unusable.
    #[error("Signing failed: {message}")]
    SigningFailed { message: String },
}
