//! Credential provider errors.

use thiserror::Error;

/// Errors raised while loading credentials from a provider.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No provider could supply credentials.
    #[error("Missing credentials: {message}")]
    Missing { message: String },

    /// Credentials were found but are malformed.
    #[error("Invalid credentials: {message}")]
    Invalid { message: String },

    #[error("Expired credentials")]
    Expired,

    /// A provider failed while reading its source.
    #[error("Failed to load credentials from {provider}: {message}")]
    LoadFailed { provider: String, message: String },

    #[error("Profile error: {message}")]
    ProfileError { message: String },
}
