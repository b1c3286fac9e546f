//! Error types for the SES mail backend.
//!
//! Every fallible operation in the crate returns [`SesResult`]. Variants are
//! grouped by [`ErrorClass`] so callers can tell a broken setup apart from a
//! message that could not be encoded or a delivery that the service refused.
//!
//! The dispatcher does not decide fail-silently eligibility from the variant:
//! any error returned by the transport call may be swallowed, while errors
//! raised while preparing the message always reach the caller.
//!
//! # Examples
//!
//! ```rust
//! use integrations_ses_mailer::error::{ErrorClass, SesError};
//!
//! fn report(error: &SesError) {
//!     match error.class() {
//!         ErrorClass::Configuration => eprintln!("fix your settings: {}", error),
//!         ErrorClass::Message => eprintln!("bad message: {}", error),
//!         ErrorClass::Transport => {
//!             if let Some(code) = error.error_code() {
//!                 eprintln!("SES said {}", code);
//!             }
//!         }
//!     }
//! }
//! ```

mod mapping;

pub use mapping::{
    map_aws_error, map_sts_error, parse_error_response, parse_sts_error_response,
    AwsErrorResponse, StsErrorResponse,
};
pub(crate) use mapping::strip_namespace;

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::signing::SigningError;

/// Result alias used throughout the crate.
pub type SesResult<T> = Result<T, SesError>;

/// Broad grouping of [`SesError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Settings, credentials or role assumption parameters are unusable.
    Configuration,
    /// The outbound message could not be turned into a valid request.
    Message,
    /// The send itself failed: network, timeout or a service-side rejection.
    Transport,
}

#[derive(Debug, Error)]
pub enum SesError {
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Credential error: {message}")]
    Credential { message: String },

    #[error("Signing error: {message}")]
    Signing { message: String },

    /// A role ARN, external ID or session name failed validation.
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// An address contained forbidden characters or could not be parsed.
    #[error("Invalid address {address:?}: {message}")]
    InvalidAddress { address: String, message: String },

    /// The message could not be serialized to MIME.
    #[error("Message error: {message}")]
    Message { message: String },

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        retryable: bool,
    },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Account suspended: {message}")]
    AccountSuspended { message: String },

    #[error("Sending paused: {message}")]
    SendingPaused { message: String },

    #[error("Identity not verified: {identity}")]
    IdentityNotVerified { identity: String },

    #[error("Configuration set not found: {name}")]
    ConfigurationSetNotFound { name: String },

    /// The service rejected the request as malformed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("AWS API error: {code} - {message}")]
    AwsApi {
        code: String,
        message: String,
        request_id: Option<String>,
        retryable: bool,
    },

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl SesError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SesError::Configuration { .. }
            | SesError::Credential { .. }
            | SesError::Signing { .. }
            | SesError::InvalidParameter { .. } => ErrorClass::Configuration,
            SesError::InvalidAddress { .. } | SesError::Message { .. } => ErrorClass::Message,
            _ => ErrorClass::Transport,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.class() == ErrorClass::Configuration
    }

    pub fn is_transport_error(&self) -> bool {
        self.class() == ErrorClass::Transport
    }

    /// Whether a later attempt could succeed. The crate itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            SesError::Transport { retryable, .. } => *retryable,
            SesError::Timeout { .. } => true,
            SesError::RateLimited { .. } => true,
            SesError::AwsApi { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            SesError::AwsApi { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            SesError::AwsApi { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SesError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        SesError::Configuration {
            message: message.into(),
            source: None,
        }
    }
}

impl From<ConfigError> for SesError {
    fn from(err: ConfigError) -> Self {
        SesError::Configuration {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<CredentialError> for SesError {
    fn from(err: CredentialError) -> Self {
        SesError::Credential {
            message: err.to_string(),
        }
    }
}

impl From<SigningError> for SesError {
    fn from(err: SigningError) -> Self {
        SesError::Signing {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SesError {
    fn from(err: std::io::Error) -> Self {
        SesError::Transport {
            message: err.to_string(),
            source: Some(Box::new(err)),
            retryable: true,
        }
    }
}

impl From<serde_json::Error> for SesError {
    fn from(err: serde_json::Error) -> Self {
        SesError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for SesError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SesError::Timeout {
                message: err.to_string(),
            };
        }

        let retryable = err.is_connect()
            || err.status().map_or(false, |s| s.is_server_error());
        SesError::Transport {
            message: err.to_string(),
            source: Some(Box::new(err)),
            retryable,
        }
    }
}
