//! Credential handling for the SES mail backend.
//!
//! Two layers live here:
//!
//! - **Providers** (`CredentialProvider`): sources of AWS credentials used when a
//!   request is signed. `DefaultCredentialProvider` is the ambient chain
//!   (environment variables, then the shared profile files) used whenever the
//!   backend was not configured with explicit keys.
//! - **Resolution** (`CredentialResolver`): the one-shot computation, run when a
//!   backend is built, that turns settings, an optional role assumption and
//!   optional constructor overrides into the credentials held for the backend's
//!   lifetime.
//!
//! # Example
//!
//! ```no_run
//! use integrations_ses_mailer::credentials::{CredentialProvider, DefaultCredentialProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = DefaultCredentialProvider::new();
//! let credentials = provider.credentials().await?;
//! println!("Access Key: {}", credentials.access_key_id());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use zeroize::Zeroize;

pub mod chain;
pub mod env;
pub mod error;
pub mod profile;
pub mod resolver;
pub mod static_creds;
pub mod sts;

pub use chain::ChainCredentialProvider;
pub use env::EnvironmentCredentialProvider;
pub use error::CredentialError;
pub use profile::ProfileCredentialProvider;
pub use resolver::{CredentialResolver, CredentialSource, ExplicitCredentials, ResolvedCredentials};
pub use static_creds::StaticCredentialProvider;
pub use sts::{AssumeRoleRequest, RoleAssumer, StsRoleAssumer};

/// An AWS access key pair with an optional session token.
///
/// The secret key is kept in a [`SecretString`]; the access key id and session
/// token are wiped when the value is dropped.
#[derive(Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: SecretString,
    session_token: Option<String>,
    expiration: Option<DateTime<Utc>>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::new(secret_access_key.into()),
            session_token: None,
            expiration: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Set or clear the session token.
    pub fn with_optional_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token;
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        self.secret_access_key.expose_secret()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn expiration(&self) -> Option<&DateTime<Utc>> {
        self.expiration.as_ref()
    }

    /// `false` for credentials without an expiration.
    pub fn is_expired(&self) -> bool {
        self.expiration
            .map(|expiration| Utc::now() >= expiration)
            .unwrap_or(false)
    }
}

impl PartialEq for AwsCredentials {
    fn eq(&self, other: &Self) -> bool {
        self.access_key_id == other.access_key_id
            && self.secret_access_key() == other.secret_access_key()
            && self.session_token == other.session_token
            && self.expiration == other.expiration
    }
}

impl Eq for AwsCredentials {}

impl Drop for AwsCredentials {
    fn drop(&mut self) {
        self.access_key_id.zeroize();
        if let Some(token) = self.session_token.as_mut() {
            token.zeroize();
        }
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// A source of AWS credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialError>;
}

/// The ambient credential chain: environment variables, then profile files.
#[derive(Debug, Clone)]
pub struct DefaultCredentialProvider {
    inner: ChainCredentialProvider,
}

impl DefaultCredentialProvider {
    pub fn new() -> Self {
        let chain = ChainCredentialProvider::new()
            .with_provider(EnvironmentCredentialProvider::new())
            .with_provider(ProfileCredentialProvider::new());

        Self { inner: chain }
    }
}

impl Default for DefaultCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for DefaultCredentialProvider {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialError> {
        self.inner.credentials().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_credentials_new() {
        let creds = AwsCredentials::new("AKID", "SECRET");
        assert_eq!(creds.access_key_id(), "AKID");
        assert_eq!(creds.secret_access_key(), "SECRET");
        assert!(creds.session_token().is_none());
        assert!(creds.expiration().is_none());
    }

    #[test]
    fn test_optional_session_token() {
        let creds = AwsCredentials::new("AKID", "SECRET")
            .with_optional_session_token(Some("TOKEN".to_string()));
        assert_eq!(creds.session_token(), Some("TOKEN"));

        let creds = creds.with_optional_session_token(None);
        assert!(creds.session_token().is_none());
    }

    #[test]
    fn test_credentials_is_expired() {
        let expired = AwsCredentials::new("AKID", "SECRET")
            .with_expiration(Utc::now() - Duration::hours(1));
        assert!(expired.is_expired());

        let valid = AwsCredentials::new("AKID", "SECRET")
            .with_expiration(Utc::now() + Duration::hours(1));
        assert!(!valid.is_expired());

        assert!(!AwsCredentials::new("AKID", "SECRET").is_expired());
    }

    #[test]
    fn test_credentials_equality_includes_token() {
        let a = AwsCredentials::new("AKID", "SECRET").with_session_token("T1");
        let b = AwsCredentials::new("AKID", "SECRET").with_session_token("T1");
        let c = AwsCredentials::new("AKID", "SECRET");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = AwsCredentials::new("AKID", "SECRET").with_session_token("TOKEN");
        let debug = format!("{:?}", creds);

        assert!(debug.contains("AKID"));
        assert!(!debug.contains("SECRET"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("TOKEN"));
    }
}
