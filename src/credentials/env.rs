//! Credentials from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.

use super::{AwsCredentials, CredentialProvider};
use crate::credentials::error::CredentialError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const AWS_PROFILE: &str = "AWS_PROFILE";

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials from environment variables.
///
/// The variable lookup is swappable so callers can feed any key/value source.
#[derive(Clone)]
pub struct EnvironmentCredentialProvider {
    lookup: Lookup,
}

impl EnvironmentCredentialProvider {
    pub fn new() -> Self {
        Self::with_source(|key| std::env::var(key).ok())
    }

    /// Read variables through `lookup` instead of the process environment.
    pub fn with_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.is_empty())
    }
}

impl Default for EnvironmentCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvironmentCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentCredentialProvider").finish()
    }
}

#[async_trait]
impl CredentialProvider for EnvironmentCredentialProvider {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialError> {
        let access_key_id = self.var(AWS_ACCESS_KEY_ID).ok_or_else(|| CredentialError::Missing {
            message: format!("{} environment variable not set", AWS_ACCESS_KEY_ID),
        })?;

        let secret_access_key =
            self.var(AWS_SECRET_ACCESS_KEY)
                .ok_or_else(|| CredentialError::Missing {
                    message: format!("{} environment variable not set", AWS_SECRET_ACCESS_KEY),
                })?;

        Ok(AwsCredentials::new(access_key_id, secret_access_key)
            .with_optional_session_token(self.var(AWS_SESSION_TOKEN)))
    }
}
