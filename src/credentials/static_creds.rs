//! Fixed credentials, used for resolved keys and in tests.

use super::{AwsCredentials, CredentialProvider};
use crate::credentials::error::CredentialError;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: AwsCredentials,
}

impl StaticCredentialProvider {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialError> {
        if self.credentials.is_expired() {
            return Err(CredentialError::Expired);
        }
        Ok(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_static_provider_returns_credentials() {
        let provider = StaticCredentialProvider::new(
            AwsCredentials::new("AKID", "SECRET").with_session_token("TOKEN"),
        );

        let retrieved = provider.credentials().await.unwrap();
        assert_eq!(retrieved.access_key_id(), "AKID");
        assert_eq!(retrieved.secret_access_key(), "SECRET");
        assert_eq!(retrieved.session_token(), Some("TOKEN"));
    }

    #[tokio::test]
    async fn test_static_provider_expired_credentials() {
        let expired = AwsCredentials::new("AKID", "SECRET")
            .with_expiration(Utc::now() - Duration::hours(1));
        let provider = StaticCredentialProvider::new(expired);

        let result = provider.credentials().await;
        assert!(matches!(result, Err(CredentialError::Expired)));
    }
}
