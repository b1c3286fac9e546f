//! Tries a list of credential providers in order.

use super::{AwsCredentials, CredentialProvider};
use crate::credentials::error::CredentialError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// The first provider that yields credentials wins; otherwise the last error is returned.
#[derive(Clone, Default)]
pub struct ChainCredentialProvider {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl ChainCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider<P>(mut self, provider: P) -> Self
    where
        P: CredentialProvider + 'static,
    {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

#[async_trait]
impl CredentialProvider for ChainCredentialProvider {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialError> {
        let mut last_error = None;

        for provider in &self.providers {
            match provider.credentials().await {
                Ok(credentials) => return Ok(credentials),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| CredentialError::Missing {
            message: "No credential providers configured in chain".to_string(),
        }))
    }
}

impl fmt::Debug for ChainCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainCredentialProvider")
            .field("provider_count", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{EnvironmentCredentialProvider, StaticCredentialProvider};

    fn empty_env() -> EnvironmentCredentialProvider {
        EnvironmentCredentialProvider::with_source(|_| None)
    }

    #[tokio::test]
    async fn test_chain_empty() {
        let result = ChainCredentialProvider::new().credentials().await;
        assert!(matches!(result, Err(CredentialError::Missing { .. })));
    }

    #[tokio::test]
    async fn test_chain_first_succeeds() {
        let chain = ChainCredentialProvider::new()
            .with_provider(StaticCredentialProvider::new(AwsCredentials::new("AKID1", "S1")))
            .with_provider(StaticCredentialProvider::new(AwsCredentials::new("AKID2", "S2")));

        assert_eq!(chain.provider_count(), 2);
        let creds = chain.credentials().await.unwrap();
        assert_eq!(creds.access_key_id(), "AKID1");
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_next() {
        let chain = ChainCredentialProvider::new()
            .with_provider(empty_env())
            .with_provider(StaticCredentialProvider::new(AwsCredentials::new("AKID2", "S2")));

        let creds = chain.credentials().await.unwrap();
        assert_eq!(creds.access_key_id(), "AKID2");
    }

    #[tokio::test]
    async fn test_chain_all_fail_returns_last_error() {
        let chain = ChainCredentialProvider::new()
            .with_provider(empty_env())
            .with_provider(empty_env());

        let result = chain.credentials().await;
        assert!(matches!(result, Err(CredentialError::Missing { .. })));
    }
}
