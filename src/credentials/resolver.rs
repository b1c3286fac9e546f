//! One-shot credential resolution for a mail backend.
//!
//! Precedence, applied in this order and never reordered:
//!
//! 1. Base keys and region from [`MailerSettings`].
//! 2. If a role ARN is set, the role's temporary credentials. STS is called
//!    with the base keys from step 1 (or the ambient chain when there are
//!    none), never with the constructor overrides.
//! 3. [`ExplicitCredentials`] from the backend constructor, when both the
//!    access key and the secret are non-empty.

use std::fmt;
use std::sync::Arc;

use super::sts::{AssumeRoleRequest, RoleAssumer};
use super::AwsCredentials;
use crate::config::MailerSettings;
use crate::error::SesResult;

/// Keys handed directly to the backend constructor.
///
/// Half a pair, or a pair with an empty half, is ignored rather than
/// rejected.
#[derive(Clone, Default)]
pub struct ExplicitCredentials {
    /// Override access key id.
    pub access_key_id: Option<String>,
    /// Override secret access key.
    pub secret_access_key: Option<String>,
    /// Optional session token; only used with a complete pair.
    pub session_token: Option<String>,
}

impl ExplicitCredentials {
    /// Create an override pair without a session token.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: Some(access_key_id.into()),
            secret_access_key: Some(secret_access_key.into()),
            session_token: None,
        }
    }

    /// Attach a session token to the override pair.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// The override pair, if it is complete.
    pub fn credentials(&self) -> Option<AwsCredentials> {
        match (self.access_key_id.as_deref(), self.secret_access_key.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => Some(
                AwsCredentials::new(key, secret).with_optional_session_token(
                    self.session_token.clone().filter(|t| !t.is_empty()),
                ),
            ),
            _ => None,
        }
    }
}

impl fmt::Debug for ExplicitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplicitCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "[REDACTED]"))
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Where the final credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Nothing configured; requests are signed from the ambient chain.
    Ambient,
    /// Base keys from [`MailerSettings`].
    Settings,
    /// Temporary credentials from STS for the configured role.
    AssumedRole,
    /// Keys passed to the backend builder.
    Explicit,
}

/// The credentials, region and configuration set a backend uses for every send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    /// `None` means sign with the ambient credential chain.
    pub credentials: Option<AwsCredentials>,
    /// Always the settings' region.
    pub region: String,
    pub configuration_set_name: Option<String>,
    pub source: CredentialSource,
}

/// Runs the precedence rules once per backend construction.
#[derive(Clone)]
pub struct CredentialResolver {
    role_assumer: Arc<dyn RoleAssumer>,
}

impl CredentialResolver {
    /// Create a resolver that assumes roles through `role_assumer`.
    pub fn new(role_assumer: Arc<dyn RoleAssumer>) -> Self {
        Self { role_assumer }
    }

    /// Resolve the backend's credentials.
    ///
    /// # Arguments
    ///
    /// * `settings` - Base keys, region, configuration set and role
    /// * `explicit` - Constructor overrides, applied last
    ///
    /// # Errors
    ///
    /// Role assumption failures (malformed ARN or external ID, or STS refusing
    /// the exchange) are returned unchanged; construction cannot continue.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use integrations_ses_mailer::mocks::{fixtures, MockRoleAssumer};
    /// use integrations_ses_mailer::{
    ///     CredentialResolver, CredentialSource, ExplicitCredentials, MailerSettings,
    /// };
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let settings = MailerSettings::builder()
    ///     .access_key_id("AKIDEXAMPLE")
    ///     .secret_access_key("secret")
    ///     .role_arn(fixtures::ROLE_ARN)
    ///     .build()?;
    /// let resolver = CredentialResolver::new(Arc::new(MockRoleAssumer::new()));
    ///
    /// let resolved = resolver.resolve(&settings, &ExplicitCredentials::default()).await?;
    /// assert_eq!(resolved.source, CredentialSource::AssumedRole);
    ///
    /// let overridden = resolver
    ///     .resolve(&settings, &ExplicitCredentials::new("AKIDOVERRIDE", "override"))
    ///     .await?;
    /// assert_eq!(overridden.source, CredentialSource::Explicit);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn resolve(
        &self,
        settings: &MailerSettings,
        explicit: &ExplicitCredentials,
    ) -> SesResult<ResolvedCredentials> {
        let base = settings.base_credentials();
        let mut source = if base.is_some() {
            CredentialSource::Settings
        } else {
            CredentialSource::Ambient
        };
        let mut credentials = base.clone();

        if let Some(role_arn) = settings.role_arn() {
            let request = AssumeRoleRequest::new(role_arn, settings.region())
                .with_external_id(settings.external_id())
                .with_caller_credentials(base);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                role_arn = %request.role_arn,
                session_name = %request.session_name,
                has_external_id = request.external_id.is_some(),
                "assuming role before building SES transport"
            );

            credentials = Some(self.role_assumer.assume_role(&request).await?);
            source = CredentialSource::AssumedRole;
        }

        if let Some(overrides) = explicit.credentials() {
            credentials = Some(overrides);
            source = CredentialSource::Explicit;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            source = ?source,
            region = %settings.region(),
            configuration_set = ?settings.configuration_set_name(),
            "resolved SES credentials"
        );

        Ok(ResolvedCredentials {
            credentials,
            region: settings.region().to_string(),
            configuration_set_name: settings.configuration_set_name().map(str::to_string),
            source,
        })
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SesError;
    use crate::mocks::MockRoleAssumer;

    const ROLE: &str = "arn:aws:iam::123456789012:role/mailer";

    fn role_credentials() -> AwsCredentials {
        AwsCredentials::new("ASIAROLE", "role-secret").with_session_token("role-token")
    }

    #[tokio::test]
    async fn test_no_role_no_override_uses_settings_exactly() {
        let assumer = Arc::new(MockRoleAssumer::new());
        let settings = MailerSettings::builder()
            .access_key_id("AKIDBASE")
            .secret_access_key("base-secret")
            .build()
            .unwrap();

        let resolved = CredentialResolver::new(assumer.clone())
            .resolve(&settings, &ExplicitCredentials::default())
            .await
            .unwrap();

        assert_eq!(
            resolved.credentials,
            Some(AwsCredentials::new("AKIDBASE", "base-secret"))
        );
        assert_eq!(resolved.region, "us-east-1");
        assert_eq!(resolved.source, CredentialSource::Settings);
        assert_eq!(assumer.request_count(), 0);
    }

    #[tokio::test]
    async fn test_nothing_configured_means_ambient() {
        let resolved = CredentialResolver::new(Arc::new(MockRoleAssumer::new()))
            .resolve(&MailerSettings::default(), &ExplicitCredentials::default())
            .await
            .unwrap();

        assert!(resolved.credentials.is_none());
        assert_eq!(resolved.source, CredentialSource::Ambient);
    }

    #[tokio::test]
    async fn test_role_uses_base_credentials_and_replaces_them() {
        let assumer = Arc::new(MockRoleAssumer::returning(role_credentials()));
        let settings = MailerSettings::builder()
            .access_key_id("AKIDBASE")
            .secret_access_key("base-secret")
            .region("eu-west-1")
            .role_arn(ROLE)
            .external_id("tenant-42")
            .build()
            .unwrap();

        let resolved = CredentialResolver::new(assumer.clone())
            .resolve(&settings, &ExplicitCredentials::default())
            .await
            .unwrap();

        assert_eq!(resolved.credentials, Some(role_credentials()));
        assert_eq!(resolved.source, CredentialSource::AssumedRole);

        let requests = assumer.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].role_arn, ROLE);
        assert_eq!(requests[0].region, "eu-west-1");
        assert_eq!(requests[0].external_id.as_deref(), Some("tenant-42"));
        assert!(requests[0].session_name.starts_with("ses-mailer-"));
        assert_eq!(
            requests[0].caller_credentials,
            Some(AwsCredentials::new("AKIDBASE", "base-secret"))
        );
    }

    #[tokio::test]
    async fn test_role_is_assumed_with_base_not_override() {
        let assumer = Arc::new(MockRoleAssumer::returning(role_credentials()));
        let settings = MailerSettings::builder().role_arn(ROLE).build().unwrap();
        let explicit = ExplicitCredentials::new("AKIDOVERRIDE", "override-secret");

        let resolved = CredentialResolver::new(assumer.clone())
            .resolve(&settings, &explicit)
            .await
            .unwrap();

        assert!(assumer.requests()[0].caller_credentials.is_none());
        assert_eq!(
            resolved.credentials,
            Some(AwsCredentials::new("AKIDOVERRIDE", "override-secret"))
        );
        assert_eq!(resolved.source, CredentialSource::Explicit);
    }

    #[tokio::test]
    async fn test_role_failure_propagates() {
        let assumer = Arc::new(MockRoleAssumer::failing(|| SesError::InvalidParameter {
            parameter: "RoleArn".to_string(),
            message: "malformed".to_string(),
        }));
        let settings = MailerSettings::builder().role_arn(ROLE).build().unwrap();

        let err = CredentialResolver::new(assumer)
            .resolve(&settings, &ExplicitCredentials::new("A", "B"))
            .await
            .unwrap_err();
        assert!(matches!(err, SesError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_incomplete_override_is_ignored() {
        let settings = MailerSettings::builder()
            .access_key_id("AKIDBASE")
            .secret_access_key("base-secret")
            .build()
            .unwrap();
        let explicit = ExplicitCredentials {
            access_key_id: Some("AKIDOVERRIDE".to_string()),
            secret_access_key: Some(String::new()),
            session_token: Some("tok".to_string()),
        };

        let resolved = CredentialResolver::new(Arc::new(MockRoleAssumer::new()))
            .resolve(&settings, &explicit)
            .await
            .unwrap();

        assert_eq!(
            resolved.credentials,
            Some(AwsCredentials::new("AKIDBASE", "base-secret"))
        );
    }

    #[tokio::test]
    async fn test_override_carries_session_token() {
        let resolved = CredentialResolver::new(Arc::new(MockRoleAssumer::new()))
            .resolve(
                &MailerSettings::default(),
                &ExplicitCredentials::new("AKID", "SECRET").with_session_token("TOKEN"),
            )
            .await
            .unwrap();

        let creds = resolved.credentials.unwrap();
        assert_eq!(creds.session_token(), Some("TOKEN"));
    }
}
