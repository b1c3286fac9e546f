//! The mail backend: resolves credentials once, then dispatches batches.
//!
//! A backend is built asynchronously because building may assume a role
//! through STS. After that its credentials never change; every message it
//! sends is signed with the same keys.
//!
//! # Example
//!
//! ```rust,no_run
//! use integrations_ses_mailer::{EmailMessage, MailerSettings, SesEmailBackend};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend: SesEmailBackend = SesEmailBackend::builder()
//!     .settings(MailerSettings::from_env()?)
//!     .fail_silently(true)
//!     .build()
//!     .await?;
//!
//! let mut batch = vec![EmailMessage::new(
//!     "Welcome",
//!     "Thanks for signing up.",
//!     "Support <support@example.com>",
//!     ["new-user@example.com"],
//! )];
//! let sent = backend.send_messages(&mut batch).await?;
//! println!("{} message(s) handed to SES", sent);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::config::MailerSettings;
use crate::credentials::{
    AwsCredentials, CredentialResolver, CredentialSource, ExplicitCredentials, ResolvedCredentials,
    RoleAssumer, StsRoleAssumer,
};
use crate::error::SesResult;
use crate::message::{sanitize_address, EmailMessage, LineEnding, OutboundMessage};
use crate::signals::MailSignals;
use crate::transport::{EmailTransport, SendRawEmailRequest, SesTransport};

/// Sends [`OutboundMessage`]s through SES as raw MIME.
///
/// Credentials, region and configuration set are fixed at construction;
/// every send afterwards reuses the same transport. Cloning is cheap and
/// clones share the transport and the hooks.
pub struct SesEmailBackend<M: OutboundMessage = EmailMessage> {
    transport: Arc<dyn EmailTransport>,
    resolved: ResolvedCredentials,
    fail_silently: bool,
    signals: Arc<MailSignals<M>>,
}

impl<M: OutboundMessage> SesEmailBackend<M> {
    /// Create a new backend builder.
    pub fn builder() -> SesEmailBackendBuilder<M> {
        SesEmailBackendBuilder::new()
    }

    /// Backend configured from the process environment.
    ///
    /// Shorthand for [`MailerSettings::from_env`] fed into the builder.
    pub async fn from_env() -> SesResult<Self> {
        Self::builder()
            .settings(MailerSettings::from_env()?)
            .build()
            .await
    }

    /// Send every message in order and return how many the service accepted.
    ///
    /// An empty batch returns `0` without firing any hook. The first error
    /// that is not swallowed aborts the batch; messages sent before it stay
    /// sent and later ones are not attempted.
    pub async fn send_messages(&self, messages: &mut [M]) -> SesResult<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        let mut sent = 0;
        for message in messages.iter_mut() {
            if self.send_message(message).await? {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Send one message.
    ///
    /// Returns `Ok(false)` when `pre_send` receivers leave the message without
    /// recipients, or when the transport fails and the backend is
    /// fail-silently. Address and serialization errors are always returned.
    pub async fn send_message(&self, message: &mut M) -> SesResult<bool> {
        self.signals.pre_send.send(message);

        let recipients = message.recipients();
        if recipients.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!("skipping message without recipients");
            return Ok(false);
        }

        let encoding = message.encoding().to_string();
        let source = sanitize_address(message.from_address(), &encoding)?;
        let destinations = recipients
            .iter()
            .map(|recipient| sanitize_address(recipient, &encoding))
            .collect::<SesResult<Vec<_>>>()?;
        let raw_message = message.serialize_raw(LineEnding::Crlf)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            recipients = destinations.len(),
            raw_size = raw_message.len(),
            configuration_set = ?self.resolved.configuration_set_name,
            "sending raw message"
        );

        let request = SendRawEmailRequest::new(source, destinations, raw_message)
            .with_configuration_set_name(self.resolved.configuration_set_name.clone());

        match self.transport.send_raw_email(request).await {
            Ok(response) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(message_id = %response.message_id, "message sent");

                self.signals.post_send.send(message, &response.message_id);
                Ok(true)
            }
            Err(error) if self.fail_silently => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %error, "send failed; suppressed by fail_silently");

                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    /// Keys every request is signed with; `None` means the ambient chain.
    pub fn credentials(&self) -> Option<&AwsCredentials> {
        self.resolved.credentials.as_ref()
    }

    /// Which layer the signing keys came from.
    pub fn credential_source(&self) -> CredentialSource {
        self.resolved.source
    }

    /// Region the transport sends to.
    pub fn region(&self) -> &str {
        &self.resolved.region
    }

    /// Configuration set attached to every send, if any.
    pub fn configuration_set_name(&self) -> Option<&str> {
        self.resolved.configuration_set_name.as_deref()
    }

    pub fn fail_silently(&self) -> bool {
        self.fail_silently
    }

    /// Hooks fired around every send; connect receivers here.
    pub fn signals(&self) -> &Arc<MailSignals<M>> {
        &self.signals
    }
}

impl<M: OutboundMessage> Clone for SesEmailBackend<M> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            resolved: self.resolved.clone(),
            fail_silently: self.fail_silently,
            signals: Arc::clone(&self.signals),
        }
    }
}

impl<M: OutboundMessage> fmt::Debug for SesEmailBackend<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SesEmailBackend")
            .field("region", &self.resolved.region)
            .field("credential_source", &self.resolved.source)
            .field("configuration_set_name", &self.resolved.configuration_set_name)
            .field("fail_silently", &self.fail_silently)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SesEmailBackend`].
///
/// Nothing touches the network until [`build`](Self::build).
pub struct SesEmailBackendBuilder<M: OutboundMessage = EmailMessage> {
    settings: Option<MailerSettings>,
    fail_silently: Option<bool>,
    explicit: ExplicitCredentials,
    signals: Option<Arc<MailSignals<M>>>,
    role_assumer: Option<Arc<dyn RoleAssumer>>,
    transport: Option<Arc<dyn EmailTransport>>,
}

impl<M: OutboundMessage> SesEmailBackendBuilder<M> {
    /// Create a builder with default settings and no overrides.
    pub fn new() -> Self {
        Self {
            settings: None,
            fail_silently: None,
            explicit: ExplicitCredentials::default(),
            signals: None,
            role_assumer: None,
            transport: None,
        }
    }

    /// Settings to resolve from. Defaults to [`MailerSettings::default`].
    pub fn settings(mut self, settings: MailerSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Overrides the settings' `fail_silently`.
    pub fn fail_silently(mut self, fail_silently: bool) -> Self {
        self.fail_silently = Some(fail_silently);
        self
    }

    /// Keys that take precedence over settings and role assumption.
    /// Ignored unless both are non-empty.
    pub fn credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.explicit.access_key_id = Some(access_key_id.into());
        self.explicit.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Session token sent alongside the explicit keys.
    pub fn session_token(mut self, session_token: impl Into<String>) -> Self {
        self.explicit.session_token = Some(session_token.into());
        self
    }

    /// Hooks shared with other backends. A fresh set is created otherwise.
    pub fn signals(mut self, signals: Arc<MailSignals<M>>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Replaces the STS client used when a role ARN is configured.
    pub fn role_assumer(mut self, role_assumer: Arc<dyn RoleAssumer>) -> Self {
        self.role_assumer = Some(role_assumer);
        self
    }

    /// Replaces the SES transport built from the resolved credentials.
    pub fn transport(mut self, transport: Arc<dyn EmailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Resolve credentials and create the backend.
    ///
    /// When the settings carry a role ARN this calls STS once; the temporary
    /// credentials are reused for the backend's lifetime.
    ///
    /// # Errors
    ///
    /// Role assumption failures and unusable endpoints are returned here and
    /// are never subject to `fail_silently`.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use integrations_ses_mailer::mocks::{fixtures, MockEmailTransport, MockRoleAssumer};
    /// use integrations_ses_mailer::{CredentialSource, MailerSettings, SesEmailBackend};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let settings = MailerSettings::builder()
    ///     .region("eu-west-1")
    ///     .access_key_id("AKIDEXAMPLE")
    ///     .secret_access_key("secret")
    ///     .role_arn(fixtures::ROLE_ARN)
    ///     .build()?;
    ///
    /// let backend: SesEmailBackend = SesEmailBackend::builder()
    ///     .settings(settings)
    ///     .role_assumer(Arc::new(MockRoleAssumer::new()))
    ///     .transport(Arc::new(MockEmailTransport::new()))
    ///     .build()
    ///     .await?;
    ///
    /// assert_eq!(backend.credential_source(), CredentialSource::AssumedRole);
    /// assert_eq!(backend.region(), "eu-west-1");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn build(self) -> SesResult<SesEmailBackend<M>> {
        let settings = self.settings.unwrap_or_default();
        let fail_silently = self.fail_silently.unwrap_or_else(|| settings.fail_silently());

        let role_assumer = self
            .role_assumer
            .unwrap_or_else(|| Arc::new(StsRoleAssumer::from_settings(&settings)));
        let resolved = CredentialResolver::new(role_assumer)
            .resolve(&settings, &self.explicit)
            .await?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(SesTransport::from_resolved(&settings, &resolved)?),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            region = %resolved.region,
            credential_source = ?resolved.source,
            fail_silently,
            "SES backend ready"
        );

        Ok(SesEmailBackend {
            transport,
            resolved,
            fail_silently,
            signals: self.signals.unwrap_or_default(),
        })
    }
}

impl<M: OutboundMessage> Default for SesEmailBackendBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: OutboundMessage> fmt::Debug for SesEmailBackendBuilder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SesEmailBackendBuilder")
            .field("settings", &self.settings)
            .field("fail_silently", &self.fail_silently)
            .field("explicit", &self.explicit)
            .finish_non_exhaustive()
    }
}
