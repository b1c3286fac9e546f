//! Test doubles for the transport and role-assumption seams.
//!
//! Both mocks record what they were asked to do so tests can assert on the
//! exact requests a backend produced.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::credentials::{AssumeRoleRequest, AwsCredentials, RoleAssumer};
use crate::error::{SesError, SesResult};
use crate::transport::{EmailTransport, SendRawEmailRequest, SendRawEmailResponse};

/// Transport that answers from a queue and records every request.
///
/// When the queue is empty each send succeeds with a generated message id
/// (`mock-message-1`, `mock-message-2`, ...).
#[derive(Default)]
pub struct MockEmailTransport {
    results: Mutex<VecDeque<SesResult<SendRawEmailResponse>>>,
    requests: Mutex<Vec<SendRawEmailRequest>>,
    generated: AtomicUsize,
}

impl MockEmailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a success with this message id.
    pub fn with_message_id(self, message_id: impl Into<String>) -> Self {
        self.push_result(Ok(SendRawEmailResponse {
            message_id: message_id.into(),
        }));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: SesError) -> Self {
        self.push_result(Err(error));
        self
    }

    /// Queue an outcome after construction.
    pub fn push_result(&self, result: SesResult<SendRawEmailResponse>) {
        self.results.lock().push_back(result);
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<SendRawEmailRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<SendRawEmailRequest> {
        self.requests.lock().last().cloned()
    }
}

impl fmt::Debug for MockEmailTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockEmailTransport")
            .field("queued", &self.results.lock().len())
            .field("requests", &self.request_count())
            .finish()
    }
}

#[async_trait]
impl EmailTransport for MockEmailTransport {
    async fn send_raw_email(&self, request: SendRawEmailRequest) -> SesResult<SendRawEmailResponse> {
        self.requests.lock().push(request);

        let queued = self.results.lock().pop_front();
        queued.unwrap_or_else(|| {
            let n = self.generated.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SendRawEmailResponse {
                message_id: format!("mock-message-{}", n),
            })
        })
    }
}

type ErrorFactory = Box<dyn Fn() -> SesError + Send + Sync>;

/// Role assumer with a scripted outcome.
///
/// Requests are recorded, then validated the same way [`crate::credentials::StsRoleAssumer`]
/// validates them before calling STS, so malformed parameters fail here too.
pub struct MockRoleAssumer {
    credentials: AwsCredentials,
    error: Option<ErrorFactory>,
    requests: Mutex<Vec<AssumeRoleRequest>>,
}

impl MockRoleAssumer {
    /// Succeeds with [`fixtures::role_credentials`].
    pub fn new() -> Self {
        Self::returning(fixtures::role_credentials())
    }

    /// Succeeds with `credentials`.
    pub fn returning(credentials: AwsCredentials) -> Self {
        Self {
            credentials,
            error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call with an error built by `error`.
    pub fn failing<F>(error: F) -> Self
    where
        F: Fn() -> SesError + Send + Sync + 'static,
    {
        Self {
            credentials: fixtures::role_credentials(),
            error: Some(Box::new(error)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<AssumeRoleRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MockRoleAssumer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockRoleAssumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRoleAssumer")
            .field("fails", &self.error.is_some())
            .field("requests", &self.request_count())
            .finish()
    }
}

#[async_trait]
impl RoleAssumer for MockRoleAssumer {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> SesResult<AwsCredentials> {
        self.requests.lock().push(request.clone());
        request.validate()?;

        match &self.error {
            Some(error) => Err(error()),
            None => Ok(self.credentials.clone()),
        }
    }
}

/// Ready-made values shared by unit and integration tests.
pub mod fixtures {
    use crate::config::MailerSettings;
    use crate::credentials::AwsCredentials;
    use crate::message::EmailMessage;

    /// Well-formed role ARN accepted by the mock and real assumers.
    pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/ses-sender";

    /// Base keys, `eu-west-1` and the `transactional` configuration set.
    pub fn settings() -> MailerSettings {
        MailerSettings::builder()
            .access_key_id("AKIDEXAMPLE")
            .secret_access_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
            .region("eu-west-1")
            .configuration_set_name("transactional")
            .build()
            .unwrap_or_default()
    }

    /// The key pair in [`settings`], without a session token.
    pub fn base_credentials() -> AwsCredentials {
        AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    /// What [`MockRoleAssumer::new`](super::MockRoleAssumer::new) hands out.
    pub fn role_credentials() -> AwsCredentials {
        AwsCredentials::new("ASIAMOCKROLE", "mock-role-secret").with_session_token("mock-role-token")
    }

    /// A plain-text message from `sender@example.com` to one recipient.
    pub fn message() -> EmailMessage {
        EmailMessage::new(
            "Fixture subject",
            "Fixture body",
            "Sender <sender@example.com>",
            ["recipient@example.com"],
        )
    }

    /// `count` messages to `recipient-<n>@example.com`.
    pub fn batch(count: usize) -> Vec<EmailMessage> {
        (1..=count)
            .map(|n| {
                let mut message = message();
                message.to = vec![format!("recipient-{}@example.com", n)];
                message
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_queue_then_generated_ids() {
        let transport = MockEmailTransport::new()
            .with_message_id("first")
            .with_error(SesError::Unknown {
                message: "boom".to_string(),
            });
        let request = SendRawEmailRequest::new("a@example.com", vec!["b@example.com".to_string()], vec![]);

        assert_eq!(
            transport.send_raw_email(request.clone()).await.unwrap().message_id,
            "first"
        );
        assert!(transport.send_raw_email(request.clone()).await.is_err());
        assert_eq!(
            transport.send_raw_email(request).await.unwrap().message_id,
            "mock-message-1"
        );
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_role_assumer_validates() {
        let assumer = MockRoleAssumer::new();
        let err = assumer
            .assume_role(&AssumeRoleRequest::new("bogus", "us-east-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, SesError::InvalidParameter { .. }));
        assert_eq!(assumer.request_count(), 1);
    }
}
