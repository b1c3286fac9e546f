//! Delivery of serialized messages.
//!
//! [`EmailTransport`] is the seam between the dispatcher and the network. The
//! production implementation is [`SesTransport`]; tests inject
//! `MockEmailTransport` from [`crate::mocks`].

mod ses;

pub use ses::{SesTransport, SEND_EMAIL_PATH};

use async_trait::async_trait;

use crate::error::SesResult;

/// One raw message ready for the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRawEmailRequest {
    /// Sanitized sender address.
    pub source: String,
    /// Sanitized envelope recipients, Bcc included.
    pub destinations: Vec<String>,
    /// The full MIME message with CRLF line endings.
    pub raw_message: Vec<u8>,
    /// Sent as `ConfigurationSetName` when present.
    pub configuration_set_name: Option<String>,
}

impl SendRawEmailRequest {
    /// Create a request without a configuration set.
    ///
    /// # Arguments
    ///
    /// * `source` - Sender address
    /// * `destinations` - Every envelope recipient
    /// * `raw_message` - The serialized MIME message
    pub fn new(source: impl Into<String>, destinations: Vec<String>, raw_message: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            destinations,
            raw_message,
            configuration_set_name: None,
        }
    }

    /// Set or clear the configuration set.
    pub fn with_configuration_set_name(mut self, name: Option<impl Into<String>>) -> Self {
        self.configuration_set_name = name.map(Into::into);
        self
    }
}

/// What the service returned for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRawEmailResponse {
    /// Service-assigned message id, handed to `post_send` receivers.
    pub message_id: String,
}

/// Sends a raw message. One call is one attempt.
///
/// Implementations must be shareable across tasks; the backend holds one
/// behind an `Arc` and clones of the backend share it.
///
/// # Example
///
/// ```
/// use integrations_ses_mailer::mocks::MockEmailTransport;
/// use integrations_ses_mailer::{EmailTransport, SendRawEmailRequest};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = MockEmailTransport::new().with_message_id("ses-0001");
///
/// let request = SendRawEmailRequest::new(
///     "app@example.com",
///     vec!["user@example.com".to_string()],
///     b"Subject: hi\r\n\r\nbody\r\n".to_vec(),
/// )
/// .with_configuration_set_name(Some("transactional"));
///
/// let response = transport.send_raw_email(request).await?;
/// assert_eq!(response.message_id, "ses-0001");
/// assert_eq!(transport.request_count(), 1);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Any [`crate::SesError`] from signing, the network or the service.
    async fn send_raw_email(&self, request: SendRawEmailRequest) -> SesResult<SendRawEmailResponse>;
}
