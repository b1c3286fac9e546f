//! Amazon SES mail backend.
//!
//! Sends framework-built mail messages through SES as raw MIME. The backend
//! resolves its AWS credentials exactly once when it is built:
//!
//! 1. base keys and region from [`MailerSettings`],
//! 2. temporary credentials from STS when a role ARN is configured,
//! 3. keys passed to the builder, which win over both.
//!
//! It then sends batches one message at a time. `pre_send` and `post_send`
//! [`signals`] fire around every message, and `fail_silently` decides whether
//! a failed delivery is reported or counted as "not sent".
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use integrations_ses_mailer::{EmailMessage, SesEmailBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // AWS_SES_REGION, AWS_SES_ROLE_ARN, ... from the environment
//!     let backend: SesEmailBackend = SesEmailBackend::from_env().await?;
//!
//!     let mut messages = vec![
//!         EmailMessage::new("Hello", "First", "app@example.com", ["a@example.com"]),
//!         EmailMessage::new("Hello", "Second", "app@example.com", ["b@example.com"]),
//!     ];
//!     let sent = backend.send_messages(&mut messages).await?;
//!     println!("sent {} of {}", sent, messages.len());
//!     Ok(())
//! }
//! ```
//!
//! # Hooks
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use integrations_ses_mailer::{EmailMessage, MailSignals, SesEmailBackend};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let signals = Arc::new(MailSignals::<EmailMessage>::new());
//! signals.pre_send.connect(|message: &mut EmailMessage| {
//!     message.to.retain(|addr| !addr.ends_with("@blocked.example"));
//! });
//! signals.post_send.connect(|_message: &EmailMessage, message_id: &str| {
//!     println!("SES message id {}", message_id);
//! });
//!
//! let backend: SesEmailBackend = SesEmailBackend::builder()
//!     .signals(signals.clone())
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `rustls-tls` (default) / `native-tls`: TLS backend for `reqwest`.
//! - `tracing` (default): structured logs through the `tracing` crate.

pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod message;
pub mod mocks;
pub mod signals;
pub mod signing;
pub mod transport;

pub use backend::{SesEmailBackend, SesEmailBackendBuilder};
pub use config::{ConfigError, MailerSettings, MailerSettingsBuilder};
pub use credentials::{
    AwsCredentials, CredentialProvider, CredentialResolver, CredentialSource,
    DefaultCredentialProvider, ExplicitCredentials, ResolvedCredentials, RoleAssumer,
    StsRoleAssumer,
};
pub use error::{ErrorClass, SesError, SesResult};
pub use message::{sanitize_address, Attachment, EmailMessage, LineEnding, OutboundMessage};
pub use signals::{MailSignals, Signal, Subscription};
pub use transport::{EmailTransport, SendRawEmailRequest, SendRawEmailResponse, SesTransport};
