//! SES v2 `SendEmail` with raw content.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{EmailTransport, SendRawEmailRequest, SendRawEmailResponse};
use crate::config::MailerSettings;
use crate::credentials::{
    CredentialProvider, DefaultCredentialProvider, ResolvedCredentials, StaticCredentialProvider,
};
use crate::error::{SesError, SesResult};
use crate::http::{AwsHttpClient, AwsRequest, HttpOptions};
use crate::signing::SES_SERVICE;

pub const SEND_EMAIL_PATH: &str = "/v2/email/outbound-emails";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OutboundEmail<'a> {
    from_email_address: &'a str,
    destination: Destination<'a>,
    content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    configuration_set_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Destination<'a> {
    to_addresses: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Content {
    raw: RawContent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RawContent {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OutboundEmailResponse {
    message_id: String,
}

impl<'a> OutboundEmail<'a> {
    /// Every envelope recipient goes into `ToAddresses`; the raw headers decide
    /// what the recipients see.
    fn from_request(request: &'a SendRawEmailRequest) -> Self {
        Self {
            from_email_address: &request.source,
            destination: Destination {
                to_addresses: &request.destinations,
            },
            content: Content {
                raw: RawContent {
                    data: BASE64.encode(&request.raw_message),
                },
            },
            configuration_set_name: request.configuration_set_name.as_deref(),
        }
    }
}

/// [`EmailTransport`] that signs with one fixed credential source.
#[derive(Clone)]
pub struct SesTransport {
    client: AwsHttpClient,
}

impl SesTransport {
    /// Create a transport for one endpoint and region.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SesError::Configuration`] if the endpoint is not a
    /// usable URL or the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        options: &HttpOptions,
    ) -> SesResult<Self> {
        Ok(Self {
            client: AwsHttpClient::new(endpoint, region, SES_SERVICE, credentials, options)?,
        })
    }

    /// Transport for a backend: the resolved keys, or the ambient chain when
    /// resolution produced none.
    pub fn from_resolved(settings: &MailerSettings, resolved: &ResolvedCredentials) -> SesResult<Self> {
        let credentials: Arc<dyn CredentialProvider> = match &resolved.credentials {
            Some(credentials) => Arc::new(StaticCredentialProvider::new(credentials.clone())),
            None => Arc::new(DefaultCredentialProvider::new()),
        };

        Self::new(
            settings.ses_endpoint(),
            &resolved.region,
            credentials,
            settings.http_options(),
        )
    }

    /// Base URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    pub fn region(&self) -> &str {
        self.client.region()
    }
}

impl fmt::Debug for SesTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SesTransport")
            .field("client", &self.client)
            .finish()
    }
}

#[async_trait]
impl EmailTransport for SesTransport {
    async fn send_raw_email(&self, request: SendRawEmailRequest) -> SesResult<SendRawEmailResponse> {
        let body = OutboundEmail::from_request(&request);
        let response = self
            .client
            .send(AwsRequest::post(SEND_EMAIL_PATH).json(&body)?)
            .await?;

        if !response.is_success() {
            return Err(response.into_json_error());
        }

        let parsed: OutboundEmailResponse =
            response.json().map_err(|e| SesError::Serialization {
                message: format!("Failed to deserialize SendEmail response: {}", e),
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            message_id = %parsed.message_id,
            request_id = ?response.request_id(),
            "SES accepted raw message"
        );

        Ok(SendRawEmailResponse {
            message_id: parsed.message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AwsCredentials;
    use serde_json::json;

    fn request() -> SendRawEmailRequest {
        SendRawEmailRequest::new(
            "sender@example.com",
            vec!["to@example.com".to_string(), "bcc@example.com".to_string()],
            b"Subject: hi\r\n\r\nbody\r\n".to_vec(),
        )
    }

    #[test]
    fn test_request_body_shape() {
        let request = request();
        let body = serde_json::to_value(OutboundEmail::from_request(&request)).unwrap();

        assert_eq!(
            body,
            json!({
                "FromEmailAddress": "sender@example.com",
                "Destination": {"ToAddresses": ["to@example.com", "bcc@example.com"]},
                "Content": {"Raw": {"Data": BASE64.encode(b"Subject: hi\r\n\r\nbody\r\n")}}
            })
        );
    }

    #[test]
    fn test_configuration_set_is_attached_when_present() {
        let request = request().with_configuration_set_name(Some("transactional"));
        let body = serde_json::to_value(OutboundEmail::from_request(&request)).unwrap();
        assert_eq!(body["ConfigurationSetName"], "transactional");
    }

    #[test]
    fn test_from_resolved_uses_settings_endpoint() {
        let settings = MailerSettings::builder()
            .region("eu-west-1")
            .endpoint("http://localhost:4566")
            .build()
            .unwrap();
        let resolved = ResolvedCredentials {
            credentials: Some(AwsCredentials::new("AKID", "SECRET")),
            region: "eu-west-1".to_string(),
            configuration_set_name: None,
            source: crate::credentials::CredentialSource::Settings,
        };

        let transport = SesTransport::from_resolved(&settings, &resolved).unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:4566");
        assert_eq!(transport.region(), "eu-west-1");
    }

    #[test]
    fn test_regional_endpoint_by_default() {
        let settings = MailerSettings::builder().region("ap-south-1").build().unwrap();
        let resolved = ResolvedCredentials {
            credentials: None,
            region: "ap-south-1".to_string(),
            configuration_set_name: None,
            source: crate::credentials::CredentialSource::Ambient,
        };

        let transport = SesTransport::from_resolved(&settings, &resolved).unwrap();
        assert_eq!(transport.endpoint(), "https://email.ap-south-1.amazonaws.com");
    }
}
