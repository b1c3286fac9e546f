//! Temporary credentials through STS `AssumeRole`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::sync::Arc;

use super::{AwsCredentials, CredentialProvider, DefaultCredentialProvider, StaticCredentialProvider};
use crate::config::MailerSettings;
use crate::error::{SesError, SesResult};
use crate::http::{AwsHttpClient, AwsRequest, HttpOptions};
use crate::signing::STS_SERVICE;

pub const STS_API_VERSION: &str = "2011-06-15";

/// Prefix of generated role session names.
pub const SESSION_NAME_PREFIX: &str = "ses-mailer";

/// One role assumption. Built by the resolver, consumed once, then dropped.
#[derive(Debug, Clone)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub session_name: String,
    pub external_id: Option<String>,
    pub region: String,
    /// Keys to call STS with. `None` means the ambient credential chain.
    pub caller_credentials: Option<AwsCredentials>,
}

impl AssumeRoleRequest {
    /// Request with a fresh session name and no external ID.
    pub fn new(role_arn: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            session_name: session_name_now(),
            external_id: None,
            region: region.into(),
            caller_credentials: None,
        }
    }

    /// Attach an external ID. Empty values are dropped.
    pub fn with_external_id(mut self, external_id: Option<impl Into<String>>) -> Self {
        self.external_id = external_id.map(Into::into).filter(|id| !id.is_empty());
        self
    }

    /// Keys to sign the STS call with.
    pub fn with_caller_credentials(mut self, credentials: Option<AwsCredentials>) -> Self {
        self.caller_credentials = credentials;
        self
    }

    pub fn with_session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = session_name.into();
        self
    }

    /// Check the parameters against the STS `AssumeRole` constraints.
    pub fn validate(&self) -> SesResult<()> {
        let arn_len = self.role_arn.chars().count();
        if !(20..=2048).contains(&arn_len) || !self.role_arn.starts_with("arn:") {
            return Err(SesError::InvalidParameter {
                parameter: "RoleArn".to_string(),
                message: format!(
                    "{:?} is not a role ARN (expected 20 to 2048 characters starting with \"arn:\")",
                    self.role_arn
                ),
            });
        }

        if let Some(external_id) = &self.external_id {
            let len = external_id.chars().count();
            if !(2..=1224).contains(&len) || !external_id.chars().all(|c| is_sts_char(c, ":/")) {
                return Err(SesError::InvalidParameter {
                    parameter: "ExternalId".to_string(),
                    message: "external ID must be 2 to 1224 characters of [\\w+=,.@:/-]"
                        .to_string(),
                });
            }
        }

        let len = self.session_name.chars().count();
        if !(2..=64).contains(&len) || !self.session_name.chars().all(|c| is_sts_char(c, "")) {
            return Err(SesError::InvalidParameter {
                parameter: "RoleSessionName".to_string(),
                message: "session name must be 2 to 64 characters of [\\w+=,.@-]".to_string(),
            });
        }

        Ok(())
    }

    fn form_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![
            ("Action", "AssumeRole"),
            ("Version", STS_API_VERSION),
            ("RoleArn", self.role_arn.as_str()),
            ("RoleSessionName", self.session_name.as_str()),
        ];
        if let Some(external_id) = &self.external_id {
            params.push(("ExternalId", external_id.as_str()));
        }
        params
    }
}

fn is_sts_char(c: char, extra: &str) -> bool {
    c.is_ascii_alphanumeric() || "_+=,.@-".contains(c) || extra.contains(c)
}

/// `ses-mailer-<unix seconds>`.
pub fn session_name_now() -> String {
    format!("{}-{}", SESSION_NAME_PREFIX, Utc::now().timestamp())
}

/// Exchanges caller credentials for a role's temporary credentials.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    /// Exchange the request's caller credentials for temporary ones.
    ///
    /// # Errors
    ///
    /// Implementations return [`SesError::InvalidParameter`] without calling
    /// out when [`AssumeRoleRequest::validate`] fails.
    async fn assume_role(&self, request: &AssumeRoleRequest) -> SesResult<AwsCredentials>;
}

/// [`RoleAssumer`] backed by the STS Query API.
#[derive(Debug, Clone)]
pub struct StsRoleAssumer {
    endpoint: Option<String>,
    http: HttpOptions,
}

impl StsRoleAssumer {
    /// Uses the regional STS endpoint of each request.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            http: HttpOptions::default(),
        }
    }

    /// Uses the settings' STS endpoint and HTTP options.
    pub fn from_settings(settings: &MailerSettings) -> Self {
        Self {
            endpoint: Some(settings.sts_endpoint()),
            http: settings.http_options().clone(),
        }
    }

    /// Send every request to `endpoint` instead.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn client_for(&self, request: &AssumeRoleRequest) -> SesResult<AwsHttpClient> {
        let caller: Arc<dyn CredentialProvider> = match &request.caller_credentials {
            Some(credentials) => Arc::new(StaticCredentialProvider::new(credentials.clone())),
            None => Arc::new(DefaultCredentialProvider::new()),
        };

        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sts.{}.amazonaws.com", request.region));

        AwsHttpClient::new(endpoint, &request.region, STS_SERVICE, caller, &self.http)
    }
}

impl Default for StsRoleAssumer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> SesResult<AwsCredentials> {
        request.validate()?;

        let client = self.client_for(request)?;
        let response = client
            .send(AwsRequest::post("/").form(&request.form_params()))
            .await?;

        if !response.is_success() {
            return Err(response.into_xml_error());
        }

        let credentials = parse_assume_role_response(response.body_string()?)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            role_arn = %request.role_arn,
            session_name = %request.session_name,
            "assumed role for SES delivery"
        );

        Ok(credentials)
    }
}

/// Pull `Credentials` out of an `AssumeRoleResponse` document.
pub fn parse_assume_role_response(xml: &str) -> SesResult<AwsCredentials> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_credentials = false;
    let mut current_element = String::new();
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;
    let mut expiration = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current_element = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if current_element == "Credentials" {
                    in_credentials = true;
                }
            }
            Ok(Event::Text(e)) if in_credentials => {
                let text = e
                    .unescape()
                    .map_err(|e| SesError::Serialization {
                        message: format!("Invalid text in AssumeRole response: {}", e),
                    })?
                    .into_owned();
                match current_element.as_str() {
                    "AccessKeyId" => access_key_id = Some(text),
                    "SecretAccessKey" => secret_access_key = Some(text),
                    "SessionToken" => session_token = Some(text),
                    "Expiration" => expiration = DateTime::parse_from_rfc3339(&text).ok(),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Credentials" {
                    in_credentials = false;
                }
                current_element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SesError::Serialization {
                    message: format!("Invalid AssumeRole response: {}", e),
                })
            }
            _ => {}
        }
    }

    let (access_key_id, secret_access_key) = match (access_key_id, secret_access_key) {
        (Some(key), Some(secret)) => (key, secret),
        _ => {
            return Err(SesError::Serialization {
                message: "AssumeRole response did not contain credentials".to_string(),
            })
        }
    };

    let mut credentials = AwsCredentials::new(access_key_id, secret_access_key)
        .with_optional_session_token(session_token);
    if let Some(expiration) = expiration {
        credentials = credentials.with_expiration(expiration.with_timezone(&Utc));
    }
    Ok(credentials)
}
