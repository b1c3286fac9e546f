//! Mail backend settings.
//!
//! [`MailerSettings`] is the single, explicit configuration record read by the
//! credential resolver and the dispatcher. It can be built by hand or layered
//! from a key/value source such as the process environment:
//!
//! | setting                  | keys (later wins)                                      |
//! |--------------------------|--------------------------------------------------------|
//! | access key id            | `AWS_ACCESS_KEY_ID`, `AWS_SES_ACCESS_KEY_ID`           |
//! | secret access key        | `AWS_SECRET_ACCESS_KEY`, `AWS_SES_SECRET_ACCESS_KEY`   |
//! | region                   | `AWS_DEFAULT_REGION`, `AWS_SES_REGION`                 |
//! | configuration set        | `AWS_SES_CONFIGURATION_SET_NAME`                       |
//! | role ARN / external ID   | `AWS_SES_ROLE_ARN` / `AWS_SES_EXTERNAL_ID`             |
//! | endpoint overrides       | `AWS_SES_ENDPOINT` / `AWS_SES_STS_ENDPOINT`            |
//!
//! ```
//! use integrations_ses_mailer::config::MailerSettings;
//! use std::collections::HashMap;
//!
//! let source: HashMap<&str, &str> = [
//!     ("AWS_DEFAULT_REGION", "eu-west-1"),
//!     ("AWS_SES_REGION", "eu-central-1"),
//! ]
//! .into_iter()
//! .collect();
//!
//! let settings = MailerSettings::from_source(|key| source.get(key).map(|v| v.to_string())).unwrap();
//! assert_eq!(settings.region(), "eu-central-1");
//! assert_eq!(settings.ses_endpoint(), "https://email.eu-central-1.amazonaws.com");
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use url::Url;

pub mod error;

pub use error::ConfigError;

use crate::credentials::AwsCredentials;
use crate::http::HttpOptions;

/// Region used when neither `AWS_DEFAULT_REGION` nor `AWS_SES_REGION` is set.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Generic access key id; overridden by [`AWS_SES_ACCESS_KEY_ID`].
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Generic secret access key; overridden by [`AWS_SES_SECRET_ACCESS_KEY`].
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Generic region; overridden by [`AWS_SES_REGION`].
pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const AWS_SES_ACCESS_KEY_ID: &str = "AWS_SES_ACCESS_KEY_ID";
pub const AWS_SES_SECRET_ACCESS_KEY: &str = "AWS_SES_SECRET_ACCESS_KEY";
pub const AWS_SES_REGION: &str = "AWS_SES_REGION";
/// Configuration set attached to every send.
pub const AWS_SES_CONFIGURATION_SET_NAME: &str = "AWS_SES_CONFIGURATION_SET_NAME";
/// Role assumed through STS before the transport is built.
pub const AWS_SES_ROLE_ARN: &str = "AWS_SES_ROLE_ARN";
/// External ID passed along with [`AWS_SES_ROLE_ARN`].
pub const AWS_SES_EXTERNAL_ID: &str = "AWS_SES_EXTERNAL_ID";
/// SES endpoint override, e.g. a local stand-in.
pub const AWS_SES_ENDPOINT: &str = "AWS_SES_ENDPOINT";
/// STS endpoint override.
pub const AWS_SES_STS_ENDPOINT: &str = "AWS_SES_STS_ENDPOINT";

/// Settings for one mail backend.
///
/// Built once, then read-only. The secret key is held in a [`SecretString`]
/// and redacted from `Debug` output, as is the external ID.
///
/// # Example
///
/// ```
/// use integrations_ses_mailer::config::MailerSettings;
///
/// let settings = MailerSettings::builder()
///     .access_key_id("AKIDEXAMPLE")
///     .secret_access_key("secret")
///     .region("eu-west-1")
///     .configuration_set_name("transactional")
///     .role_arn("arn:aws:iam::123456789012:role/ses-sender")
///     .build()?;
///
/// assert_eq!(settings.region(), "eu-west-1");
/// assert!(settings.base_credentials().is_some());
/// # Ok::<(), integrations_ses_mailer::ConfigError>(())
/// ```
#[derive(Clone)]
pub struct MailerSettings {
    access_key_id: Option<String>,
    secret_access_key: Option<SecretString>,
    region: String,
    configuration_set_name: Option<String>,
    role_arn: Option<String>,
    external_id: Option<String>,
    fail_silently: bool,
    endpoint: Option<String>,
    sts_endpoint: Option<String>,
    http: HttpOptions,
}

impl MailerSettings {
    /// Create a new settings builder.
    ///
    /// Every field is optional; an empty builder yields the defaults
    /// (`us-east-1`, no keys, no role, not fail-silently).
    pub fn builder() -> MailerSettingsBuilder {
        MailerSettingsBuilder::default()
    }

    /// Layer settings from the process environment.
    ///
    /// Equivalent to [`MailerSettings::from_source`] over `std::env::var`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for half a key pair or a malformed
    /// endpoint override.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use integrations_ses_mailer::config::MailerSettings;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let settings = MailerSettings::from_env()?;
    /// println!("sending through {}", settings.ses_endpoint());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Layer settings from any key/value lookup.
    ///
    /// SES-specific keys win over the generic AWS ones, and empty values count
    /// as unset, so `AWS_SES_REGION=""` falls back to `AWS_DEFAULT_REGION`.
    ///
    /// # Arguments
    ///
    /// * `lookup` - Returns the value for a key, or `None` when it is unset
    ///
    /// # Errors
    ///
    /// Same as [`MailerSettingsBuilder::build`].
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let layered = |generic: &str, specific: &str| get(specific).or_else(|| get(generic));

        let mut builder = Self::builder();

        if let Some(key) = layered(AWS_ACCESS_KEY_ID, AWS_SES_ACCESS_KEY_ID) {
            builder = builder.access_key_id(key);
        }
        if let Some(secret) = layered(AWS_SECRET_ACCESS_KEY, AWS_SES_SECRET_ACCESS_KEY) {
            builder = builder.secret_access_key(secret);
        }
        if let Some(region) = layered(AWS_DEFAULT_REGION, AWS_SES_REGION) {
            builder = builder.region(region);
        }
        if let Some(name) = get(AWS_SES_CONFIGURATION_SET_NAME) {
            builder = builder.configuration_set_name(name);
        }
        if let Some(arn) = get(AWS_SES_ROLE_ARN) {
            builder = builder.role_arn(arn);
        }
        if let Some(external_id) = get(AWS_SES_EXTERNAL_ID) {
            builder = builder.external_id(external_id);
        }
        if let Some(endpoint) = get(AWS_SES_ENDPOINT) {
            builder = builder.endpoint(endpoint);
        }
        if let Some(endpoint) = get(AWS_SES_STS_ENDPOINT) {
            builder = builder.sts_endpoint(endpoint);
        }

        builder.build()
    }

    /// Base access key id, if configured.
    pub fn access_key_id(&self) -> Option<&str> {
        self.access_key_id.as_deref()
    }

    /// Base secret access key, if configured.
    pub fn secret_access_key(&self) -> Option<&str> {
        self.secret_access_key.as_ref().map(|s| s.expose_secret().as_str())
    }

    /// The static key pair from settings, when both halves are present.
    ///
    /// These are the keys STS is called with when a role is configured.
    pub fn base_credentials(&self) -> Option<AwsCredentials> {
        match (self.access_key_id(), self.secret_access_key()) {
            (Some(key), Some(secret)) => Some(AwsCredentials::new(key, secret)),
            _ => None,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Configuration set attached to every send request.
    pub fn configuration_set_name(&self) -> Option<&str> {
        self.configuration_set_name.as_deref()
    }

    /// Role to assume before the transport is built.
    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    /// Whether per-message transport errors are swallowed by default.
    ///
    /// The backend builder may override this.
    pub fn fail_silently(&self) -> bool {
        self.fail_silently
    }

    /// Get the SES endpoint URL.
    ///
    /// Returns the override if one was configured, otherwise the regional
    /// endpoint.
    ///
    /// # Example
    ///
    /// ```
    /// use integrations_ses_mailer::config::MailerSettings;
    ///
    /// let settings = MailerSettings::builder().region("us-west-2").build().unwrap();
    /// assert_eq!(settings.ses_endpoint(), "https://email.us-west-2.amazonaws.com");
    /// ```
    pub fn ses_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://email.{}.amazonaws.com", self.region))
    }

    /// Get the STS endpoint URL, the override or `https://sts.{region}.amazonaws.com`.
    pub fn sts_endpoint(&self) -> String {
        self.sts_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sts.{}.amazonaws.com", self.region))
    }

    /// Timeouts and user agent shared by the SES and STS clients.
    pub fn http_options(&self) -> &HttpOptions {
        &self.http
    }
}

impl Default for MailerSettings {
    fn default() -> Self {
        Self {
            access_key_id: None,
            secret_access_key: None,
            region: DEFAULT_REGION.to_string(),
            configuration_set_name: None,
            role_arn: None,
            external_id: None,
            fail_silently: false,
            endpoint: None,
            sts_endpoint: None,
            http: HttpOptions::default(),
        }
    }
}

impl fmt::Debug for MailerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerSettings")
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("region", &self.region)
            .field("configuration_set_name", &self.configuration_set_name)
            .field("role_arn", &self.role_arn)
            .field("external_id", &self.external_id.as_ref().map(|_| "[REDACTED]"))
            .field("fail_silently", &self.fail_silently)
            .field("endpoint", &self.endpoint)
            .field("sts_endpoint", &self.sts_endpoint)
            .field("http", &self.http)
            .finish()
    }
}

/// Builder for [`MailerSettings`].
///
/// Empty strings are treated as unset, matching how
/// [`MailerSettings::from_source`] reads the environment.
#[derive(Default)]
pub struct MailerSettingsBuilder {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    region: Option<String>,
    configuration_set_name: Option<String>,
    role_arn: Option<String>,
    external_id: Option<String>,
    fail_silently: bool,
    endpoint: Option<String>,
    sts_endpoint: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl MailerSettingsBuilder {
    /// Set the base access key id. Must be paired with
    /// [`secret_access_key`](Self::secret_access_key).
    pub fn access_key_id(mut self, access_key_id: impl Into<String>) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self
    }

    /// Set the base secret access key.
    pub fn secret_access_key(mut self, secret_access_key: impl Into<String>) -> Self {
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Set the AWS region (e.g., "eu-west-1"). Defaults to [`DEFAULT_REGION`].
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the configuration set attached to every send.
    pub fn configuration_set_name(mut self, name: impl Into<String>) -> Self {
        self.configuration_set_name = Some(name.into());
        self
    }

    /// Assume this role through STS when the backend is built.
    ///
    /// The ARN is validated only at that point, so a malformed value fails
    /// backend construction rather than this builder.
    pub fn role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }

    /// External ID for the role assumption. Ignored without a role ARN.
    pub fn external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn fail_silently(mut self, fail_silently: bool) -> Self {
        self.fail_silently = fail_silently;
        self
    }

    /// Override the SES endpoint, e.g. for a local stand-in.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Override the STS endpoint.
    pub fn sts_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.sts_endpoint = Some(endpoint.into());
        self
    }

    /// Set the whole-request timeout. Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout. Defaults to 10 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Validate and build the settings.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Invalid`] if only one half of the key pair is set
    /// - [`ConfigError::Invalid`] if an endpoint override is not a URL with a host
    /// - [`ConfigError::MissingField`] if the region is blank
    pub fn build(self) -> Result<MailerSettings, ConfigError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        let region = non_empty(self.region).unwrap_or_else(|| DEFAULT_REGION.to_string());
        if region.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "region".to_string(),
            });
        }

        let access_key_id = non_empty(self.access_key_id);
        let secret_access_key = non_empty(self.secret_access_key);
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(ConfigError::Invalid {
                message: "access key id and secret access key must be set together".to_string(),
            });
        }

        let endpoint = non_empty(self.endpoint);
        let sts_endpoint = non_empty(self.sts_endpoint);
        for endpoint in endpoint.iter().chain(sts_endpoint.iter()) {
            validate_endpoint(endpoint)?;
        }

        let defaults = HttpOptions::default();

        Ok(MailerSettings {
            access_key_id,
            secret_access_key: secret_access_key.map(SecretString::new),
            region,
            configuration_set_name: non_empty(self.configuration_set_name),
            role_arn: non_empty(self.role_arn),
            external_id: non_empty(self.external_id),
            fail_silently: self.fail_silently,
            endpoint,
            sts_endpoint,
            http: HttpOptions {
                timeout: self.timeout.unwrap_or(defaults.timeout),
                connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
                user_agent: self.user_agent,
            },
        })
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let url = Url::parse(endpoint).map_err(|e| ConfigError::Invalid {
        message: format!("endpoint {:?} is not a valid URL: {}", endpoint, e),
    })?;
    if url.host_str().is_none() {
        return Err(ConfigError::Invalid {
            message: format!("endpoint {:?} has no host", endpoint),
        });
    }
    Ok(())
}
