//! HTTP plumbing for the AWS calls this crate makes.
//!
//! [`AwsHttpClient`] resolves the endpoint, signs with Signature V4 and sends
//! each request once through `reqwest`. There is no retry loop and no rate
//! limiting: a failed send surfaces immediately to the dispatcher, which
//! applies its fail-silently policy.

mod client;
mod request;
mod response;

pub use client::AwsHttpClient;
pub use request::{AwsRequest, HttpMethod, CONTENT_TYPE_FORM, CONTENT_TYPE_JSON};
pub use response::AwsResponse;

use std::time::Duration;

/// Whole-request timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Connection timeout when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings applied to every [`AwsHttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// Upper bound on one request, connect through body.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Replaces the default `reqwest` user agent.
    pub user_agent: Option<String>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: None,
        }
    }
}
