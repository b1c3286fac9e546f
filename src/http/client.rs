//! Signing HTTP client shared by the SES transport and the STS role assumer.

use chrono::Utc;
use http::header::{HeaderValue, CONTENT_TYPE, HOST, USER_AGENT};
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::credentials::CredentialProvider;
use crate::error::{SesError, SesResult};
use crate::signing::{sign_request, SigningParams};

use super::request::AwsRequest;
use super::response::AwsResponse;
use super::HttpOptions;

/// Signs each request for one service and sends it exactly once.
#[derive(Clone)]
pub struct AwsHttpClient {
    http: reqwest::Client,
    endpoint: String,
    host: String,
    region: String,
    service: &'static str,
    credentials: Arc<dyn CredentialProvider>,
    user_agent: Option<String>,
}

impl AwsHttpClient {
    /// Create a client for one endpoint, region and signing service.
    ///
    /// # Errors
    ///
    /// Returns [`SesError::Configuration`] if the endpoint has no host or the
    /// underlying `reqwest` client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        service: &'static str,
        credentials: Arc<dyn CredentialProvider>,
        options: &HttpOptions,
    ) -> SesResult<Self> {
        let endpoint = endpoint.into();
        let host = extract_host(&endpoint)?;

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| SesError::Configuration {
                message: format!("Failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            endpoint,
            host,
            region: region.into(),
            service,
            credentials,
            user_agent: options.user_agent.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Service name used in the credential scope, e.g. `ses`.
    pub fn service(&self) -> &str {
        self.service
    }

    /// Sign and send. Non-2xx responses are returned as-is for the caller to map.
    pub async fn send(&self, request: AwsRequest) -> SesResult<AwsResponse> {
        let request = self.build_request(&request).await?;
        let response = self.http.execute(request).await?;
        AwsResponse::from_reqwest(response).await
    }

    async fn build_request(&self, aws_request: &AwsRequest) -> SesResult<reqwest::Request> {
        let credentials = self.credentials.credentials().await.map_err(|e| {
            SesError::Credential {
                message: format!("Failed to get credentials: {}", e),
            }
        })?;

        let url = Url::parse(&aws_request.build_url(&self.endpoint)).map_err(|e| {
            SesError::configuration(format!("Invalid request URL: {}", e))
        })?;

        let mut request = reqwest::Request::new(aws_request.method().into(), url);
        let headers = request.headers_mut();

        headers.insert(HOST, header_value("host", &self.host)?);
        if let Some(content_type) = aws_request.content_type() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if let Some(user_agent) = &self.user_agent {
            headers.insert(USER_AGENT, header_value("user-agent", user_agent)?);
        }

        let params = SigningParams::from_credentials(&credentials, &self.region, self.service);
        sign_request(
            aws_request.method().as_str(),
            aws_request.path(),
            aws_request.query_params(),
            request.headers_mut(),
            aws_request.body(),
            &params,
            &Utc::now(),
        )?;

        if let Some(body) = aws_request.body() {
            *request.body_mut() = Some(body.to_vec().into());
        }

        Ok(request)
    }
}

impl fmt::Debug for AwsHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsHttpClient")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

fn header_value(name: &str, value: &str) -> SesResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| SesError::configuration(format!("Invalid {} header: {}", name, e)))
}

/// Host header value for an endpoint, keeping a non-default port.
fn extract_host(endpoint: &str) -> SesResult<String> {
    let url = Url::parse(endpoint)
        .map_err(|e| SesError::configuration(format!("Invalid endpoint URL: {}", e)))?;

    let host = url
        .host_str()
        .ok_or_else(|| SesError::configuration("Endpoint URL has no host"))?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{AwsCredentials, StaticCredentialProvider};
    use crate::signing::SES_SERVICE;

    fn client(endpoint: &str) -> SesResult<AwsHttpClient> {
        AwsHttpClient::new(
            endpoint,
            "us-east-1",
            SES_SERVICE,
            Arc::new(StaticCredentialProvider::new(
                AwsCredentials::new("AKID", "SECRET").with_session_token("TOKEN"),
            )),
            &HttpOptions::default(),
        )
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(
            extract_host("https://email.us-east-1.amazonaws.com").unwrap(),
            "email.us-east-1.amazonaws.com"
        );
        assert_eq!(extract_host("http://127.0.0.1:8080").unwrap(), "127.0.0.1:8080");
        assert!(extract_host("not a url").is_err());
    }

    #[tokio::test]
    async fn test_build_request_is_signed() {
        let client = client("https://email.us-east-1.amazonaws.com").unwrap();
        let request = AwsRequest::post("/v2/email/outbound-emails")
            .json(&serde_json::json!({"k": "v"}))
            .unwrap();

        let built = client.build_request(&request).await.unwrap();

        assert_eq!(built.method(), reqwest::Method::POST);
        assert_eq!(
            built.url().as_str(),
            "https://email.us-east-1.amazonaws.com/v2/email/outbound-emails"
        );
        let headers = built.headers();
        assert_eq!(headers["host"], "email.us-east-1.amazonaws.com");
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-amz-security-token"], "TOKEN");
        assert!(headers["authorization"]
            .to_str()
            .unwrap()
            .contains("Credential=AKID/"));
        assert!(built.body().is_some());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let debug = format!("{:?}", client("https://email.us-east-1.amazonaws.com").unwrap());
        assert!(debug.contains("email.us-east-1.amazonaws.com"));
        assert!(!debug.contains("SECRET"));
    }
}
