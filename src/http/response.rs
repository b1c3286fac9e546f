//! Responses from AWS endpoints.

use http::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::error::{
    map_aws_error, map_sts_error, parse_error_response, parse_sts_error_response, SesError,
    SesResult,
};

#[derive(Debug, Clone)]
/// A fully buffered service response.
pub struct AwsResponse {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    request_id: Option<String>,
}

impl AwsResponse {
    pub fn new(status: StatusCode, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        let request_id = headers
            .get("x-amzn-requestid")
            .or_else(|| headers.get("x-amzn-request-id"))
            .or_else(|| headers.get("x-amz-request-id"))
            .cloned();

        Self {
            status,
            headers,
            body,
            request_id,
        }
    }

    /// Buffer a `reqwest` response, lower-casing header names.
    pub async fn from_reqwest(response: reqwest::Response) -> SesResult<Self> {
        let status = response.status();

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| SesError::Transport {
                message: format!("Failed to read response body: {}", e),
                source: Some(Box::new(e)),
                retryable: true,
            })?
            .to_vec();

        Ok(Self::new(status, headers, body))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Look up a header by its lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8.
    pub fn body_string(&self) -> SesResult<&str> {
        std::str::from_utf8(&self.body).map_err(|e| SesError::Serialization {
            message: format!("Response body is not valid UTF-8: {}", e),
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> SesResult<T> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }

    /// `x-amzn-requestid`, falling back to `x-amz-request-id`.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a JSON (SES v2) error response into an [`SesError`].
    pub fn into_json_error(self) -> SesError {
        let parsed = self
            .body_string()
            .ok()
            .and_then(|body| parse_error_response(body).ok());

        match parsed {
            Some(mut error) => {
                if error.error_type.is_empty() {
                    error.error_type = self
                        .header("x-amzn-errortype")
                        .map(|t| crate::error::strip_namespace(t).to_string())
                        .unwrap_or_else(|| self.status.as_u16().to_string());
                }
                if error.request_id.is_none() {
                    error.request_id = self.request_id.clone();
                }
                map_aws_error(&error, self.status.as_u16())
            }
            None => self.error_from_status_code(),
        }
    }

    /// Turn an XML (Query API) error response into an [`SesError`].
    pub fn into_xml_error(self) -> SesError {
        let parsed = self
            .body_string()
            .ok()
            .and_then(|body| parse_sts_error_response(body).ok());

        match parsed {
            Some(mut error) => {
                if error.request_id.is_none() {
                    error.request_id = self.request_id.clone();
                }
                map_sts_error(&error, self.status.as_u16())
            }
            None => self.error_from_status_code(),
        }
    }

    fn error_from_status_code(&self) -> SesError {
        let retryable =
            self.status.is_server_error() || self.status == StatusCode::TOO_MANY_REQUESTS;

        SesError::AwsApi {
            code: self.status.as_u16().to_string(),
            message: self.body_string().unwrap_or("Unknown error").to_string(),
            request_id: self.request_id.clone(),
            retryable,
        }
    }
}
