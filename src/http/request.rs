//! Unsigned AWS API requests.

use serde::Serialize;

use crate::error::SesResult;
use crate::signing::uri_encode;

/// Body type for SES v2 calls.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Body type for Query API calls such as STS.
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

/// A request before endpoint resolution and signing.
#[derive(Debug, Clone)]
pub struct AwsRequest {
    method: HttpMethod,
    path: String,
    query_params: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    content_type: Option<&'static str>,
}

impl AwsRequest {
    /// Create a request with no query and no body.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query_params: Vec::new(),
            body: None,
            content_type: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Serialize `value` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SesError::Serialization`] if `value` cannot be serialized.
    pub fn json<T: Serialize>(mut self, value: &T) -> SesResult<Self> {
        self.body = Some(serde_json::to_vec(value)?);
        self.content_type = Some(CONTENT_TYPE_JSON);
        Ok(self)
    }

    /// Set an `application/x-www-form-urlencoded` body, keeping parameter order.
    pub fn form<K, V>(mut self, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k.as_ref(), true), uri_encode(v.as_ref(), true)))
            .collect::<Vec<_>>()
            .join("&");
        self.body = Some(body.into_bytes());
        self.content_type = Some(CONTENT_TYPE_FORM);
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query_params
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.content_type
    }

    /// Join the path and query onto an endpoint such as `https://email.us-east-1.amazonaws.com`.
    pub fn build_url(&self, endpoint: &str) -> String {
        let mut url = format!("{}{}", endpoint.trim_end_matches('/'), self.path);
        if !self.query_params.is_empty() {
            let query = self
                .query_params
                .iter()
                .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body() {
        let request = AwsRequest::post("/v2/email/outbound-emails")
            .json(&json!({"FromEmailAddress": "a@example.com"}))
            .unwrap();

        assert_eq!(request.method(), HttpMethod::Post);
        assert_eq!(request.content_type(), Some(CONTENT_TYPE_JSON));
        assert_eq!(request.body().unwrap(), br#"{"FromEmailAddress":"a@example.com"}"#);
    }

    #[test]
    fn test_form_body_keeps_order_and_encodes() {
        let request = AwsRequest::post("/").form(&[
            ("Action", "AssumeRole"),
            ("RoleArn", "arn:aws:iam::123456789012:role/x"),
        ]);

        assert_eq!(request.content_type(), Some(CONTENT_TYPE_FORM));
        assert_eq!(
            std::str::from_utf8(request.body().unwrap()).unwrap(),
            "Action=AssumeRole&RoleArn=arn%3Aaws%3Aiam%3A%3A123456789012%3Arole%2Fx"
        );
    }

    #[test]
    fn test_build_url() {
        let request = AwsRequest::get("/v2/email/account").query("a b", "c");
        assert_eq!(
            request.build_url("https://email.us-east-1.amazonaws.com/"),
            "https://email.us-east-1.amazonaws.com/v2/email/account?a%20b=c"
        );
    }
}
