//! Mapping of AWS error bodies onto [`SesError`].
//!
//! SES v2 answers with JSON:
//!
//! ```json
//! {
//!   "__type": "MessageRejected",
//!   "message": "Email address is not verified",
//!   "requestId": "abc-123-def-456"
//! }
//! ```
//!
//! STS answers with the Query API XML envelope:
//!
//! ```xml
//! <ErrorResponse>
//!   <Error><Type>Sender</Type><Code>ValidationError</Code><Message>...</Message></Error>
//!   <RequestId>...</RequestId>
//! </ErrorResponse>
//! ```

use super::SesError;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::time::Duration;

/// A parsed SES v2 JSON error body.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AwsErrorResponse {
    #[serde(default, alias = "__type", alias = "Type", alias = "code", alias = "Code")]
    pub error_type: String,

    #[serde(default, alias = "Message")]
    pub message: String,

    #[serde(default, alias = "requestId", alias = "RequestId")]
    pub request_id: Option<String>,
}

/// A parsed STS XML error body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StsErrorResponse {
    pub error_type: Option<String>,
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

pub fn parse_error_response(body: &str) -> Result<AwsErrorResponse, SesError> {
    let mut response: AwsErrorResponse = serde_json::from_str(body)?;
    response.error_type = strip_namespace(&response.error_type).to_string();
    Ok(response)
}

/// `com.amazon.coral.service#MessageRejected` and
/// `MessageRejected:http://internal.amazon.com/...` both become `MessageRejected`.
pub(crate) fn strip_namespace(error_type: &str) -> &str {
    let after_hash = error_type.rsplit('#').next().unwrap_or(error_type);
    after_hash.split(':').next().unwrap_or(after_hash)
}

pub fn map_aws_error(error: &AwsErrorResponse, status_code: u16) -> SesError {
    match error.error_type.as_str() {
        "Throttling" | "ThrottlingException" | "TooManyRequestsException" => {
            SesError::RateLimited {
                message: error.message.clone(),
                retry_after: calculate_retry_delay(status_code),
            }
        }

        "ValidationException" | "InvalidParameterException" | "InvalidParameterValueException"
        | "BadRequestException" => SesError::Validation {
            message: error.message.clone(),
            field: extract_field_from_message(&error.message),
        },

        "MailFromDomainNotVerifiedException" | "EmailAddressNotVerifiedException" => {
            SesError::IdentityNotVerified {
                identity: extract_identity_from_message(&error.message),
            }
        }

        "ConfigurationSetDoesNotExistException" => SesError::ConfigurationSetNotFound {
            name: extract_quoted(&error.message).unwrap_or_default(),
        },

        "NotFoundException" if error.message.to_lowercase().contains("configuration set") => {
            SesError::ConfigurationSetNotFound {
                name: extract_quoted(&error.message).unwrap_or_default(),
            }
        }

        "AccountSuspendedException" => SesError::AccountSuspended {
            message: error.message.clone(),
        },

        "SendingPausedException" => SesError::SendingPaused {
            message: error.message.clone(),
        },

        "InternalFailure" | "InternalServiceException" | "InternalServerException"
        | "ServiceUnavailable" | "ServiceUnavailableException" => SesError::AwsApi {
            code: error.error_type.clone(),
            message: error.message.clone(),
            request_id: error.request_id.clone(),
            retryable: true,
        },

        _ => SesError::AwsApi {
            code: error.error_type.clone(),
            message: error.message.clone(),
            request_id: error.request_id.clone(),
            retryable: is_retryable_status(status_code),
        },
    }
}

pub fn parse_sts_error_response(xml: &str) -> Result<StsErrorResponse, SesError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut response = StsErrorResponse::default();
    let mut current_element = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current_element = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| SesError::Serialization {
                        message: format!("Invalid text in STS error response: {}", e),
                    })?
                    .into_owned();
                match current_element.as_str() {
                    "Type" => response.error_type = Some(text),
                    "Code" => response.code = text,
                    "Message" => response.message = text,
                    "RequestId" => response.request_id = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current_element.clear(),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SesError::Serialization {
                    message: format!("Invalid STS error response: {}", e),
                })
            }
            _ => {}
        }
    }

    if response.code.is_empty() {
        return Err(SesError::Serialization {
            message: "STS error response has no error code".to_string(),
        });
    }

    Ok(response)
}

pub fn map_sts_error(error: &StsErrorResponse, status_code: u16) -> SesError {
    match error.code.as_str() {
        "ValidationError" | "MalformedPolicyDocument" | "PackedPolicyTooLarge"
        | "InvalidParameterValue" | "MissingParameter" => SesError::InvalidParameter {
            parameter: extract_field_from_message(&error.message)
                .unwrap_or_else(|| "AssumeRole".to_string()),
            message: error.message.clone(),
        },

        "AccessDenied" | "InvalidClientTokenId" | "ExpiredToken" | "SignatureDoesNotMatch"
        | "RegionDisabledException" => SesError::Credential {
            message: format!("{}: {}", error.code, error.message),
        },

        "Throttling" => SesError::RateLimited {
            message: error.message.clone(),
            retry_after: calculate_retry_delay(status_code),
        },

        _ => SesError::AwsApi {
            code: error.code.clone(),
            message: error.message.clone(),
            request_id: error.request_id.clone(),
            retryable: is_retryable_status(status_code),
        },
    }
}

fn extract_field_from_message(message: &str) -> Option<String> {
    // "Invalid value for parameter 'fieldName'" / "The field 'fieldName' is invalid"
    for marker in ["parameter '", "field '"] {
        if let Some(start) = message.find(marker) {
            let start = start + marker.len();
            if let Some(end) = message[start..].find('\'') {
                return Some(message[start..start + end].to_string());
            }
        }
    }

    // STS: "1 validation error detected: Value 'x' at 'roleArn' failed to satisfy constraint"
    if let Some(start) = message.find("at '") {
        let start = start + "at '".len();
        if let Some(end) = message[start..].find('\'') {
            return Some(message[start..start + end].to_string());
        }
    }

    None
}

fn extract_quoted(message: &str) -> Option<String> {
    let start = message.find(['\'', '"'])? + 1;
    let end = message[start..].find(['\'', '"'])?;
    Some(message[start..start + end].to_string())
}

fn extract_identity_from_message(message: &str) -> String {
    message
        .split_whitespace()
        .find(|word| word.contains('@') || (word.contains('.') && !word.ends_with('.')))
        .map(|word| {
            word.trim_matches(|c: char| {
                !c.is_alphanumeric() && c != '@' && c != '.' && c != '-'
            })
            .to_string()
        })
        .unwrap_or_else(|| message.to_string())
}

fn is_retryable_status(status_code: u16) -> bool {
    matches!(status_code, 500..=599 | 408 | 429)
}

fn calculate_retry_delay(status_code: u16) -> Option<Duration> {
    match status_code {
        429 => Some(Duration::from_secs(60)),
        503 => Some(Duration::from_secs(30)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_response_with_namespace() {
        let json = r#"{
            "__type": "com.amazon.coral.service#MessageRejected",
            "message": "Email not verified",
            "requestId": "abc-123-def"
        }"#;
        let result = parse_error_response(json).unwrap();

        assert_eq!(result.error_type, "MessageRejected");
        assert_eq!(result.message, "Email not verified");
        assert_eq!(result.request_id.as_deref(), Some("abc-123-def"));
    }

    #[test]
    fn test_parse_error_response_message_only() {
        let result = parse_error_response(r#"{"message": "Bad"}"#).unwrap();
        assert_eq!(result.error_type, "");
        assert_eq!(result.message, "Bad");
    }

    #[test]
    fn test_strip_namespace() {
        assert_eq!(strip_namespace("MessageRejected"), "MessageRejected");
        assert_eq!(
            strip_namespace("NotFoundException:http://internal.amazon.com/coral/"),
            "NotFoundException"
        );
    }

    #[test]
    fn test_map_throttling_error() {
        let error = AwsErrorResponse {
            error_type: "TooManyRequestsException".to_string(),
            message: "Rate exceeded".to_string(),
            request_id: Some("req-123".to_string()),
        };

        let result = map_aws_error(&error, 429);
        assert!(matches!(result, SesError::RateLimited { .. }));
        assert_eq!(result.retry_after(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_map_validation_error() {
        let error = AwsErrorResponse {
            error_type: "BadRequestException".to_string(),
            message: "Invalid parameter 'FromEmailAddress'".to_string(),
            request_id: None,
        };

        match map_aws_error(&error, 400) {
            SesError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("FromEmailAddress"));
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_map_message_rejected_is_not_retryable() {
        let error = AwsErrorResponse {
            error_type: "MessageRejected".to_string(),
            message: "Email address is not verified.".to_string(),
            request_id: Some("req-456".to_string()),
        };

        let result = map_aws_error(&error, 400);
        assert_eq!(result.error_code(), Some("MessageRejected"));
        assert_eq!(result.request_id(), Some("req-456"));
        assert!(!result.is_retryable());
    }

    #[test]
    fn test_map_identity_not_verified() {
        let error = AwsErrorResponse {
            error_type: "MailFromDomainNotVerifiedException".to_string(),
            message: "Domain example.com is not verified".to_string(),
            request_id: None,
        };

        match map_aws_error(&error, 400) {
            SesError::IdentityNotVerified { identity } => assert_eq!(identity, "example.com"),
            other => panic!("Expected IdentityNotVerified error, got {:?}", other),
        }
    }

    #[test]
    fn test_map_configuration_set_not_found() {
        let error = AwsErrorResponse {
            error_type: "NotFoundException".to_string(),
            message: "Configuration set 'tracking' does not exist.".to_string(),
            request_id: None,
        };

        match map_aws_error(&error, 404) {
            SesError::ConfigurationSetNotFound { name } => assert_eq!(name, "tracking"),
            other => panic!("Expected ConfigurationSetNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_map_unknown_server_error_is_retryable() {
        let error = AwsErrorResponse {
            error_type: "Weird".to_string(),
            message: "?".to_string(),
            request_id: None,
        };
        assert!(map_aws_error(&error, 502).is_retryable());
        assert!(!map_aws_error(&error, 400).is_retryable());
    }

    #[test]
    fn test_parse_sts_error_response() {
        let xml = r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>ValidationError</Code>
    <Message>1 validation error detected: Value 'bad' at 'roleArn' failed to satisfy constraint: Member must have length greater than or equal to 20</Message>
  </Error>
  <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
</ErrorResponse>"#;

        let parsed = parse_sts_error_response(xml).unwrap();
        assert_eq!(parsed.error_type.as_deref(), Some("Sender"));
        assert_eq!(parsed.code, "ValidationError");
        assert_eq!(
            parsed.request_id.as_deref(),
            Some("c6104cbe-af31-11e0-8154-cbc7ccf896c7")
        );

        match map_sts_error(&parsed, 400) {
            SesError::InvalidParameter { parameter, .. } => assert_eq!(parameter, "roleArn"),
            other => panic!("Expected InvalidParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_map_sts_access_denied() {
        let error = StsErrorResponse {
            error_type: Some("Sender".to_string()),
            code: "AccessDenied".to_string(),
            message: "User is not authorized to perform: sts:AssumeRole".to_string(),
            request_id: None,
        };

        let mapped = map_sts_error(&error, 403);
        assert!(matches!(mapped, SesError::Credential { .. }));
        assert!(mapped.is_configuration_error());
    }

    #[test]
    fn test_parse_sts_error_without_code() {
        assert!(parse_sts_error_response("<html>oops</html>").is_err());
    }

    #[test]
    fn test_parse_sts_error_with_bad_entity() {
        let xml = "<ErrorResponse><Error><Code>AccessDenied</Code><Message>&nope;</Message></Error></ErrorResponse>";
        let err = parse_sts_error_response(xml).unwrap_err();
        assert!(matches!(err, SesError::Serialization { .. }));
    }
}
