//! Canonical request pieces for Signature V4.

use http::HeaderMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeMap;

/// Unreserved characters plus `/`, used for paths.
const URI_PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Unreserved characters only, used for query strings and form bodies.
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode per RFC 3986; `encode_slash` is true for query components.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let set = if encode_slash { QUERY_SET } else { URI_PATH_SET };
    utf8_percent_encode(input, set).to_string()
}

/// Collapse `//`, `.` and `..` segments; always returns an absolute path.
pub fn normalize_uri_path(path: &str) -> String {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut result = format!("/{}", segments.join("/"));
    if path.ends_with('/') && result.len() > 1 {
        result.push('/');
    }
    result
}

pub fn canonical_query_string(query_params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = query_params
        .iter()
        .map(|(key, value)| (uri_encode(key, true), uri_encode(value, true)))
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Returns `(canonical_headers, signed_headers)`.
pub fn canonical_headers(headers: &HeaderMap) -> (String, String) {
    let mut header_map: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (name, value) in headers {
        let name = name.as_str().to_lowercase();
        if !should_sign_header(&name) {
            continue;
        }

        let value = value
            .to_str()
            .unwrap_or("")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        header_map.entry(name).or_default().push(value);
    }

    let canonical = header_map
        .iter()
        .map(|(name, values)| format!("{}:{}\n", name, values.join(",")))
        .collect::<String>();

    let signed = header_map.keys().cloned().collect::<Vec<_>>().join(";");

    (canonical, signed)
}

pub fn should_sign_header(header_name: &str) -> bool {
    let name = header_name.to_lowercase();
    name == "host"
        || name.starts_with("x-amz-")
        || matches!(name.as_str(), "content-type" | "content-md5")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("/v2/email/outbound-emails", false), "/v2/email/outbound-emails");
        assert_eq!(uri_encode("/foo bar/baz", false), "/foo%20bar/baz");
        assert_eq!(uri_encode("foo/bar", true), "foo%2Fbar");
        assert_eq!(
            uri_encode("arn:aws:iam::123456789012:role/mailer", true),
            "arn%3Aaws%3Aiam%3A%3A123456789012%3Arole%2Fmailer"
        );
    }

    #[test]
    fn test_normalize_uri_path() {
        assert_eq!(normalize_uri_path(""), "/");
        assert_eq!(normalize_uri_path("/"), "/");
        assert_eq!(normalize_uri_path("//"), "/");
        assert_eq!(normalize_uri_path("/foo//bar"), "/foo/bar");
        assert_eq!(normalize_uri_path("/foo/./bar"), "/foo/bar");
        assert_eq!(normalize_uri_path("/foo/../bar"), "/bar");
        assert_eq!(normalize_uri_path("foo/bar"), "/foo/bar");
        assert_eq!(normalize_uri_path("/foo/bar/"), "/foo/bar/");
    }

    #[test]
    fn test_canonical_query_string_sorted_and_encoded() {
        assert_eq!(canonical_query_string(&[]), "");

        let params = vec![
            ("Version".to_string(), "2011-06-15".to_string()),
            ("Action".to_string(), "Assume Role".to_string()),
        ];
        assert_eq!(
            canonical_query_string(&params),
            "Action=Assume%20Role&Version=2011-06-15"
        );
    }

    #[test]
    fn test_canonical_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Host", "sts.us-east-1.amazonaws.com".parse().unwrap());
        headers.insert("X-Amz-Date", "20231215T103045Z".parse().unwrap());
        headers.insert("Content-Type", "application/x-www-form-urlencoded".parse().unwrap());
        headers.insert("User-Agent", "test".parse().unwrap());

        let (canonical, signed) = canonical_headers(&headers);

        assert_eq!(
            canonical,
            "content-type:application/x-www-form-urlencoded\nhost:sts.us-east-1.amazonaws.com\nx-amz-date:20231215T103045Z\n"
        );
        assert_eq!(signed, "content-type;host;x-amz-date");
    }

    #[test]
    fn test_should_sign_header() {
        assert!(should_sign_header("Host"));
        assert!(should_sign_header("x-amz-security-token"));
        assert!(should_sign_header("Content-Type"));
        assert!(!should_sign_header("user-agent"));
        assert!(!should_sign_header("accept"));
    }
}
