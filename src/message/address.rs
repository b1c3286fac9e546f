//! Mailbox parsing and header-safe address formatting.

use encoding_rs::Encoding;

use super::charset;
use super::encoder::encode_words;
use crate::error::{SesError, SesResult};

/// Characters that force a display name into a quoted string.
const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

/// A parsed `display-name <local@domain>` or bare `local@domain`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mailbox {
    display_name: String,
    local_part: String,
    domain: String,
}

/// Make an address safe to use in headers and as an envelope address.
///
/// `encoding` is the charset label of the message. Non-ASCII display names
/// and local parts become RFC 2047 encoded words in that charset; a non-ASCII
/// domain is converted to its IDNA form. Well-formed ASCII input is returned
/// unchanged.
///
/// ```rust
/// use integrations_ses_mailer::message::sanitize_address;
///
/// assert_eq!(
///     sanitize_address("Jane Doe <jane@example.com>", "utf-8").unwrap(),
///     "Jane Doe <jane@example.com>"
/// );
/// assert_eq!(
///     sanitize_address("info@bücher.de", "utf-8").unwrap(),
///     "info@xn--bcher-kva.de"
/// );
/// assert!(sanitize_address("jane@example.com\r\nBcc: x@evil.test", "utf-8").is_err());
/// ```
pub fn sanitize_address(address: &str, encoding: &str) -> SesResult<String> {
    sanitize_with(address, charset(encoding)?)
}

pub(super) fn sanitize_with(address: &str, charset: &'static Encoding) -> SesResult<String> {
    if address.contains(['\r', '\n']) {
        return Err(invalid(address, "address parts cannot contain newlines"));
    }

    let mailbox = Mailbox::parse(address)?;

    let display_name = if mailbox.display_name.is_ascii() {
        mailbox.display_name
    } else {
        encode_words(&mailbox.display_name, charset)?
    };
    let local_part = if mailbox.local_part.is_ascii() {
        mailbox.local_part
    } else {
        encode_words(&mailbox.local_part, charset)?
    };
    let domain = if mailbox.domain.is_ascii() {
        mailbox.domain
    } else {
        idna_domain(&mailbox.domain).ok_or_else(|| invalid(address, "domain cannot be encoded"))?
    };

    let addr_spec = format!("{}@{}", local_part, domain);
    Ok(if display_name.is_empty() {
        addr_spec
    } else if display_name.contains(SPECIALS) {
        let quoted = display_name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\" <{}>", quoted, addr_spec)
    } else {
        format!("{} <{}>", display_name, addr_spec)
    })
}

/// Domain of a mailbox, in IDNA form. Used for generated Message-IDs.
pub(super) fn mailbox_domain(address: &str) -> Option<String> {
    let mailbox = Mailbox::parse(address).ok()?;
    if mailbox.domain.is_ascii() {
        Some(mailbox.domain)
    } else {
        idna_domain(&mailbox.domain)
    }
}

/// Split a header value holding several addresses on commas that are not
/// inside quotes or angle brackets.
pub(super) fn split_address_list(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                parts.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

impl Mailbox {
    fn parse(input: &str) -> SesResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "address is empty"));
        }

        let Some(open) = find_unquoted(trimmed, '<') else {
            let (local_part, domain) = split_addr_spec(input, trimmed)?;
            return Ok(Self {
                display_name: String::new(),
                local_part,
                domain,
            });
        };

        let after = &trimmed[open + 1..];
        let close = after
            .find('>')
            .ok_or_else(|| invalid(input, "missing closing '>'"))?;
        let rest = after[close + 1..].trim();
        if !rest.is_empty() {
            let parsed = &trimmed[..open + close + 2];
            return Err(invalid(
                input,
                &format!("only {:?} could be parsed", parsed),
            ));
        }

        let display_name = parse_phrase(input, trimmed[..open].trim())?;
        let (local_part, domain) = split_addr_spec(input, after[..close].trim())?;
        Ok(Self {
            display_name,
            local_part,
            domain,
        })
    }
}

/// Display name, unquoted and with whitespace runs collapsed.
fn parse_phrase(input: &str, phrase: &str) -> SesResult<String> {
    if phrase.len() >= 2 && phrase.starts_with('"') && phrase.ends_with('"') {
        let inner = &phrase[1..phrase.len() - 1];
        let mut name = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(next) => name.push(next),
                    None => return Err(invalid(input, "unterminated escape in display name")),
                },
                '"' => return Err(invalid(input, "unescaped quote in display name")),
                _ => name.push(c),
            }
        }
        return Ok(name);
    }

    if phrase.contains(['"', ',', ';', ':', '@', '<', '>', '[', ']', '\\']) {
        return Err(invalid(input, "display name contains special characters"));
    }
    Ok(phrase.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn split_addr_spec(input: &str, spec: &str) -> SesResult<(String, String)> {
    if spec.is_empty() {
        return Err(invalid(input, "address is empty"));
    }

    let (local_part, domain) = if spec.starts_with('"') {
        let end = closing_quote(spec).ok_or_else(|| invalid(input, "unterminated quoted local part"))?;
        let domain = spec[end + 1..]
            .strip_prefix('@')
            .ok_or_else(|| invalid(input, "missing '@'"))?;
        (&spec[..=end], domain)
    } else {
        let (local_part, domain) = spec
            .split_once('@')
            .ok_or_else(|| invalid(input, "missing '@'"))?;
        if local_part.is_empty()
            || local_part
                .chars()
                .any(|c| c.is_whitespace() || "()<>[]:;@\\,\"".contains(c))
        {
            return Err(invalid(input, "invalid local part"));
        }
        (local_part, domain)
    };

    let literal = domain.starts_with('[') && domain.ends_with(']');
    if domain.is_empty()
        || (!literal
            && domain
                .chars()
                .any(|c| c.is_whitespace() || "()<>[]:;@\\,\"".contains(c)))
    {
        return Err(invalid(input, "invalid domain"));
    }

    Ok((local_part.to_string(), domain.to_string()))
}

/// Byte offset of the quote closing the quoted string that opens `s`.
fn closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}

fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            _ if c == target && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn idna_domain(domain: &str) -> Option<String> {
    match url::Host::parse(domain).ok()? {
        url::Host::Domain(ascii) => Some(ascii),
        _ => None,
    }
}

fn invalid(address: &str, message: &str) -> SesError {
    SesError::InvalidAddress {
        address: address.to_string(),
        message: message.to_string(),
    }
}
