//! RFC 5322 / MIME serialization of [`EmailMessage`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use uuid::Uuid;

use super::address::{mailbox_domain, sanitize_with, split_address_list};
use super::{charset_name, encode_text, Attachment, EmailMessage, LineEnding};
use crate::error::{SesError, SesResult};

/// Longest line allowed in a 7bit body, excluding the CRLF.
const MAX_LINE_LENGTH: usize = 998;

/// Longest RFC 2047 encoded word.
const MAX_ENCODED_WORD: usize = 75;

/// Headers written from message fields unless an extra header replaces them.
const GENERATED_HEADERS: [&str; 6] = ["from", "to", "cc", "reply-to", "date", "message-id"];

/// RFC 2231 `attribute-char`.
const ATTRIBUTE_CHARS: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferEncoding {
    SevenBit,
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    fn header_value(&self) -> &'static str {
        match self {
            TransferEncoding::SevenBit => "7bit",
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Base64 => "base64",
        }
    }
}

/// Writes one message. Output is built with CRLF and converted at the end.
pub(super) struct MimeWriter {
    date: DateTime<Utc>,
    charset: &'static Encoding,
    output: Vec<u8>,
}

impl MimeWriter {
    pub(super) fn new(charset: &'static Encoding) -> Self {
        Self {
            date: Utc::now(),
            charset,
            output: Vec::new(),
        }
    }

    pub(super) fn write_message(
        mut self,
        message: &EmailMessage,
        line_ending: LineEnding,
    ) -> SesResult<Vec<u8>> {
        let from = match message.header("From") {
            Some(value) => self.address_list(split_address_list(value))?,
            None => sanitize_with(&message.from_email, self.charset)?,
        };
        self.write_header("From", &from)?;

        for (name, field) in [
            ("To", &message.to),
            ("Cc", &message.cc),
            ("Reply-To", &message.reply_to),
        ] {
            let value = match message.header(name) {
                Some(value) => self.address_list(split_address_list(value))?,
                None if field.iter().any(|a| !a.is_empty()) => self.address_list(
                    field.iter().filter(|a| !a.is_empty()).map(String::as_str),
                )?,
                None => continue,
            };
            self.write_header(name, &value)?;
        }
        // Bcc stays in the envelope only.

        let subject = encode_header(&message.subject, self.charset)?;
        self.write_header("Subject", &subject)?;

        let date = match message.header("Date") {
            Some(date) => date.to_string(),
            None => self.format_date(),
        };
        self.write_header("Date", &date)?;

        let message_id = match message.header("Message-ID") {
            Some(id) => id.to_string(),
            None => {
                let domain = mailbox_domain(&message.from_email)
                    .unwrap_or_else(|| "localhost".to_string());
                format!("<{}>", self.generate_message_id(&domain))
            }
        };
        self.write_header("Message-ID", &message_id)?;

        for (name, value) in &message.headers {
            if GENERATED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            let value = encode_header(value, self.charset)?;
            self.write_header(name, &value)?;
        }

        self.write_header("MIME-Version", "1.0")?;

        if message.attachments.is_empty() {
            self.write_body(message)?;
        } else {
            let boundary = self.generate_boundary();
            self.write_header(
                "Content-Type",
                &format!("multipart/mixed; boundary=\"{}\"", boundary),
            )?;
            self.newline();

            self.start_part(&boundary);
            self.write_body(message)?;
            for attachment in &message.attachments {
                self.start_part(&boundary);
                self.write_attachment(attachment)?;
            }
            self.end_parts(&boundary);
        }

        Ok(self.finish(line_ending))
    }

    /// Plain text alone, or text and HTML as `multipart/alternative`.
    fn write_body(&mut self, message: &EmailMessage) -> SesResult<()> {
        match &message.html_body {
            Some(html) => {
                let boundary = self.generate_boundary();
                self.write_header(
                    "Content-Type",
                    &format!("multipart/alternative; boundary=\"{}\"", boundary),
                )?;
                self.newline();

                self.start_part(&boundary);
                self.write_text_part("plain", &message.body)?;
                self.start_part(&boundary);
                self.write_text_part("html", html)?;
                self.end_parts(&boundary);
                Ok(())
            }
            None => self.write_text_part("plain", &message.body),
        }
    }

    fn write_text_part(&mut self, subtype: &str, text: &str) -> SesResult<()> {
        let bytes = encode_text(self.charset, &normalize_newlines(text))?;
        let encoding = if is_seven_bit(&bytes) {
            TransferEncoding::SevenBit
        } else {
            TransferEncoding::QuotedPrintable
        };

        self.write_header(
            "Content-Type",
            &format!("text/{}; charset=\"{}\"", subtype, charset_name(self.charset)),
        )?;
        self.write_header("Content-Transfer-Encoding", encoding.header_value())?;
        self.newline();

        let body = match encoding {
            TransferEncoding::QuotedPrintable => quoted_printable::encode(bytes.as_slice()),
            _ => bytes,
        };
        self.output.extend_from_slice(&body);
        if !body.ends_with(b"\r\n") {
            self.newline();
        }
        Ok(())
    }

    fn write_attachment(&mut self, attachment: &Attachment) -> SesResult<()> {
        self.write_header(
            "Content-Type",
            &format!(
                "{}; {}",
                attachment.content_type,
                filename_param("name", &attachment.filename)
            ),
        )?;
        self.write_header(
            "Content-Transfer-Encoding",
            TransferEncoding::Base64.header_value(),
        )?;
        self.write_header(
            "Content-Disposition",
            &format!("attachment; {}", filename_param("filename", &attachment.filename)),
        )?;
        self.newline();

        let encoded = BASE64.encode(&attachment.content);
        for chunk in encoded.as_bytes().chunks(76) {
            self.output.extend_from_slice(chunk);
            self.newline();
        }
        Ok(())
    }

    fn address_list<'a>(&self, addresses: impl IntoIterator<Item = &'a str>) -> SesResult<String> {
        let sanitized = addresses
            .into_iter()
            .map(|addr| sanitize_with(addr, self.charset))
            .collect::<SesResult<Vec<_>>>()?;
        Ok(sanitized.join(", "))
    }

    fn write_header(&mut self, name: &str, value: &str) -> SesResult<()> {
        if name.is_empty() || name.chars().any(|c| !c.is_ascii_graphic() || c == ':') {
            return Err(SesError::Message {
                message: format!("invalid header name {:?}", name),
            });
        }
        if value.contains(['\r', '\n']) {
            return Err(SesError::Message {
                message: format!("header {} cannot contain newlines", name),
            });
        }

        let folded = fold_header(&format!("{}: {}", name, value));
        self.output.extend_from_slice(folded.as_bytes());
        self.newline();
        Ok(())
    }

    fn start_part(&mut self, boundary: &str) {
        self.output
            .extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    }

    fn end_parts(&mut self, boundary: &str) {
        self.output
            .extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    }

    fn newline(&mut self) {
        self.output.extend_from_slice(b"\r\n");
    }

    fn generate_message_id(&self, domain: &str) -> String {
        format!("{}.{}@{}", Uuid::new_v4().simple(), self.date.timestamp(), domain)
    }

    fn generate_boundary(&self) -> String {
        format!("----=_Part_{}", Uuid::new_v4().simple())
    }

    fn format_date(&self) -> String {
        self.date.format("%a, %d %b %Y %H:%M:%S %z").to_string()
    }

    fn finish(self, line_ending: LineEnding) -> Vec<u8> {
        match line_ending {
            LineEnding::Crlf => self.output,
            LineEnding::Lf => {
                let mut output = Vec::with_capacity(self.output.len());
                let mut bytes = self.output.iter().peekable();
                while let Some(&byte) = bytes.next() {
                    if byte == b'\r' && bytes.peek() == Some(&&b'\n') {
                        continue;
                    }
                    output.push(byte);
                }
                output
            }
        }
    }
}

/// Header value as-is when it is printable ASCII, otherwise RFC 2047 words.
pub(super) fn encode_header(value: &str, charset: &'static Encoding) -> SesResult<String> {
    if value.contains(['\r', '\n']) {
        return Err(SesError::Message {
            message: "header values cannot contain newlines".to_string(),
        });
    }
    if value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Ok(value.to_string());
    }
    encode_words(value, charset)
}

/// Base64 encoded words, split on character boundaries, joined by spaces.
pub(super) fn encode_words(value: &str, charset: &'static Encoding) -> SesResult<String> {
    let name = charset_name(charset);
    let budget = (MAX_ENCODED_WORD - name.len() - 7) / 4 * 3;

    let mut words = Vec::new();
    let mut chunk = String::new();
    let mut chunk_len = 0;
    let mut buf = [0u8; 4];

    for c in value.chars() {
        let len = encode_text(charset, c.encode_utf8(&mut buf))?.len();
        if chunk_len + len > budget && !chunk.is_empty() {
            words.push(encoded_word(&name, &encode_text(charset, &chunk)?));
            chunk.clear();
            chunk_len = 0;
        }
        chunk.push(c);
        chunk_len += len;
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&name, &encode_text(charset, &chunk)?));
    }

    Ok(words.join(" "))
}

fn encoded_word(charset: &str, bytes: &[u8]) -> String {
    format!("=?{}?b?{}?=", charset, BASE64.encode(bytes))
}

/// `name="file.txt"` for plain ASCII names, RFC 2231 `name*=` otherwise.
fn filename_param(key: &str, filename: &str) -> String {
    if filename.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{}=\"{}\"", key, escaped)
    } else {
        format!(
            "{}*=utf-8''{}",
            key,
            utf8_percent_encode(filename, ATTRIBUTE_CHARS)
        )
    }
}

/// Folds a header line at whitespace so lines stay within 78 characters.
fn fold_header(header: &str) -> String {
    if header.len() <= 78 {
        return header.to_string();
    }

    let mut result = String::new();
    let mut current_line = String::new();

    for word in header.split(' ') {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= 76 {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            result.push_str(&current_line);
            result.push_str("\r\n ");
            current_line = word.to_string();
        }
    }

    result.push_str(&current_line);
    result
}

/// Every line break becomes CRLF, including bare CR and bare LF.
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n")
}

/// ASCII without NUL, and no line longer than 998 octets excluding its CRLF.
fn is_seven_bit(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b != 0 && b < 0x80)
        && bytes.split(|&b| b == b'\n').all(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            line.len() <= MAX_LINE_LENGTH
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{charset, OutboundMessage};
    use rstest::rstest;

    fn utf8() -> &'static Encoding {
        charset("utf-8").unwrap()
    }

    fn render(message: &EmailMessage) -> String {
        String::from_utf8(message.serialize_raw(LineEnding::Crlf).unwrap()).unwrap()
    }

    fn simple() -> EmailMessage {
        EmailMessage::new(
            "Test Subject",
            "Hello World!",
            "sender@example.com",
            ["recipient@example.com"],
        )
    }

    #[test]
    fn test_simple_message_headers() {
        let content = render(&simple().with_cc(["cc@example.com"]));

        assert!(content.starts_with("From: sender@example.com\r\n"));
        assert!(content.contains("To: recipient@example.com\r\n"));
        assert!(content.contains("Cc: cc@example.com\r\n"));
        assert!(content.contains("Subject: Test Subject\r\n"));
        assert!(content.contains("MIME-Version: 1.0\r\n"));
        assert!(content.contains("Content-Type: text/plain; charset=\"utf-8\"\r\n"));
        assert!(content.contains("Content-Transfer-Encoding: 7bit\r\n"));
        assert!(content.contains("@example.com>\r\n"));
        assert!(content.ends_with("\r\n\r\nHello World!\r\n"));
    }

    #[test]
    fn test_every_line_ends_with_crlf() {
        let message = simple()
            .with_html("<p>Hi</p>\nsecond line")
            .with_attachment(Attachment::new("a.txt", vec![b'x'; 200]));
        let raw = message.serialize_raw(LineEnding::Crlf).unwrap();

        for (i, &byte) in raw.iter().enumerate() {
            if byte == b'\n' {
                assert_eq!(raw[i - 1], b'\r', "bare LF at offset {}", i);
            }
        }
        assert!(raw.ends_with(b"\r\n"));
    }

    #[test]
    fn test_body_newlines_are_normalized() {
        let message = EmailMessage::new("s", "one\ntwo\r\nthree\rfour", "a@example.com", ["b@example.com"]);
        let content = render(&message);
        assert!(content.contains("one\r\ntwo\r\nthree\r\nfour\r\n"));
    }

    #[test]
    fn test_bcc_is_not_a_header() {
        let content = render(&simple().with_bcc(["hidden@example.com"]));
        assert!(!content.contains("hidden@example.com"));
        assert!(!content.contains("Bcc"));
    }

    #[test]
    fn test_non_ascii_body_is_quoted_printable() {
        let message = EmailMessage::new("s", "Grüße", "a@example.com", ["b@example.com"]);
        let content = render(&message);
        assert!(content.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(content.contains("Gr=C3=BC=C3=9Fe"));
    }

    #[test]
    fn test_long_ascii_line_is_quoted_printable() {
        let message = EmailMessage::new("s", "x".repeat(1200), "a@example.com", ["b@example.com"]);
        let content = render(&message);
        assert!(content.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(content.lines().all(|line| line.len() <= 998));
    }

    #[rstest]
    #[case::last_line_at_limit("a".repeat(998), "7bit")]
    #[case::last_line_over_limit("a".repeat(999), "quoted-printable")]
    #[case::inner_line_at_limit(format!("{}\nend", "a".repeat(998)), "7bit")]
    #[case::inner_line_over_limit(format!("{}\nend", "a".repeat(999)), "quoted-printable")]
    fn test_line_length_limit(#[case] body: String, #[case] expected: &str) {
        let message = EmailMessage::new("s", body, "a@example.com", ["b@example.com"]);
        let content = render(&message);

        assert!(content.contains(&format!("Content-Transfer-Encoding: {}\r\n", expected)));
        assert!(content.lines().all(|line| line.len() <= 998));
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let message = EmailMessage::new("Café menu", "x", "a@example.com", ["b@example.com"]);
        let content = render(&message);
        let expected = format!("Subject: =?utf-8?b?{}?=\r\n", BASE64.encode("Café menu"));
        assert!(content.contains(&expected));
    }

    #[test]
    fn test_html_alternative() {
        let content = render(&simple().with_html("<b>Hello</b>"));
        assert!(content.contains("Content-Type: multipart/alternative; boundary=\"----=_Part_"));
        assert!(content.contains("Content-Type: text/html; charset=\"utf-8\"\r\n"));
        let plain = content.find("text/plain").unwrap();
        let html = content.find("text/html").unwrap();
        assert!(plain < html);
        assert!(!content.contains("multipart/mixed"));
    }

    #[test]
    fn test_attachments_wrap_body_in_mixed() {
        let data: Vec<u8> = (0..=255u8).collect();
        let message = simple()
            .with_html("<b>Hello</b>")
            .with_attachment(Attachment::new("data.bin", data.clone()));
        let content = render(&message);

        let mixed = content.find("multipart/mixed").unwrap();
        let alternative = content.find("multipart/alternative").unwrap();
        assert!(mixed < alternative);
        assert!(content.contains("Content-Type: application/octet-stream; name=\"data.bin\"\r\n"));
        assert!(content.contains("Content-Disposition: attachment; filename=\"data.bin\"\r\n"));

        let encoded = BASE64.encode(&data);
        assert!(content.contains(&format!("{}\r\n", &encoded[..76])));
        assert!(content.trim_end().ends_with("--"));
    }

    #[test]
    fn test_non_ascii_attachment_name() {
        assert_eq!(
            filename_param("filename", "résumé.pdf"),
            "filename*=utf-8''r%C3%A9sum%C3%A9.pdf"
        );
        assert_eq!(filename_param("name", "my \"cv\".pdf"), "name=\"my \\\"cv\\\".pdf\"");
    }

    #[test]
    fn test_extra_headers_override_generated() {
        let message = simple()
            .with_header("To", "Override <override@example.com>")
            .with_header("Message-ID", "<fixed@example.com>")
            .with_header("Date", "Mon, 01 Jan 2024 00:00:00 +0000")
            .with_header("X-Campaign", "spring");
        let content = render(&message);

        assert!(content.contains("To: Override <override@example.com>\r\n"));
        assert!(!content.contains("recipient@example.com"));
        assert!(content.contains("Message-ID: <fixed@example.com>\r\n"));
        assert!(content.contains("Date: Mon, 01 Jan 2024 00:00:00 +0000\r\n"));
        assert!(content.contains("X-Campaign: spring\r\n"));
        assert_eq!(content.matches("Message-ID:").count(), 1);
    }

    #[test]
    fn test_header_injection_is_rejected() {
        let message = simple().with_header("X-Note", "a\r\nBcc: victim@example.com");
        assert!(matches!(
            message.serialize_raw(LineEnding::Crlf),
            Err(SesError::Message { .. })
        ));

        let subject = EmailMessage::new("a\nb", "x", "a@example.com", ["b@example.com"]);
        assert!(subject.serialize_raw(LineEnding::Crlf).is_err());
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let message = simple().with_header("Bad Name", "x");
        assert!(message.serialize_raw(LineEnding::Crlf).is_err());
    }

    #[test]
    fn test_unmappable_body_is_a_message_error() {
        let message = EmailMessage::new("s", "日本", "a@example.com", ["b@example.com"])
            .with_charset("iso-8859-1");
        assert!(matches!(
            message.serialize_raw(LineEnding::Crlf),
            Err(SesError::Message { .. })
        ));
    }

    #[test]
    fn test_encoded_words_respect_length() {
        let long = "ü".repeat(60);
        let encoded = encode_words(&long, utf8()).unwrap();
        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        assert!(words.iter().all(|w| w.len() <= MAX_ENCODED_WORD));
        assert!(words.iter().all(|w| w.starts_with("=?utf-8?b?") && w.ends_with("?=")));
    }

    #[test]
    fn test_encode_header_passthrough_for_ascii() {
        assert_eq!(encode_header("Hello", utf8()).unwrap(), "Hello");
    }

    #[test]
    fn test_fold_header() {
        let header = format!("Subject: {}", "word ".repeat(30).trim_end());
        let folded = fold_header(&header);
        assert!(folded.contains("\r\n "));
        assert!(folded.split("\r\n").all(|line| line.len() <= 78));
    }

    #[test]
    fn test_boundaries_are_unique() {
        let writer = MimeWriter::new(utf8());
        assert_ne!(writer.generate_boundary(), writer.generate_boundary());
    }
}
