//! Outbound messages and their raw MIME form.
//!
//! The dispatcher only needs four things from a message: the sender, the
//! envelope recipients, the declared charset and the raw bytes. Those are
//! captured by [`OutboundMessage`]. [`EmailMessage`] is the implementation
//! shipped with the crate; callers with their own message type implement the
//! trait instead.
//!
//! # Examples
//!
//! ```rust
//! use integrations_ses_mailer::message::{Attachment, EmailMessage, LineEnding, OutboundMessage};
//!
//! let message = EmailMessage::new(
//!     "Monthly report",
//!     "See attached.",
//!     "Reports <reports@example.com>",
//!     ["alice@example.com"],
//! )
//! .with_bcc(["audit@example.com"])
//! .with_attachment(Attachment::new("report.csv", b"month,total\n".to_vec()));
//!
//! assert_eq!(message.recipients(), vec!["alice@example.com", "audit@example.com"]);
//! let raw = message.serialize_raw(LineEnding::Crlf).unwrap();
//! assert!(raw.starts_with(b"From: Reports <reports@example.com>\r\n"));
//! ```

mod address;
mod encoder;

pub use address::sanitize_address;

use encoding_rs::Encoding;

use crate::error::{SesError, SesResult};

/// Charset used when a message does not declare one.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Line separator used when serializing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// `\r\n`, required by the raw-message ingestion of the service.
    #[default]
    Crlf,
    /// `\n`, for storing or displaying messages locally.
    Lf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Crlf => "\r\n",
            LineEnding::Lf => "\n",
        }
    }
}

/// What the backend needs from a mail message.
pub trait OutboundMessage: Send + Sync {
    /// Sender as written by the caller; sanitized by the backend before use.
    fn from_address(&self) -> &str;

    /// Envelope recipients: To, then Cc, then Bcc.
    fn recipients(&self) -> Vec<String>;

    /// Charset label the message is written in.
    fn encoding(&self) -> &str;

    /// Full message, headers and body, with every line ending in `line_ending`.
    fn serialize_raw(&self, line_ending: LineEnding) -> SesResult<Vec<u8>>;
}

/// A file attached to an [`EmailMessage`].
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: ::mime::Mime,
}

impl Attachment {
    /// Attachment whose content type is guessed from the file extension.
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename).first_or_octet_stream();
        Self {
            filename,
            content,
            content_type,
        }
    }

    pub fn with_content_type(mut self, content_type: ::mime::Mime) -> Self {
        self.content_type = content_type;
        self
    }
}

/// A plain-text email with an optional HTML alternative and attachments.
///
/// Fields are public so `pre_send` receivers can rewrite them.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub from_email: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Vec<String>,
    /// Extra headers, written in order. `From`, `To`, `Cc`, `Reply-To`,
    /// `Date` and `Message-ID` replace the generated values.
    pub headers: Vec<(String, String)>,
    pub html_body: Option<String>,
    pub attachments: Vec<Attachment>,
    pub charset: String,
}

impl EmailMessage {
    /// Create a plain-text message in the default charset.
    ///
    /// # Example
    ///
    /// ```
    /// use integrations_ses_mailer::EmailMessage;
    ///
    /// let message = EmailMessage::new("Hi", "Body", "app@example.com", ["a@example.com"])
    ///     .with_cc(["b@example.com"])
    ///     .with_html("<p>Body</p>");
    /// assert_eq!(message.to, vec!["a@example.com".to_string()]);
    /// ```
    pub fn new<I, S>(
        subject: impl Into<String>,
        body: impl Into<String>,
        from_email: impl Into<String>,
        to: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject: subject.into(),
            body: body.into(),
            from_email: from_email.into(),
            to: to.into_iter().map(Into::into).collect(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            headers: Vec::new(),
            html_body: None,
            attachments: Vec::new(),
            charset: DEFAULT_CHARSET.to_string(),
        }
    }

    pub fn with_cc<I, S>(mut self, cc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cc.extend(cc.into_iter().map(Into::into));
        self
    }

    pub fn with_bcc<I, S>(mut self, bcc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bcc.extend(bcc.into_iter().map(Into::into));
        self
    }

    pub fn with_reply_to<I, S>(mut self, reply_to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reply_to.extend(reply_to.into_iter().map(Into::into));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add an HTML alternative to the plain-text body.
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Charset for the text parts and encoded headers, e.g. `iso-8859-1`.
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Case-insensitive lookup of an extra header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl OutboundMessage for EmailMessage {
    fn from_address(&self) -> &str {
        &self.from_email
    }

    fn recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .filter(|addr| !addr.is_empty())
            .cloned()
            .collect()
    }

    fn encoding(&self) -> &str {
        &self.charset
    }

    fn serialize_raw(&self, line_ending: LineEnding) -> SesResult<Vec<u8>> {
        encoder::MimeWriter::new(charset(&self.charset)?).write_message(self, line_ending)
    }
}

/// Look up a charset by its WHATWG label.
pub(crate) fn charset(label: &str) -> SesResult<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .map(Encoding::output_encoding)
        .ok_or_else(|| SesError::Message {
            message: format!("unknown charset {:?}", label),
        })
}

/// Encode `text` in `encoding`, failing on characters it cannot represent.
pub(crate) fn encode_text(encoding: &'static Encoding, text: &str) -> SesResult<Vec<u8>> {
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(SesError::Message {
            message: format!("text cannot be represented in {}", charset_name(encoding)),
        });
    }
    Ok(bytes.into_owned())
}

/// Name written into `charset=` parameters and encoded words.
pub(crate) fn charset_name(encoding: &'static Encoding) -> String {
    encoding.name().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage::new("Hi", "Body", "from@example.com", ["to@example.com"])
    }

    #[test]
    fn test_recipients_order_and_empty_entries() {
        let msg = message()
            .with_cc(["cc@example.com", ""])
            .with_bcc(["bcc@example.com"]);
        assert_eq!(
            msg.recipients(),
            vec!["to@example.com", "cc@example.com", "bcc@example.com"]
        );
    }

    #[test]
    fn test_recipients_see_mutation() {
        let mut msg = message().with_bcc(["bcc@example.com"]);
        msg.to.clear();
        msg.bcc.clear();
        assert!(msg.recipients().is_empty());
    }

    #[test]
    fn test_charset_labels() {
        assert_eq!(charset_name(charset("utf-8").unwrap()), "utf-8");
        assert_eq!(charset_name(charset("UTF8").unwrap()), "utf-8");
        assert_eq!(charset_name(charset("iso-8859-2").unwrap()), "iso-8859-2");
        assert!(matches!(
            charset("klingon"),
            Err(SesError::Message { .. })
        ));
    }

    #[test]
    fn test_encode_text_rejects_unmappable() {
        let latin2 = charset("iso-8859-2").unwrap();
        assert_eq!(encode_text(latin2, "ł").unwrap(), vec![0xB3]);
        assert!(encode_text(latin2, "日本").is_err());
    }

    #[test]
    fn test_attachment_type_guess() {
        let attachment = Attachment::new("report.pdf", vec![1, 2, 3]);
        assert_eq!(attachment.content_type, ::mime::APPLICATION_PDF);

        let unknown = Attachment::new("blob.unknownext", vec![]);
        assert_eq!(unknown.content_type, ::mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let msg = message().with_header("X-Campaign", "spring");
        assert_eq!(msg.header("x-campaign"), Some("spring"));
        assert_eq!(msg.header("X-Other"), None);
    }

    #[test]
    fn test_lf_serialization_has_no_carriage_returns() {
        let raw = message().serialize_raw(LineEnding::Lf).unwrap();
        assert!(!raw.contains(&b'\r'));
        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("Subject: Hi\n"));
    }
}
