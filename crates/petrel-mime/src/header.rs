//! MIME header handling.

use crate::error::{Error, Result};
use std::fmt;

/// A single header field, name and unfolded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    name: String,
    value: String,
}

impl HeaderField {
    /// Returns the field name in canonical header case.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the unfolded field value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An ordered collection of header fields.
///
/// Unlike a map, this keeps fields in source order and keeps duplicates,
/// which matters when a caller needs to inspect every field.
#[derive(Debug, Clone, Default)]
pub struct Header {
    fields: Vec<HeaderField>,
}

impl Header {
    /// Creates a new empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a MIME entity header from raw text.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///  continuation line
    /// ```
    /// and end at the first empty line (or at end of input).
    ///
    /// # Errors
    ///
    /// Returns an error for a line that is neither a `name: value` pair nor
    /// a continuation, or for a field name with illegal characters.
    pub fn parse_mime(text: &str) -> Result<Self> {
        let mut header = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                let Some((_, value)) = current.as_mut() else {
                    return Err(Error::InvalidHeader(
                        "Continuation line before any field".into(),
                    ));
                };
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }

            if let Some((name, value)) = current.take() {
                header.add(&name, value.trim());
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::InvalidHeader(format!("Expected a field: {line}")));
            };
            let name = name.trim();
            validate_field_name(name)?;
            current = Some((name.to_string(), value.trim().to_string()));
        }

        if let Some((name, value)) = current {
            header.add(&name, value.trim());
        }

        Ok(header)
    }

    /// Appends a field. The name is stored header-cased.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push(HeaderField {
            name: header_cased(name),
            value: value.into(),
        });
    }

    /// Gets the value of the first field named `name`, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// Returns the fields in source order.
    #[must_use]
    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    /// Returns true if no fields were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            writeln!(f, "{}: {}", field.name, field.value)?;
        }
        Ok(())
    }
}

fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidHeader("Empty field name".into()));
    }
    for b in name.bytes() {
        if !(33..=126).contains(&b) || b == b':' {
            return Err(Error::InvalidHeader(format!(
                "Illegal character in field name: {name}"
            )));
        }
    }
    Ok(())
}

/// Converts a field name to canonical header case, e.g. `x-spam-flag` to
/// `X-Spam-Flag`.
#[must_use]
pub fn header_cased(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str().to_ascii_lowercase().as_str()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Classification of the header fields the server knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `Return-Path`.
    ReturnPath,
    /// `Sender` or `Resent-Sender`.
    Sender,
    /// `From` or `Resent-From`.
    From,
    /// `Reply-To`.
    ReplyTo,
    /// `To` or `Resent-To`.
    To,
    /// `Cc` or `Resent-Cc`.
    Cc,
    /// `Bcc` or `Resent-Bcc`.
    Bcc,
    /// `Subject`.
    Subject,
    /// `Date` or `Resent-Date`.
    Date,
    /// `Message-Id` or `Resent-Message-Id`.
    MessageId,
    /// `In-Reply-To`.
    InReplyTo,
    /// `References`.
    References,
    /// `Mime-Version`.
    MimeVersion,
    /// `Content-Type`.
    ContentType,
    /// `Content-Transfer-Encoding`.
    ContentTransferEncoding,
}

impl FieldKind {
    /// Classifies a field name, case-insensitively.
    ///
    /// Returns `None` for names the server has no special knowledge of.
    #[must_use]
    pub fn of(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "return-path" => Some(Self::ReturnPath),
            "sender" | "resent-sender" => Some(Self::Sender),
            "from" | "resent-from" => Some(Self::From),
            "reply-to" => Some(Self::ReplyTo),
            "to" | "resent-to" => Some(Self::To),
            "cc" | "resent-cc" => Some(Self::Cc),
            "bcc" | "resent-bcc" => Some(Self::Bcc),
            "subject" => Some(Self::Subject),
            "date" | "resent-date" => Some(Self::Date),
            "message-id" | "resent-message-id" => Some(Self::MessageId),
            "in-reply-to" => Some(Self::InReplyTo),
            "references" => Some(Self::References),
            "mime-version" => Some(Self::MimeVersion),
            "content-type" => Some(Self::ContentType),
            "content-transfer-encoding" => Some(Self::ContentTransferEncoding),
            _ => None,
        }
    }

    /// Returns true for the fields whose value is a list of addresses
    /// (RFC 5322 section 3.6.2 and 3.6.3, plus their Resent- variants).
    #[must_use]
    pub fn is_address(self) -> bool {
        matches!(
            self,
            Self::ReturnPath
                | Self::Sender
                | Self::From
                | Self::ReplyTo
                | Self::To
                | Self::Cc
                | Self::Bcc
        )
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let header = Header::parse_mime("Content-Type: text/plain\r\n\r\n").unwrap();
        assert_eq!(header.get("Content-Type"), Some("text/plain"));
        assert_eq!(header.get("content-type"), Some("text/plain"));
        assert_eq!(header.fields().len(), 1);
    }

    #[test]
    fn test_parse_continuation() {
        let text = concat!(
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n"
        );
        let header = Header::parse_mime(text).unwrap();
        assert_eq!(header.get("Content-Type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_parse_keeps_order_and_duplicates() {
        let text = "Received: a\r\nReceived: b\r\nSubject: x\r\n";
        let header = Header::parse_mime(text).unwrap();
        let names: Vec<_> = header.fields().iter().map(HeaderField::name).collect();
        assert_eq!(names, ["Received", "Received", "Subject"]);
    }

    #[test]
    fn test_parse_stops_at_blank_line() {
        let text = "Subject: x\r\n\r\nNot-A-Header body text";
        let header = Header::parse_mime(text).unwrap();
        assert_eq!(header.fields().len(), 1);
    }

    #[test]
    fn test_parse_rejects_colonless_line() {
        assert!(Header::parse_mime("this is not a header\r\n").is_err());
    }

    #[test]
    fn test_parse_rejects_stray_continuation() {
        assert!(Header::parse_mime(" leading continuation\r\n").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_field_name() {
        assert!(Header::parse_mime("Bad Name: x\r\n").is_err());
    }

    #[test]
    fn test_header_cased() {
        assert_eq!(header_cased("subject"), "Subject");
        assert_eq!(header_cased("x-spam-flag"), "X-Spam-Flag");
        assert_eq!(header_cased("CONTENT-TYPE"), "Content-Type");
    }

    mod field_kind_tests {
        use super::*;

        #[test]
        fn address_fields() {
            for name in ["From", "to", "CC", "bcc", "Reply-To", "Resent-From"] {
                let kind = FieldKind::of(name).unwrap();
                assert!(kind.is_address(), "{name} should be an address field");
            }
        }

        #[test]
        fn non_address_fields() {
            assert!(!FieldKind::of("Subject").unwrap().is_address());
            assert!(!FieldKind::of("Date").unwrap().is_address());
        }

        #[test]
        fn unknown_fields() {
            assert!(FieldKind::of("X-Spam-Flag").is_none());
        }
    }
}
