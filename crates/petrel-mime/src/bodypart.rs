//! MIME bodypart structure and parsing.

use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::header::Header;

/// A parsed MIME bodypart.
///
/// A single-part entity carries its text; a `multipart/*` entity carries its
/// children instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bodypart {
    text: String,
    children: Vec<Bodypart>,
}

impl Bodypart {
    /// Parses `body` as the bodypart described by `header`.
    ///
    /// `body` is the entity text after the header's blank line (see
    /// [`entity_body`]). For `multipart/*` content types the body is split
    /// on the boundary parameter and each part is parsed recursively.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable Content-Type, a multipart type
    /// without a boundary parameter, or a multipart body without parts.
    pub fn parse(body: &str, header: &Header) -> Result<Self> {
        let content_type = match header.get("Content-Type") {
            Some(value) => ContentType::parse(value)?,
            None => ContentType::text_plain(),
        };

        if !content_type.is_multipart() {
            return Ok(Self {
                text: body.to_string(),
                children: Vec::new(),
            });
        }

        let boundary = content_type
            .parameter("boundary")
            .ok_or(Error::MissingBoundary)?;
        let children = split_multipart(body, boundary)?;
        Ok(Self {
            text: String::new(),
            children,
        })
    }

    /// Returns the text of a single-part entity, empty for multipart.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the children of a multipart entity, empty for single parts.
    #[must_use]
    pub fn children(&self) -> &[Bodypart] {
        &self.children
    }

    /// Returns true if this part has neither text nor children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.text.is_empty()
    }
}

/// Returns the body of a MIME entity: everything after the first empty
/// line. Returns the empty string if the entity is all header.
#[must_use]
pub fn entity_body(text: &str) -> &str {
    for sep in ["\r\n\r\n", "\n\n"] {
        if let Some(at) = text.find(sep) {
            return &text[at + sep.len()..];
        }
    }
    ""
}

fn split_multipart(body: &str, boundary: &str) -> Result<Vec<Bodypart>> {
    let delimiter = format!("--{boundary}");
    let close = format!("--{boundary}--");

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    for line in body.lines() {
        let trimmed = line.trim_end();
        if trimmed == close {
            break;
        }
        if trimmed == delimiter {
            if let Some(chunk) = current.take() {
                chunks.push(chunk);
            }
            current = Some(String::new());
            continue;
        }
        if let Some(chunk) = current.as_mut() {
            chunk.push_str(line);
            chunk.push_str("\r\n");
        }
        // lines before the first delimiter are the preamble
    }
    if let Some(chunk) = current {
        chunks.push(chunk);
    }

    if chunks.is_empty() {
        return Err(Error::InvalidMultipart("No parts found".into()));
    }

    let mut children = Vec::new();
    for chunk in &chunks {
        let header = Header::parse_mime(chunk)
            .map_err(|e| Error::InvalidMultipart(e.to_string()))?;
        let child = Bodypart::parse(entity_body(chunk), &header)?;
        children.push(child);
    }
    Ok(children)
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
    fn test_single_part() {
        let header = Header::parse_mime("Content-Type: text/plain\r\n\r\n").unwrap();
        let bp = Bodypart::parse("hello there\r\n", &header).unwrap();
        assert_eq!(bp.text(), "hello there\r\n");
        assert!(bp.children().is_empty());
    }

    #[test]
    fn test_default_content_type() {
        let header = Header::new();
        let bp = Bodypart::parse("plain enough", &header).unwrap();
        assert_eq!(bp.text(), "plain enough");
    }

    #[test]
    fn test_empty_body() {
        let header = Header::new();
        let bp = Bodypart::parse("", &header).unwrap();
        assert!(bp.is_empty());
    }

    #[test]
    fn test_entity_body() {
        assert_eq!(entity_body("A: b\r\n\r\nrest"), "rest");
        assert_eq!(entity_body("A: b\n\nrest\nmore"), "rest\nmore");
        assert_eq!(entity_body("A: b\r\n"), "");
    }

    #[test]
    fn test_multipart() {
        let header = Header::parse_mime(
            "Content-Type: multipart/alternative; boundary=xyz\r\n\r\n",
        )
        .unwrap();
        let body = concat!(
            "preamble is ignored\r\n",
            "--xyz\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain text\r\n",
            "--xyz\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html</p>\r\n",
            "--xyz--\r\n",
            "epilogue\r\n"
        );
        let bp = Bodypart::parse(body, &header).unwrap();
        assert_eq!(bp.children().len(), 2);
        assert_eq!(bp.children()[0].text(), "plain text\r\n");
        assert_eq!(bp.children()[1].text(), "<p>html</p>\r\n");
    }

    #[test]
    fn test_multipart_without_boundary() {
        let header = Header::parse_mime("Content-Type: multipart/mixed\r\n\r\n").unwrap();
        assert_eq!(
            Bodypart::parse("x", &header),
            Err(Error::MissingBoundary)
        );
    }

    #[test]
    fn test_multipart_without_parts() {
        let header = Header::parse_mime(
            "Content-Type: multipart/mixed; boundary=xyz\r\n\r\n",
        )
        .unwrap();
        assert!(Bodypart::parse("no delimiters here\r\n", &header).is_err());
    }
}
