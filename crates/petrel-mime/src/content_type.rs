//! MIME content type handling.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "mixed").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into().to_lowercase(),
            sub_type: sub_type.into().to_lowercase(),
            parameters: HashMap::new(),
        }
    }

    /// Creates a text/plain content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// Parses a content type string like `text/plain; charset=utf-8`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string has no `type/subtype` part.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(';');

        let type_part = parts
            .next()
            .ok_or_else(|| Error::InvalidContentType(s.to_string()))?
            .trim();
        let Some((main_type, sub_type)) = type_part.split_once('/') else {
            return Err(Error::InvalidContentType(s.to_string()));
        };
        if main_type.trim().is_empty() || sub_type.trim().is_empty() {
            return Err(Error::InvalidContentType(s.to_string()));
        }

        let mut ct = Self::new(main_type.trim(), sub_type.trim());
        for param in parts {
            if let Some((name, value)) = param.split_once('=') {
                let value = value.trim().trim_matches('"');
                ct.parameters
                    .insert(name.trim().to_lowercase(), value.to_string());
            }
        }
        Ok(ct)
    }

    /// Gets a parameter value by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Returns true for `multipart/*` types.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        let mut params: Vec<_> = self.parameters.iter().collect();
        params.sort();
        for (name, value) in params {
            write!(f, "; {name}={value}")?;
        }
        Ok(())
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
        let ct = ContentType::parse("text/plain").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_parse_with_parameters() {
        let ct = ContentType::parse("text/plain; charset=utf-8").unwrap();
        assert_eq!(ct.parameter("charset"), Some("utf-8"));
    }

    #[test]
    fn test_parse_quoted_parameter() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"xyz 123\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.parameter("boundary"), Some("xyz 123"));
    }

    #[test]
    fn test_parse_case_folding() {
        let ct = ContentType::parse("Text/HTML; Charset=UTF-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "html");
        assert_eq!(ct.parameter("charset"), Some("UTF-8"));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ContentType::parse("textplain").is_err());
        assert!(ContentType::parse("/plain").is_err());
        assert!(ContentType::parse("text/").is_err());
    }

    #[test]
    fn test_display() {
        let ct = ContentType::parse("text/plain; charset=utf-8").unwrap();
        assert_eq!(ct.to_string(), "text/plain; charset=utf-8");
    }
}
