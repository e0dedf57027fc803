//! RFC 5322 address parsing.

use crate::error::{Error, Result};

/// A single RFC 5322 mailbox: an optional display name plus an addr-spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    name: Option<String>,
    localpart: String,
    domain: String,
}

impl Address {
    /// Parses `text` as exactly one mailbox.
    ///
    /// Accepts `local@domain` and `Display Name <local@domain>`. Anything
    /// that looks like a list or a group is rejected, since callers such as
    /// the Sieve `redirect` action must deliver to one recipient.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first problem found in the text.
    pub fn parse_single(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        let (name, spec) = match text.find('<') {
            Some(lt) => {
                let Some(gt) = text.rfind('>') else {
                    return Err(Error::InvalidAddress(
                        "Missing '>' after route address".into(),
                    ));
                };
                if gt != text.len() - 1 {
                    return Err(Error::InvalidAddress(
                        "Text after the closing '>'".into(),
                    ));
                }
                let display = text[..lt].trim();
                let display = display
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(display);
                let name = if display.is_empty() {
                    None
                } else {
                    Some(display.to_string())
                };
                (name, &text[lt + 1..gt])
            }
            None => (None, text),
        };

        let spec = spec.trim();
        if spec.contains(',') || spec.contains(';') {
            return Err(Error::InvalidAddress(
                "Expected a single address, not a list".into(),
            ));
        }

        let Some((local, domain)) = split_spec(spec) else {
            return Err(Error::InvalidAddress("Address must contain @".into()));
        };
        validate_localpart(local)?;
        validate_domain(domain)?;

        Ok(Self {
            name,
            localpart: local.to_string(),
            domain: domain.to_string(),
        })
    }

    /// Returns the display name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the part before the `@`.
    #[must_use]
    pub fn localpart(&self) -> &str {
        &self.localpart
    }

    /// Returns the part after the `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}@{}>", name, self.localpart, self.domain),
            None => write!(f, "{}@{}", self.localpart, self.domain),
        }
    }
}

/// Splits an addr-spec on its final unquoted `@`.
///
/// The split is on the final `@` so that quoted localparts such as
/// `"a@b"@example.com` stay intact.
fn split_spec(spec: &str) -> Option<(&str, &str)> {
    let at = spec.rfind('@')?;
    Some((&spec[..at], &spec[at + 1..]))
}

fn validate_localpart(local: &str) -> Result<()> {
    if local.is_empty() {
        return Err(Error::InvalidAddress("Localpart cannot be empty".into()));
    }

    // A quoted localpart is accepted verbatim.
    if local.len() >= 2 && local.starts_with('"') && local.ends_with('"') {
        return Ok(());
    }

    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(Error::InvalidAddress(format!(
            "Misplaced dot in localpart: {local}"
        )));
    }
    for c in local.chars() {
        if !is_atext(c) && c != '.' {
            return Err(Error::InvalidAddress(format!(
                "Invalid character in localpart: {c}"
            )));
        }
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::InvalidAddress("Domain cannot be empty".into()));
    }
    for label in domain.split('.') {
        if label.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "Empty label in domain: {domain}"
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::InvalidAddress(format!(
                "Label cannot start or end with a hyphen: {label}"
            )));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::InvalidAddress(format!(
                "Invalid character in domain: {domain}"
            )));
        }
    }
    Ok(())
}

/// RFC 5322 atext, minus the characters that would confuse a quick reader.
fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
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
    fn test_bare_addr_spec() {
        let addr = Address::parse_single("user@example.com").unwrap();
        assert_eq!(addr.localpart(), "user");
        assert_eq!(addr.domain(), "example.com");
        assert!(addr.name().is_none());
    }

    #[test]
    fn test_display_name() {
        let addr = Address::parse_single("Some One <user@example.com>").unwrap();
        assert_eq!(addr.name(), Some("Some One"));
        assert_eq!(addr.localpart(), "user");
    }

    #[test]
    fn test_quoted_display_name() {
        let addr = Address::parse_single("\"One, Some\" <user@example.com>").unwrap();
        assert_eq!(addr.name(), Some("One, Some"));
    }

    #[test]
    fn test_quoted_localpart() {
        let addr = Address::parse_single("\"odd @ one\"@example.com").unwrap();
        assert_eq!(addr.localpart(), "\"odd @ one\"");
        assert_eq!(addr.domain(), "example.com");
    }

    #[test]
    fn test_no_at() {
        assert!(Address::parse_single("userexample.com").is_err());
    }

    #[test]
    fn test_empty() {
        assert!(Address::parse_single("").is_err());
        assert!(Address::parse_single("   ").is_err());
    }

    #[test]
    fn test_empty_localpart_or_domain() {
        assert!(Address::parse_single("@example.com").is_err());
        assert!(Address::parse_single("user@").is_err());
    }

    #[test]
    fn test_list_rejected() {
        assert!(Address::parse_single("a@example.com, b@example.com").is_err());
    }

    #[test]
    fn test_dotted_localpart() {
        assert!(Address::parse_single("a.b.c@example.com").is_ok());
        assert!(Address::parse_single(".abc@example.com").is_err());
        assert!(Address::parse_single("a..b@example.com").is_err());
    }

    #[test]
    fn test_bad_domain() {
        assert!(Address::parse_single("user@exa mple.com").is_err());
        assert!(Address::parse_single("user@example..com").is_err());
        assert!(Address::parse_single("user@-example.com").is_err());
    }

    #[test]
    fn test_unclosed_angle() {
        assert!(Address::parse_single("One <user@example.com").is_err());
    }

    #[test]
    fn test_display() {
        let addr = Address::parse_single("One <user@example.com>").unwrap();
        assert_eq!(addr.to_string(), "One <user@example.com>");
    }
}
