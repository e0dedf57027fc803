//! Notification method URIs for the `notify` action.
//!
//! The server can deliver notifications by mail only, so the one method
//! scheme accepted here is `mailto:`. The URI's recipient, and any `:from`
//! address attached to the action, must parse as single addresses.

use petrel_mail::Address;

/// A validated notification method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyMethod {
    recipient: Address,
}

impl NotifyMethod {
    /// Parses and validates a notification method URI.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the problem: a missing or
    /// unknown scheme, or an unparsable recipient address.
    pub fn parse(url: &str) -> Result<Self, String> {
        let Some((scheme, rest)) = url.split_once(':') else {
            return Err(format!("Notification method is not a URI: {url}"));
        };
        if !scheme.eq_ignore_ascii_case("mailto") {
            return Err(format!("Unknown notification method: {scheme}"));
        }
        // Header fields in the URI query part don't affect validity of the
        // recipient itself.
        let recipient = rest.split('?').next().unwrap_or(rest);
        match Address::parse_single(recipient) {
            Ok(address) => Ok(Self { recipient: address }),
            Err(e) => Err(format!("Invalid mailto address: {e}")),
        }
    }

    /// Returns the address notifications go to.
    #[must_use]
    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    /// Checks an address for use as the notification's `:from`.
    ///
    /// # Errors
    ///
    /// Returns a description of why the address is unusable.
    pub fn check_from(&self, from: &str) -> Result<(), String> {
        Address::parse_single(from)
            .map(|_| ())
            .map_err(|e| format!("Invalid :from address: {e}"))
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
    fn test_mailto() {
        let m = NotifyMethod::parse("mailto:alerts@example.com").unwrap();
        assert_eq!(m.recipient().localpart(), "alerts");
    }

    #[test]
    fn test_mailto_with_headers() {
        let m = NotifyMethod::parse("mailto:alerts@example.com?subject=hi").unwrap();
        assert_eq!(m.recipient().domain(), "example.com");
    }

    #[test]
    fn test_scheme_case_insensitive() {
        assert!(NotifyMethod::parse("MAILTO:a@example.com").is_ok());
    }

    #[test]
    fn test_unknown_scheme() {
        let e = NotifyMethod::parse("xmpp:user@example.com").unwrap_err();
        assert_eq!(e, "Unknown notification method: xmpp");
    }

    #[test]
    fn test_not_a_uri() {
        assert!(NotifyMethod::parse("alerts@example.com").is_err());
    }

    #[test]
    fn test_bad_recipient() {
        assert!(NotifyMethod::parse("mailto:not-an-address").is_err());
    }

    #[test]
    fn test_check_from() {
        let m = NotifyMethod::parse("mailto:a@example.com").unwrap();
        assert!(m.check_from("b@example.com").is_ok());
        assert!(m.check_from("nope").is_err());
    }
}
