//! IMAP mailbox name validation.
//!
//! Mailbox names form a `/`-separated hierarchy. The checks here are purely
//! syntactic; whether a mailbox exists is a storage question.

/// Returns true if `name` is a syntactically valid mailbox name.
///
/// The name may be given with or without a leading `/`. Every component of
/// the path must be non-empty, and the listing wildcards `%` and `*`, the
/// quote characters `"` and `\`, and control bytes are not permitted
/// anywhere.
#[must_use]
pub fn valid_name(name: &str) -> bool {
    let name = name.strip_prefix('/').unwrap_or(name);
    if name.is_empty() || name.ends_with('/') {
        return false;
    }
    if name.chars().any(is_forbidden) {
        return false;
    }
    name.split('/').all(|component| !component.is_empty())
}

fn is_forbidden(c: char) -> bool {
    c.is_control() || matches!(c, '%' | '*' | '"' | '\\')
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
    fn test_simple_names() {
        assert!(valid_name("inbox"));
        assert!(valid_name("Sent"));
        assert!(valid_name("Junk"));
    }

    #[test]
    fn test_leading_slash_optional() {
        assert!(valid_name("/users/nest/inbox"));
        assert!(valid_name("users/nest/inbox"));
    }

    #[test]
    fn test_empty_and_slash_only() {
        assert!(!valid_name(""));
        assert!(!valid_name("/"));
    }

    #[test]
    fn test_empty_component() {
        assert!(!valid_name("a//b"));
        assert!(!valid_name("a/b/"));
    }

    #[test]
    fn test_wildcards_rejected() {
        assert!(!valid_name("a*b"));
        assert!(!valid_name("a%b"));
    }

    #[test]
    fn test_control_bytes_rejected() {
        assert!(!valid_name("a\u{0}b"));
        assert!(!valid_name("a\nb"));
    }

    #[test]
    fn test_unicode_allowed() {
        assert!(valid_name("arkiv/æøå"));
    }
}
