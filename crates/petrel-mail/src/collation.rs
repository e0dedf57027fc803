//! Comparator collations from RFC 4790.
//!
//! A collation decides how two strings are compared during filtering and
//! searching. The server implements the three collations every deployment
//! seems to need; adding one means extending the enum and `supported`.

use std::cmp::Ordering;

/// A string-comparison collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collation {
    /// `i;octet`: raw byte comparison.
    Octet,
    /// `i;ascii-casemap`: byte comparison after ASCII-lowercasing.
    AsciiCasemap,
    /// `i;ascii-numeric`: compares leading digit prefixes numerically.
    AsciiNumeric,
}

impl Collation {
    /// Looks up a collation by its registered name.
    ///
    /// Returns `None` for names the server does not implement.
    #[must_use]
    pub fn create(name: &str) -> Option<Self> {
        match name {
            "i;octet" => Some(Self::Octet),
            "i;ascii-casemap" => Some(Self::AsciiCasemap),
            "i;ascii-numeric" => Some(Self::AsciiNumeric),
            _ => None,
        }
    }

    /// Returns the registered names of all implemented collations, sorted.
    #[must_use]
    pub fn supported() -> &'static [&'static str] {
        &["i;ascii-casemap", "i;ascii-numeric", "i;octet"]
    }

    /// Returns this collation's registered name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Octet => "i;octet",
            Self::AsciiCasemap => "i;ascii-casemap",
            Self::AsciiNumeric => "i;ascii-numeric",
        }
    }

    /// Orders `a` relative to `b`.
    #[must_use]
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Octet => a.as_bytes().cmp(b.as_bytes()),
            Self::AsciiCasemap => {
                let a = a.to_ascii_lowercase();
                let b = b.to_ascii_lowercase();
                a.as_bytes().cmp(b.as_bytes())
            }
            Self::AsciiNumeric => compare_numeric(a, b),
        }
    }

    /// Returns true if `a` and `b` are equal under this collation.
    #[must_use]
    pub fn equals(self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    /// Returns true if `a` contains `b` under this collation.
    ///
    /// `i;ascii-numeric` defines no substring operation, so it falls back to
    /// equality.
    #[must_use]
    pub fn contains(self, a: &str, b: &str) -> bool {
        match self {
            Self::Octet => a.contains(b),
            Self::AsciiCasemap => a.to_ascii_lowercase().contains(&b.to_ascii_lowercase()),
            Self::AsciiNumeric => self.equals(a, b),
        }
    }
}

/// RFC 4790 section 9.1: the value is the leading digit run; a string with
/// no leading digit is positive infinity, and infinities are equal.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    match (digit_prefix(a), digit_prefix(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
    }
}

fn digit_prefix(s: &str) -> Option<&str> {
    let end = s.bytes().take_while(u8::is_ascii_digit).count();
    if end == 0 { None } else { Some(&s[..end]) }
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
    fn test_create_known() {
        assert_eq!(Collation::create("i;octet"), Some(Collation::Octet));
        assert_eq!(
            Collation::create("i;ascii-casemap"),
            Some(Collation::AsciiCasemap)
        );
        assert_eq!(
            Collation::create("i;ascii-numeric"),
            Some(Collation::AsciiNumeric)
        );
    }

    #[test]
    fn test_create_unknown() {
        assert_eq!(Collation::create("i;unicode-casemap"), None);
        assert_eq!(Collation::create(""), None);
    }

    #[test]
    fn test_supported_matches_create() {
        for name in Collation::supported() {
            assert_eq!(Collation::create(name).unwrap().name(), *name);
        }
    }

    #[test]
    fn test_octet() {
        assert!(Collation::Octet.equals("abc", "abc"));
        assert!(!Collation::Octet.equals("abc", "ABC"));
        assert!(Collation::Octet.contains("subject line", "ject"));
    }

    #[test]
    fn test_casemap() {
        assert!(Collation::AsciiCasemap.equals("MiXeD", "mixed"));
        assert!(Collation::AsciiCasemap.contains("Subject Line", "suBJect"));
        // Only ASCII folds; these differ.
        assert!(!Collation::AsciiCasemap.equals("É", "é"));
    }

    #[test]
    fn test_numeric() {
        assert!(Collation::AsciiNumeric.equals("007", "7"));
        assert_eq!(
            Collation::AsciiNumeric.compare("10", "9"),
            Ordering::Greater
        );
        assert_eq!(Collation::AsciiNumeric.compare("3kg", "03"), Ordering::Equal);
        // No digits means positive infinity.
        assert_eq!(Collation::AsciiNumeric.compare("x", "y"), Ordering::Equal);
        assert_eq!(Collation::AsciiNumeric.compare("x", "99"), Ordering::Greater);
    }
}
