//! The extension sets a script declares and needs.
//!
//! `require` and a passing `ihave` make extensions legal in their scope;
//! every construct that depends on an extension records the need on its own
//! node. After analysis the two are reconciled here.

use crate::ast::Nodes;
use petrel_mail::Collation;

/// Returns the names of all supported sieve extensions, sorted.
///
/// BODY is from RFC 5173, COPY from RFC 3894, DATE from RFC 5260, EREJECT
/// from RFC 5429, IHAVE from RFC 5463, RELATIONAL from RFC 5231, SUBADDRESS
/// from RFC 5233, VACATION from RFC 5230 and IMAP4FLAGS from RFC 5232; the
/// rest are the optional parts of RFC 5228 itself. One `comparator-<name>`
/// is added for each collation the server knows.
#[must_use]
pub fn supported_extensions() -> Vec<String> {
    let mut r = vec!["body".to_string()];
    for name in Collation::supported() {
        r.push(format!("comparator-{name}"));
    }
    for name in [
        "copy",
        "date",
        "envelope",
        "ereject",
        "fileinto",
        "ihave",
        "imap4flags",
        "reject",
        "relational",
        "subaddress",
        "vacation",
    ] {
        r.push(name.to_string());
    }
    r
}

/// Returns true if `name` is a supported extension.
#[must_use]
pub fn is_supported(name: &str) -> bool {
    supported_extensions().iter().any(|e| e == name)
}

/// Comparators every script may use without a `require` (RFC 5228 2.7.3).
const IMPLICIT: [&str; 2] = ["comparator-i;octet", "comparator-i;ascii-casemap"];

/// Reconciles the needed-extension ledger against the declared scopes.
///
/// A need is satisfied when the extension is declared at the needing node
/// or at one of its ancestors, when it is one of the always-available
/// comparators, or when the node sits in a failed `ihave` scope. Anything
/// else becomes an error on the needing node.
pub(crate) fn resolve(nodes: &mut Nodes) {
    let needed: Vec<_> = nodes
        .needed()
        .iter()
        .map(|(id, name)| (*id, name.clone()))
        .collect();
    for (id, name) in needed {
        if IMPLICIT.contains(&name.as_str()) {
            continue;
        }
        if nodes.declares_in_scope(id, &name) {
            continue;
        }
        if nodes.in_ihave_failed_scope(id) {
            continue;
        }
        nodes.set_error(id, format!("Missing require: \"{name}\""));
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
    fn test_supported_is_sorted() {
        let list = supported_extensions();
        let mut sorted = list.clone();
        sorted.sort();
        assert_eq!(list, sorted);
    }

    #[test]
    fn test_supported_names() {
        assert!(is_supported("fileinto"));
        assert!(is_supported("vacation"));
        assert!(is_supported("comparator-i;octet"));
        assert!(!is_supported("enotify"));
        assert!(!is_supported("index"));
        assert!(!is_supported(""));
    }

    #[test]
    fn test_implicit_comparators_are_supported() {
        for name in IMPLICIT {
            assert!(is_supported(name));
        }
    }
}
