//! # petrel-sieve
//!
//! Parser and semantic analyser for the Sieve mail-filtering language of
//! RFC 5228, plus the extensions the Petrel server implements (body, copy,
//! date, envelope, ereject, fileinto, ihave, imap4flags, reject,
//! relational, subaddress, vacation, and one comparator per collation).
//!
//! Parsing is a pure function from script text to a [`Script`]: a typed
//! production tree plus a list of [`SieveError`] diagnostics with byte
//! offsets. It never fails — a broken script comes back as a tree with
//! errors on the broken productions, so a caller can show every problem in
//! one pass. Evaluation against a message is a separate concern and lives
//! elsewhere.
//!
//! ## Example
//!
//! ```
//! use petrel_sieve::Script;
//!
//! let script = Script::parse(
//!     "require [\"fileinto\"];\n\
//!      if header :contains \"subject\" \"weekly report\" {\n\
//!          fileinto \"reports\";\n\
//!      }\n",
//! );
//! assert!(script.ok());
//! assert_eq!(script.commands().len(), 2);
//!
//! let broken = Script::parse("fileinto \"reports\";");
//! assert!(!broken.ok());
//! assert_eq!(
//!     broken.errors()[0].message,
//!     "Missing require: \"fileinto\""
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod analyze;
mod ast;
mod error;
mod lexer;
mod notify;
mod parser;

pub mod extensions;

pub use ast::{
    AddressPart, Argument, ArgumentList, ArgumentValue, Block, BodyMatch, Command, MatchType,
    Relational, Test,
};
pub use error::SieveError;
pub use notify::NotifyMethod;

use ast::Nodes;
use tracing::debug;

/// A parsed and analysed Sieve script.
///
/// Parsing always produces a `Script`; [`Script::ok`] says whether it is
/// clean. The production tree stays available either way, because a caller
/// reporting problems usually still wants to show the script's structure.
#[derive(Debug)]
pub struct Script {
    source: String,
    commands: Vec<Command>,
    nodes: Nodes,
    root: ast::NodeId,
    errors: Vec<SieveError>,
}

impl Script {
    /// Parses and analyses `source`.
    ///
    /// This runs the whole front end: lexing, the generic grammar pass,
    /// per-command semantic analysis, and reconciliation of the extensions
    /// the script uses against the ones it declared with `require` (or
    /// made available with a passing `ihave`).
    #[must_use]
    pub fn parse(source: &str) -> Self {
        debug!(bytes = source.len(), "parsing sieve script");
        let mut nodes = Nodes::default();
        let (root, mut commands) = parser::parse(source, &mut nodes);
        analyze::analyze(&mut commands, &mut nodes);
        extensions::resolve(&mut nodes);
        let errors = nodes.collect_errors();
        debug!(
            commands = commands.len(),
            errors = errors.len(),
            "sieve script parsed"
        );
        Self {
            source: source.to_string(),
            commands,
            nodes,
            root,
            errors,
        }
    }

    /// Returns true if the script parsed without any problem.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns all diagnostics, sorted by start offset.
    #[must_use]
    pub fn errors(&self) -> &[SieveError] {
        &self.errors
    }

    /// Returns the top-level commands in source order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns the script source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the extensions the script declared with its leading
    /// `require`, sorted.
    #[must_use]
    pub fn declared_extensions(&self) -> Vec<String> {
        let mut declared = self.nodes.extensions_at(self.root).to_vec();
        declared.sort();
        declared.dedup();
        declared
    }

    /// Returns every extension some construct of the script needs, sorted
    /// and deduplicated. Declared extensions appear here too: this is what
    /// the script uses, not what is missing.
    #[must_use]
    pub fn needed_extensions(&self) -> Vec<String> {
        let mut needed: Vec<String> = self
            .nodes
            .needed()
            .iter()
            .map(|(_, name)| name.clone())
            .collect();
        needed.sort();
        needed.dedup();
        needed
    }
}
