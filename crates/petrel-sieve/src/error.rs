//! Diagnostic type for script problems.

use thiserror::Error;

/// A problem found while parsing or analysing a script.
///
/// Offsets are zero-based byte positions into the source buffer. The
/// production name says which grammatical construct the problem was found
/// on, e.g. `command` or `argument`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[error("In {production} at offset {start}: {message}")]
pub struct SieveError {
    /// Byte offset where the offending production starts.
    pub start: usize,
    /// Byte offset just past the offending production.
    pub end: usize,
    /// Name of the production the error is attached to.
    pub production: &'static str,
    /// Human-readable description of the problem.
    pub message: String,
}
