//! Error types for mail-model operations.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling mail-model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Address text could not be parsed as a single mailbox.
    #[error("{0}")]
    InvalidAddress(String),
}
