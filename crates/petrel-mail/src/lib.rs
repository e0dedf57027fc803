//! # petrel-mail
//!
//! Mail-model support types for the Petrel server.
//!
//! This crate provides:
//! - RFC 5322 address parsing (`Address`)
//! - IMAP mailbox name validation (`mailbox`)
//! - Comparator collations from RFC 4790 (`Collation`)
//!
//! ## Example
//!
//! ```
//! use petrel_mail::Address;
//!
//! let addr = Address::parse_single("Nest Keeper <keeper@example.org>").unwrap();
//! assert_eq!(addr.localpart(), "keeper");
//! assert_eq!(addr.domain(), "example.org");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod collation;
mod error;

pub mod mailbox;

pub use address::Address;
pub use collation::Collation;
pub use error::{Error, Result};
