//! # petrel-mime
//!
//! MIME header and bodypart parsing for the Petrel server.
//!
//! This crate provides:
//! - **Header parsing**: ordered RFC 5322 / MIME header fields with
//!   continuation-line handling
//! - **Field classification**: which header fields carry addresses
//! - **Bodypart parsing**: message bodies, with multipart children
//! - **Content types**: `type/subtype` with parameters
//!
//! ## Example
//!
//! ```
//! use petrel_mime::Header;
//!
//! let header = Header::parse_mime("Content-Type: text/plain\r\n\r\n").unwrap();
//! assert_eq!(header.get("content-type"), Some("text/plain"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod bodypart;
mod content_type;
mod error;
mod header;

pub use bodypart::{entity_body, Bodypart};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::{header_cased, FieldKind, Header, HeaderField};
