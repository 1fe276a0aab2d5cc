//! Async RFC 5322 / MIME message parsing and serialization.
//!
//! This crate reads an email into a tree of [`Message`] nodes and writes a
//! tree back out:
//! - Header blocks with RFC 2047 encoded words and line folding
//! - Multipart bodies (RFC 2046) with preamble and epilogue
//! - Encapsulated `message/*` parts
//! - Quoted-printable and base64 transfer encodings (RFC 2045)
//! - Message-Id generation and helpers for common message shapes
//!
//! All I/O operations are async-first using tokio.
//!
//! ```
//! # async fn example() -> tokio_email::Result<()> {
//! let raw = b"Subject: Hello\r\nContent-Type: text/plain\r\n\r\nHi there";
//! let message = tokio_email::parse_message(&raw[..]).await?;
//! assert_eq!(message.header.subject(), "Hello");
//! assert_eq!(message.body(), Some(&b"Hi there"[..]));
//! # Ok(())
//! # }
//! ```

pub mod builder;
mod counting;
pub mod encoded_word;
pub mod error;
pub mod fold;
pub mod grammar;
pub mod header;
pub mod media_type;
pub mod message;
pub mod message_id;
pub mod mime_type;
pub mod multipart;
pub mod parser;
pub mod quotedprintable;
mod report;
mod serialize;
pub mod transfer;

// Re-export commonly used types
pub use encoded_word::{WordDecoder, WordEncoder};
pub use error::{Error, Result};
pub use fold::{MAX_BODY_LINE_LENGTH, MAX_HEADER_LINE_LENGTH, MAX_HEADER_TOTAL_LENGTH};
pub use header::{Header, HeaderLimits};
pub use media_type::{format_media_type, parse_media_type};
pub use message::{Message, Payload};
pub use parser::{parse_message, Parsed, Parser, ParserConfig};
pub use transfer::TransferEncoding;
