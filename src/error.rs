//! Error types for the email crate.

use std::io;
use thiserror::Error;

/// The main error type for the email crate.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A header line that is not `Field: value` or a valid continuation.
    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    /// The header block has no Content-Type field.
    ///
    /// This is a recoverable signal: the node is treated as a plain body.
    #[error("Message missing header field: Content-Type")]
    MissingContentType,

    /// Media type error
    #[error("Media type error: {0}")]
    MediaType(String),

    /// A multipart media type without a boundary parameter.
    #[error("Multipart media type {media_type:?} has no boundary parameter")]
    MissingBoundary {
        /// The declared media type.
        media_type: String,
    },

    /// A child part of a multipart body could not be parsed.
    #[error("Malformed part #{index}: {source}")]
    MalformedPart {
        /// Zero-based position of the part within its parent.
        index: usize,
        /// What went wrong while reading the part.
        source: Box<Error>,
    },

    /// Encoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The random source used for Message-Id generation failed.
    #[error("Message-Id generation failed: {0}")]
    IdGeneration(String),

    /// Multipart error
    #[error("Multipart error: {0}")]
    Multipart(String),

    /// The message nests deeper than the parser allows.
    #[error("Message nesting exceeds {limit} levels")]
    NestingTooDeep {
        /// The configured depth limit.
        limit: usize,
    },

    /// The payload stored in a node disagrees with its Content-Type.
    #[error("Content-Type {media_type:?} does not match a {payload} payload")]
    PayloadMismatch {
        /// The media type from the node's header.
        media_type: String,
        /// The kind of payload actually stored.
        payload: &'static str,
    },

    /// Message too large
    #[error("Message too large")]
    MessageTooLarge,

    /// Serialization stopped on an I/O failure after `written` bytes.
    #[error("Write failed after {written} bytes: {source}")]
    Write {
        /// Bytes successfully handed to the sink before the failure.
        written: u64,
        /// The underlying I/O error.
        source: io::Error,
    },
}

impl Error {
    /// Reports whether a caller can keep going after this error.
    ///
    /// `MissingContentType` means "plain body" and `MalformedPart` leaves
    /// the parts before it intact.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::MissingContentType | Error::MalformedPart { .. })
    }

    /// Maps an I/O error raised by a decoding reader back to `Encoding`.
    pub(crate) fn from_body_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::InvalidData {
            Error::Encoding(err.to_string())
        } else {
            Error::Io(err)
        }
    }
}

/// Specialized Result type for email operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = Error::MalformedHeader("no colon here".to_string());
        assert_eq!(err.to_string(), "Malformed header line: \"no colon here\"");

        let err = Error::MissingContentType;
        assert_eq!(err.to_string(), "Message missing header field: Content-Type");

        let err = Error::MissingBoundary {
            media_type: "multipart/mixed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Multipart media type \"multipart/mixed\" has no boundary parameter"
        );

        let err = Error::MalformedPart {
            index: 1,
            source: Box::new(Error::Multipart("unexpected EOF".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Malformed part #1: Multipart error: unexpected EOF"
        );

        let err = Error::NestingTooDeep { limit: 8 };
        assert_eq!(err.to_string(), "Message nesting exceeds 8 levels");

        let err = Error::MessageTooLarge;
        assert_eq!(err.to_string(), "Message too large");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_body_read_mapping() {
        let err = Error::from_body_read(io::Error::new(io::ErrorKind::InvalidData, "bad =ZZ"));
        assert!(matches!(err, Error::Encoding(_)));

        let err = Error::from_body_read(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::MissingContentType.is_recoverable());
        assert!(Error::MalformedPart {
            index: 0,
            source: Box::new(Error::MessageTooLarge)
        }
        .is_recoverable());
        assert!(!Error::MalformedHeader(String::new()).is_recoverable());
        assert!(!Error::IdGeneration("no entropy".to_string()).is_recoverable());
    }

    #[test]
    fn test_write_error_reports_count() {
        let err = Error::Write {
            written: 42,
            source: io::Error::new(io::ErrorKind::BrokenPipe, "closed"),
        };
        assert!(matches!(err, Error::Write { written: 42, .. }));
        assert_eq!(err.to_string(), "Write failed after 42 bytes: closed");
    }
}
