//! Multipart MIME parsing and writing.

pub mod preamble;
pub mod reader;
pub mod writer;

pub use preamble::PreambleReader;
pub use reader::{Part, Reader};
pub use writer::{check_framing, random_boundary, validate_boundary, Writer};
