//! Quoted-printable content transfer encoding (RFC 2045 section 6.7).

pub mod reader;
pub mod writer;

pub use reader::Reader;
pub use writer::Writer;
