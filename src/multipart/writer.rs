//! Multipart MIME writer.
//!
//! Implements RFC 2046 delimiter generation with async I/O. Each part is
//! written by the caller between calls to [`Writer::next_part`].

use crate::error::{Error, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A multipart MIME writer.
pub struct Writer<W> {
    writer: W,
    boundary: String,
    written: u64,
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    /// Creates a new multipart writer using `boundary`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_email::multipart::Writer;
    /// use tokio::io::AsyncWriteExt;
    ///
    /// # async fn example() -> tokio_email::Result<()> {
    /// let mut output = Vec::new();
    /// let mut writer = Writer::new(&mut output, "XYZ")?;
    /// writer.next_part().await?;
    /// writer.get_mut().write_all(b"Content-Type: text/plain\r\n\r\nhi").await?;
    /// writer.close().await?;
    /// assert_eq!(output, b"\r\n--XYZ\r\nContent-Type: text/plain\r\n\r\nhi\r\n--XYZ--\r\n");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(writer: W, boundary: &str) -> Result<Self> {
        validate_boundary(boundary)?;
        Ok(Self::with_boundary(writer, boundary))
    }

    /// Creates a writer that accepts any boundary a reader could have
    /// matched, such as one taken from a parsed message.
    ///
    /// Only boundaries that cannot frame a part are rejected: empty ones
    /// and ones containing a line break.
    pub fn lenient(writer: W, boundary: &str) -> Result<Self> {
        check_framing(boundary)?;
        Ok(Self::with_boundary(writer, boundary))
    }

    fn with_boundary(writer: W, boundary: &str) -> Self {
        Self {
            writer,
            boundary: boundary.to_string(),
            written: 0,
        }
    }

    /// Returns the writer's boundary string.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Returns the number of delimiter bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns the sink for writing the current part.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Writes the delimiter that opens the next part.
    pub async fn next_part(&mut self) -> Result<()> {
        let delimiter = format!("\r\n--{}\r\n", self.boundary);
        self.writer.write_all(delimiter.as_bytes()).await?;
        self.written += delimiter.len() as u64;
        Ok(())
    }

    /// Writes the close delimiter and returns the sink.
    pub async fn close(mut self) -> Result<W> {
        let delimiter = format!("\r\n--{}--\r\n", self.boundary);
        self.writer.write_all(delimiter.as_bytes()).await?;
        self.written += delimiter.len() as u64;
        Ok(self.writer)
    }
}

/// Checks a boundary against RFC 2046 section 5.1.1.
///
/// The boundary must be 1-70 characters from the `bcharsnospace` set plus
/// space, and may not end with a space.
pub fn validate_boundary(boundary: &str) -> Result<()> {
    if boundary.is_empty() || boundary.len() > 70 {
        return Err(Error::Multipart(format!(
            "invalid boundary length: {}",
            boundary.len()
        )));
    }

    for (i, ch) in boundary.chars().enumerate() {
        let valid = ch.is_ascii_alphanumeric()
            || matches!(ch, '\'' | '(' | ')' | '+' | '_' | ',' | '-' | '.' | '/' | ':' | '=' | '?')
            || (ch == ' ' && i != boundary.len() - 1);

        if !valid {
            return Err(Error::Multipart(format!(
                "invalid boundary character: {:?}",
                ch
            )));
        }
    }
    Ok(())
}

/// Checks that a boundary can frame parts at all.
///
/// This is the rule for boundaries that came off the wire. New boundaries
/// should pass [`validate_boundary`].
pub fn check_framing(boundary: &str) -> Result<()> {
    if boundary.is_empty() {
        return Err(Error::Multipart("empty boundary".to_string()));
    }
    if boundary.contains(|c: char| c == '\r' || c == '\n') {
        return Err(Error::Multipart(format!(
            "boundary contains a line break: {:?}",
            boundary
        )));
    }
    Ok(())
}

/// Generates a random boundary string.
pub fn random_boundary() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writer_basic() {
        let mut output = Vec::new();
        let mut writer = Writer::new(&mut output, "simple-boundary").unwrap();

        writer.next_part().await.unwrap();
        writer.get_mut().write_all(b"one").await.unwrap();
        writer.next_part().await.unwrap();
        writer.get_mut().write_all(b"two").await.unwrap();
        assert_eq!(writer.written(), 2 * "\r\n--simple-boundary\r\n".len() as u64);
        writer.close().await.unwrap();

        let result = String::from_utf8(output).unwrap();
        assert_eq!(
            result,
            "\r\n--simple-boundary\r\none\r\n--simple-boundary\r\ntwo\r\n--simple-boundary--\r\n"
        );
    }

    #[tokio::test]
    async fn test_no_parts() {
        let mut output = Vec::new();
        let writer = Writer::new(&mut output, "b").unwrap();
        writer.close().await.unwrap();
        assert_eq!(output, b"\r\n--b--\r\n");
    }

    #[test]
    fn test_boundary_validation() {
        assert!(validate_boundary("simple-boundary").is_ok());
        assert!(validate_boundary("with space").is_ok());
        assert!(validate_boundary(&"a".repeat(70)).is_ok());

        assert!(validate_boundary(&"a".repeat(71)).is_err());
        assert!(validate_boundary("").is_err());
        assert!(validate_boundary("trailing ").is_err());
        assert!(validate_boundary("semi;colon").is_err());
        assert!(Writer::new(Vec::new(), "bad\"quote").is_err());
    }

    #[tokio::test]
    async fn test_lenient_writer_keeps_wire_boundaries() {
        let mut output = Vec::new();
        let mut writer = Writer::lenient(&mut output, "a#b;c").unwrap();
        writer.next_part().await.unwrap();
        writer.close().await.unwrap();
        assert_eq!(output, b"\r\n--a#b;c\r\n\r\n--a#b;c--\r\n");

        assert!(Writer::new(Vec::new(), "a#b;c").is_err());
        assert!(Writer::lenient(Vec::new(), "").is_err());
        assert!(Writer::lenient(Vec::new(), "two\r\nlines").is_err());
        assert!(check_framing(&"x".repeat(200)).is_ok());
    }

    #[test]
    fn test_random_boundary() {
        let a = random_boundary();
        let b = random_boundary();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(validate_boundary(&a).is_ok());
    }
}
