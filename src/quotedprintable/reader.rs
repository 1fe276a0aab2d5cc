//! Quoted-printable reader.
//!
//! Implements RFC 2045 quoted-printable decoding with async I/O.

use crate::error::{Error, Result};
use pin_project::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, BufReader, ReadBuf};

/// A quoted-printable decoder.
///
/// Implements `AsyncRead` to decode quoted-printable data on the fly.
/// Malformed escapes surface as `io::ErrorKind::InvalidData`.
#[pin_project]
pub struct Reader<R> {
    #[pin]
    inner: BufReader<R>,
    /// Raw bytes of the line being assembled, kept across `Pending`.
    raw: Vec<u8>,
    /// Decoded bytes not yet handed out.
    line: Vec<u8>,
    line_pos: usize,
    eof: bool,
}

impl<R: AsyncRead> Reader<R> {
    /// Creates a new quoted-printable reader.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_email::quotedprintable::Reader;
    /// use tokio::io::AsyncReadExt;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let data = b"Hello=20World";
    /// let mut reader = Reader::new(&data[..]);
    /// let mut output = String::new();
    /// reader.read_to_string(&mut output).await?;
    /// assert_eq!(output, "Hello World");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            raw: Vec::new(),
            line: Vec::new(),
            line_pos: 0,
            eof: false,
        }
    }
}

impl<R: AsyncRead> AsyncRead for Reader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut this = self.project();

        loop {
            if *this.line_pos < this.line.len() {
                let pending = &this.line[*this.line_pos..];
                let n = pending.len().min(buf.remaining());
                buf.put_slice(&pending[..n]);
                *this.line_pos += n;
                return Poll::Ready(Ok(()));
            }

            if *this.eof {
                return Poll::Ready(Ok(()));
            }

            this.line.clear();
            *this.line_pos = 0;

            // Assemble one raw line from the underlying reader.
            loop {
                let chunk = ready!(this.inner.as_mut().poll_fill_buf(cx))?;
                if chunk.is_empty() {
                    *this.eof = true;
                    break;
                }

                if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
                    this.raw.extend_from_slice(&chunk[..=pos]);
                    this.inner.as_mut().consume(pos + 1);
                    break;
                }

                let len = chunk.len();
                this.raw.extend_from_slice(chunk);
                this.inner.as_mut().consume(len);
            }

            if !this.raw.is_empty() {
                let decoded = decode_line(this.raw)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                this.raw.clear();
                *this.line = decoded;
            }
        }
    }
}

/// Decodes a single line of quoted-printable data.
fn decode_line(line: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(line.len());

    let has_lf = line.ends_with(b"\n");
    let has_crlf = line.ends_with(b"\r\n");

    // Transport padding: trailing whitespace is not part of the content.
    let mut trimmed = line;
    while let [rest @ .., b'\n' | b'\r' | b' ' | b'\t'] = trimmed {
        trimmed = rest;
    }

    let is_soft_break = trimmed.ends_with(b"=");
    if is_soft_break {
        trimmed = &trimmed[..trimmed.len() - 1];
    }

    let mut i = 0;
    while i < trimmed.len() {
        match trimmed[i] {
            b'=' if i + 2 < trimmed.len() => {
                result.push(decode_hex_byte(trimmed[i + 1], trimmed[i + 2])?);
                i += 3;
            }
            b'=' => {
                // A lone '=' at the end of the data is passed through.
                result.push(b'=');
                i += 1;
            }
            b if b == b'\t' || b == b'\r' || b == b' ' || b >= 0x21 => {
                result.push(b);
                i += 1;
            }
            b => {
                return Err(Error::Encoding(format!(
                    "invalid unescaped byte: 0x{:02x}",
                    b
                )));
            }
        }
    }

    if !is_soft_break && has_lf {
        if has_crlf {
            result.extend_from_slice(b"\r\n");
        } else {
            result.push(b'\n');
        }
    }

    Ok(result)
}

/// Decodes two hex digits into a byte.
fn decode_hex_byte(high: u8, low: u8) -> Result<u8> {
    let h = decode_hex_digit(high)?;
    let l = decode_hex_digit(low)?;
    Ok((h << 4) | l)
}

/// Decodes a single hex digit.
fn decode_hex_digit(digit: u8) -> Result<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        _ => Err(Error::Encoding(format!("invalid quoted-printable hex digit: 0x{:02x}", digit))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn decode(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut reader = Reader::new(data);
        let mut output = Vec::new();
        reader.read_to_end(&mut output).await?;
        Ok(output)
    }

    #[tokio::test]
    async fn test_decode_simple() {
        assert_eq!(decode(b"Hello World").await.unwrap(), b"Hello World");
        assert_eq!(decode(b"Hello=20World").await.unwrap(), b"Hello World");
        assert_eq!(decode(b"=48=65=6C=6c=6F").await.unwrap(), b"Hello");
    }

    #[tokio::test]
    async fn test_decode_soft_line_break() {
        assert_eq!(decode(b"Hello=\r\nWorld").await.unwrap(), b"HelloWorld");
        assert_eq!(decode(b"Hello=  \nWorld").await.unwrap(), b"HelloWorld");
    }

    #[tokio::test]
    async fn test_decode_with_newlines() {
        assert_eq!(decode(b"Line1\r\nLine2\r\n").await.unwrap(), b"Line1\r\nLine2\r\n");
        assert_eq!(decode(b"trailing   \r\nspace").await.unwrap(), b"trailing\r\nspace");
    }

    #[tokio::test]
    async fn test_decode_utf8() {
        let out = decode(b"caf=C3=A9").await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "café");
    }

    #[tokio::test]
    async fn test_decode_invalid_escape() {
        let err = decode(b"bad =ZZ escape").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_decode_invalid_control_byte() {
        let err = decode(b"bell\x07").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_decode_split_reads() {
        // Deliver the input a few bytes at a time.
        let mock = tokio_test::io::Builder::new()
            .read(b"ab=")
            .read(b"3")
            .read(b"D=\r")
            .read(b"\ncd\r\n")
            .build();
        let mut reader = Reader::new(mock);
        let mut output = Vec::new();
        reader.read_to_end(&mut output).await.unwrap();
        assert_eq!(output, b"ab=cd\r\n");
    }
}
