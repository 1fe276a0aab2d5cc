//! Content-Transfer-Encoding handling.
//!
//! The parser wraps a body stream in the decoder named by the
//! `Content-Transfer-Encoding` field; the serializer picks an encoding from
//! the media type when none is set.

use crate::quotedprintable;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use pin_project::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, BufReader, ReadBuf};

/// Accepts padded and unpadded input, as seen in the wild.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

const READ_CHUNK: usize = 4096;

/// A boxed, type-erased body stream.
pub type BodyReader<'a> = Box<dyn AsyncBufRead + Unpin + Send + 'a>;

/// The value of a `Content-Transfer-Encoding` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`
    SevenBit,
    /// `8bit`
    EightBit,
    /// `binary`
    Binary,
    /// `quoted-printable`
    QuotedPrintable,
    /// `base64`
    Base64,
    /// Anything else, kept verbatim.
    Other(String),
}

impl TransferEncoding {
    /// Parses a field value, ignoring case and surrounding whitespace.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "7bit" => TransferEncoding::SevenBit,
            "8bit" => TransferEncoding::EightBit,
            "binary" => TransferEncoding::Binary,
            "quoted-printable" => TransferEncoding::QuotedPrintable,
            "base64" => TransferEncoding::Base64,
            _ => TransferEncoding::Other(value.to_string()),
        }
    }

    /// The encoding the serializer applies to a body of `media_type`.
    pub fn for_media_type(media_type: &str) -> Self {
        if media_type.starts_with("text/") || media_type == "text" {
            TransferEncoding::QuotedPrintable
        } else {
            TransferEncoding::Base64
        }
    }

    /// The canonical field value.
    pub fn as_str(&self) -> &str {
        match self {
            TransferEncoding::SevenBit => "7bit",
            TransferEncoding::EightBit => "8bit",
            TransferEncoding::Binary => "binary",
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Base64 => "base64",
            TransferEncoding::Other(value) => value,
        }
    }

    /// Reports whether reading a body in this encoding needs a decoder.
    pub fn is_decoded_on_read(&self) -> bool {
        matches!(self, TransferEncoding::QuotedPrintable | TransferEncoding::Base64)
    }

    /// Wraps `reader` in the matching decoder, if any.
    pub fn decoding_reader<'a>(&self, reader: BodyReader<'a>) -> BodyReader<'a> {
        match self {
            TransferEncoding::QuotedPrintable => {
                Box::new(BufReader::new(quotedprintable::Reader::new(reader)))
            }
            TransferEncoding::Base64 => Box::new(BufReader::new(Base64Reader::new(reader))),
            _ => reader,
        }
    }
}

/// A streaming base64 decoder.
///
/// Line breaks and other whitespace in the encoded stream are skipped;
/// any other byte outside the base64 alphabet is `InvalidData`.
#[pin_project]
pub struct Base64Reader<R> {
    #[pin]
    inner: R,
    /// Encoded characters not yet forming a whole quantum.
    quantum: Vec<u8>,
    decoded: Vec<u8>,
    decoded_pos: usize,
    eof: bool,
}

impl<R: AsyncRead> Base64Reader<R> {
    /// Creates a new base64 decoder over `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            quantum: Vec::new(),
            decoded: Vec::new(),
            decoded_pos: 0,
            eof: false,
        }
    }
}

impl<R: AsyncRead> AsyncRead for Base64Reader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut this = self.project();

        loop {
            if *this.decoded_pos < this.decoded.len() {
                let pending = &this.decoded[*this.decoded_pos..];
                let n = pending.len().min(buf.remaining());
                buf.put_slice(&pending[..n]);
                *this.decoded_pos += n;
                return Poll::Ready(Ok(()));
            }

            if *this.eof {
                return Poll::Ready(Ok(()));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let mut chunk_buf = ReadBuf::new(&mut chunk);
            ready!(this.inner.as_mut().poll_read(cx, &mut chunk_buf))?;
            let filled = chunk_buf.filled();

            if filled.is_empty() {
                *this.eof = true;
            }
            this.quantum
                .extend(filled.iter().copied().filter(|b| !b.is_ascii_whitespace()));

            // Decode whole quanta now, the remainder once the input ends.
            let ready_len = if *this.eof {
                this.quantum.len()
            } else {
                this.quantum.len() / 4 * 4
            };
            if ready_len == 0 {
                continue;
            }

            this.decoded.clear();
            *this.decoded_pos = 0;
            LENIENT
                .decode_vec(&this.quantum[..ready_len], this.decoded)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            this.quantum.drain(..ready_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_all(encoding: TransferEncoding, data: &'static [u8]) -> io::Result<Vec<u8>> {
        let mut reader = encoding.decoding_reader(Box::new(data));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await?;
        Ok(out)
    }

    #[test]
    fn test_parse() {
        assert_eq!(TransferEncoding::parse(" Base64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("QUOTED-PRINTABLE"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(
            TransferEncoding::parse("x-uuencode"),
            TransferEncoding::Other("x-uuencode".to_string())
        );
        assert_eq!(TransferEncoding::parse("x-uuencode").as_str(), "x-uuencode");
    }

    #[test]
    fn test_for_media_type() {
        assert_eq!(
            TransferEncoding::for_media_type("text/html"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(
            TransferEncoding::for_media_type("image/png"),
            TransferEncoding::Base64
        );
        assert_eq!(
            TransferEncoding::for_media_type("textual/thing"),
            TransferEncoding::Base64
        );
    }

    #[tokio::test]
    async fn test_base64_decoding_with_line_breaks() {
        let out = read_all(TransferEncoding::Base64, b"SGVsbG8g\r\nV29y\r\nbGQ=\r\n")
            .await
            .unwrap();
        assert_eq!(out, b"Hello World");
    }

    #[tokio::test]
    async fn test_base64_unpadded_tail() {
        let out = read_all(TransferEncoding::Base64, b"SGk").await.unwrap();
        assert_eq!(out, b"Hi");
    }

    #[tokio::test]
    async fn test_base64_invalid() {
        let err = read_all(TransferEncoding::Base64, b"SGVs*G8=").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_base64_split_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"SG")
            .read(b"Vsb")
            .read(b"G8=")
            .build();
        let mut reader = Base64Reader::new(mock);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"Hello");
    }

    #[tokio::test]
    async fn test_identity_encodings() {
        let out = read_all(TransferEncoding::SevenBit, b"as is=20").await.unwrap();
        assert_eq!(out, b"as is=20");
    }

    #[tokio::test]
    async fn test_quoted_printable_decoding() {
        let out = read_all(TransferEncoding::QuotedPrintable, b"a=3Db=\r\nc")
            .await
            .unwrap();
        assert_eq!(out, b"a=bc");
    }
}
