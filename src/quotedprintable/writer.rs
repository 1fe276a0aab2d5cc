//! Quoted-printable writer.
//!
//! Implements RFC 2045 quoted-printable encoding with async I/O.

use pin_project::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncWrite;

const LINE_MAX_LEN: usize = 76;
const UPPER_HEX: &[u8] = b"0123456789ABCDEF";

/// A quoted-printable encoder.
///
/// Implements `AsyncWrite` to encode data to quoted-printable on the fly.
/// Encoded lines are handed to the inner writer as soon as they are
/// complete; the final partial line is only emitted by [`Writer::finish`]
/// or `shutdown`, because trailing whitespace must be escaped once the end
/// of the line is known.
#[pin_project]
pub struct Writer<W> {
    #[pin]
    inner: W,
    /// Binary mode treats input as pure binary (doesn't handle line endings specially).
    pub binary: bool,
    encoder: LineEncoder,
    out_pos: usize,
}

/// Line assembly state, kept apart from the pinned sink.
struct LineEncoder {
    line: [u8; 78], // Buffer for current line (76 + CRLF)
    line_len: usize,
    pending_cr: bool,
    /// Completed lines waiting for the inner writer.
    out: Vec<u8>,
}

impl LineEncoder {
    fn push(&mut self, b: u8, binary: bool) {
        if !binary && (b == b'\n' || b == b'\r') {
            // CRLF, lone CR and lone LF all end the line once.
            if self.pending_cr && b == b'\n' {
                self.pending_cr = false;
                return;
            }
            self.pending_cr = b == b'\r';
            self.escape_last_whitespace();
            self.end_line(false);
            return;
        }

        self.pending_cr = false;
        if (b'!'..=b'~').contains(&b) && b != b'=' || is_whitespace(b) {
            if self.line_len == LINE_MAX_LEN - 1 {
                self.end_line(true);
            }
            self.line[self.line_len] = b;
            self.line_len += 1;
        } else {
            self.encode(b);
        }
    }

    fn encode(&mut self, b: u8) {
        if LINE_MAX_LEN - 1 - self.line_len < 3 {
            self.end_line(true);
        }
        self.line[self.line_len] = b'=';
        self.line[self.line_len + 1] = UPPER_HEX[(b >> 4) as usize];
        self.line[self.line_len + 2] = UPPER_HEX[(b & 0x0F) as usize];
        self.line_len += 3;
    }

    /// Whitespace may not end an encoded line; escape it instead.
    fn escape_last_whitespace(&mut self) {
        if self.line_len == 0 {
            return;
        }
        let last = self.line[self.line_len - 1];
        if is_whitespace(last) {
            self.line_len -= 1;
            self.encode(last);
        }
    }

    fn end_line(&mut self, soft: bool) {
        if soft {
            self.line[self.line_len] = b'=';
            self.line_len += 1;
        }
        self.out.extend_from_slice(&self.line[..self.line_len]);
        self.out.extend_from_slice(b"\r\n");
        self.line_len = 0;
    }

    /// Moves the unterminated last line to the output.
    fn finish_line(&mut self) {
        if self.line_len > 0 {
            self.escape_last_whitespace();
            self.out.extend_from_slice(&self.line[..self.line_len]);
            self.line_len = 0;
        }
    }
}

impl<W: AsyncWrite> Writer<W> {
    /// Creates a new quoted-printable writer.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_email::quotedprintable::Writer;
    /// use tokio::io::AsyncWriteExt;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut output = Vec::new();
    /// let mut writer = Writer::new(&mut output);
    /// writer.write_all("café".as_bytes()).await?;
    /// writer.finish().await?;
    /// assert_eq!(output, b"caf=C3=A9");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            binary: false,
            encoder: LineEncoder {
                line: [0; 78],
                line_len: 0,
                pending_cr: false,
                out: Vec::new(),
            },
            out_pos: 0,
        }
    }

    fn poll_drain(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut this = self.project();
        let out = &mut this.encoder.out;
        while *this.out_pos < out.len() {
            let n = ready!(this.inner.as_mut().poll_write(cx, &out[*this.out_pos..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write encoded line",
                )));
            }
            *this.out_pos += n;
        }
        out.clear();
        *this.out_pos = 0;
        Poll::Ready(Ok(()))
    }

    /// Emits the final partial line and flushes, leaving the sink open.
    pub fn poll_finish(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.as_mut().project().encoder.finish_line();
        ready!(self.as_mut().poll_drain(cx))?;
        self.project().inner.poll_flush(cx)
    }
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    /// Emits the final partial line and flushes the inner writer.
    ///
    /// Unlike `shutdown`, the inner writer stays open, so more data can
    /// follow the encoded body (for example a multipart delimiter).
    pub async fn finish(&mut self) -> io::Result<()> {
        futures::future::poll_fn(|cx| Pin::new(&mut *self).poll_finish(cx)).await
    }
}

impl<W: AsyncWrite> AsyncWrite for Writer<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        ready!(self.as_mut().poll_drain(cx))?;

        let this = self.project();
        for &b in buf {
            this.encoder.push(b, *this.binary);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_drain(cx))?;
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_finish(cx))?;
        self.project().inner.poll_shutdown(cx)
    }
}

/// Checks if a byte is whitespace (space or tab).
fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\t'
}
