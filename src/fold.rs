//! Line-folding writers.
//!
//! [`HeaderFolder`] folds header text at a maximum line length, preferring
//! to break before a space. [`Base64Folder`] hard-wraps base64 text at a
//! fixed column. Both forward bytes to the wrapped writer as they arrive and
//! keep nothing but the current column and any line break still owed.

use pin_project::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncWrite;

/// Maximum body line length for base64 and quoted-printable output.
pub const MAX_BODY_LINE_LENGTH: usize = 76;

/// Recommended header line length, RFC 5322 section 2.1.1.
pub const MAX_HEADER_LINE_LENGTH: usize = 78;

/// Hard header line length limit, RFC 5322 section 2.1.1.
pub const MAX_HEADER_TOTAL_LENGTH: usize = 998;

/// Folding break followed by the continuation indent.
const INDENTED_BREAK: &[u8] = b"\r\n ";
/// Plain line break.
const BREAK: &[u8] = b"\r\n";

/// Line break bookkeeping shared by both folders.
#[derive(Debug)]
struct Fold {
    col: usize,
    max: usize,
    /// Break sequence being written and how much of it is done.
    owed: Option<(&'static [u8], usize)>,
}

impl Fold {
    fn new(max: usize) -> Self {
        Self {
            col: 0,
            max: max.max(2),
            owed: None,
        }
    }

    fn poll_owed<W: AsyncWrite>(
        &mut self,
        mut inner: Pin<&mut W>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        while let Some((seq, done)) = self.owed {
            let n = ready!(inner.as_mut().poll_write(cx, &seq[done..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            if done + n == seq.len() {
                self.owed = None;
                // The indent space counts towards the new line.
                self.col = seq.len() - BREAK.len();
            } else {
                self.owed = Some((seq, done + n));
            }
        }
        Poll::Ready(Ok(()))
    }

    /// Writes the part of `buf` that fits on the current line.
    ///
    /// `choose` gets the pending bytes, the room left on the line and
    /// whether the line has only just started. It returns how many bytes to
    /// write before breaking and the break sequence to use. A split of zero
    /// breaks first; it must not be returned for a fresh line.
    fn poll_segment<W: AsyncWrite>(
        &mut self,
        mut inner: Pin<&mut W>,
        cx: &mut Context<'_>,
        buf: &[u8],
        choose: impl Fn(&[u8], usize, bool) -> (usize, &'static [u8]),
    ) -> Poll<io::Result<usize>> {
        loop {
            ready!(self.poll_owed(inner.as_mut(), cx))?;
            if buf.is_empty() {
                return Poll::Ready(Ok(0));
            }

            let room = self.max.saturating_sub(self.col);
            if buf.len() <= room {
                let n = ready!(inner.as_mut().poll_write(cx, buf))?;
                self.col += n;
                return Poll::Ready(Ok(n));
            }

            let (split, seq) = choose(buf, room, self.col <= 1);
            if split == 0 {
                self.owed = Some((seq, 0));
                continue;
            }

            let n = ready!(inner.as_mut().poll_write(cx, &buf[..split]))?;
            self.col += n;
            if n == split {
                self.owed = Some((seq, 0));
            }
            return Poll::Ready(Ok(n));
        }
    }
}

/// Folds header text so that no line exceeds a maximum length.
///
/// When a write would overflow the line, the text is broken before the
/// last space that fits; that space then starts the continuation line. With
/// no usable space the text is broken at the limit and the continuation is
/// indented by one inserted space. Line terminators are not written through
/// the folder: callers write them to the inner writer and call
/// [`HeaderFolder::start_line`].
#[pin_project]
#[derive(Debug)]
pub struct HeaderFolder<W> {
    #[pin]
    inner: W,
    fold: Fold,
}

impl<W: AsyncWrite> HeaderFolder<W> {
    /// Creates a folder with the given maximum line length (excluding CRLF).
    pub fn new(inner: W, max_line_len: usize) -> Self {
        Self {
            inner,
            fold: Fold::new(max_line_len),
        }
    }

    /// Resets the column for a new header line.
    pub fn start_line(&mut self) {
        self.fold.col = 0;
    }

    /// Returns a mutable reference to the wrapped writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consumes the folder, returning the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn header_split(buf: &[u8], room: usize, fresh: bool) -> (usize, &'static [u8]) {
    match buf[..room].iter().rposition(|&b| b == b' ') {
        Some(space) if space > 0 => (space, BREAK),
        _ if !fresh && buf[0] == b' ' => (0, BREAK),
        _ => (room, INDENTED_BREAK),
    }
}

impl<W: AsyncWrite> AsyncWrite for HeaderFolder<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        this.fold.poll_segment(this.inner, cx, buf, header_split)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut this = self.project();
        ready!(this.fold.poll_owed(this.inner.as_mut(), cx))?;
        this.inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut this = self.project();
        ready!(this.fold.poll_owed(this.inner.as_mut(), cx))?;
        this.inner.poll_shutdown(cx)
    }
}

/// Hard-wraps base64 text at a fixed column with bare CRLF breaks.
#[pin_project]
#[derive(Debug)]
pub struct Base64Folder<W> {
    #[pin]
    inner: W,
    fold: Fold,
}

impl<W: AsyncWrite> Base64Folder<W> {
    /// Creates a folder breaking lines at `max_line_len` characters.
    pub fn new(inner: W, max_line_len: usize) -> Self {
        Self {
            inner,
            fold: Fold::new(max_line_len),
        }
    }

    /// Consumes the folder, returning the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn base64_split(_buf: &[u8], room: usize, _fresh: bool) -> (usize, &'static [u8]) {
    (room, BREAK)
}

impl<W: AsyncWrite> AsyncWrite for Base64Folder<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        this.fold.poll_segment(this.inner, cx, buf, base64_split)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut this = self.project();
        ready!(this.fold.poll_owed(this.inner.as_mut(), cx))?;
        this.inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut this = self.project();
        ready!(this.fold.poll_owed(this.inner.as_mut(), cx))?;
        this.inner.poll_shutdown(cx)
    }
}
