//! Preamble extraction.
//!
//! Reads a multipart body up to (not including) the first `--boundary`
//! marker. The marker may arrive split over any number of reads, so the
//! reader keeps a lookahead window and never releases the bytes that could
//! still turn out to be the start of a marker.

use crate::grammar::is_ascii_space;
use pin_project::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::trace;

const DEFAULT_CHUNK_SIZE: usize = 4096;

/// An `AsyncRead` that yields the preamble of a multipart body.
///
/// End of data is reported right before the first line that starts with
/// `--boundary`, minus the whitespace (the line break) preceding it. A
/// body that starts with the marker has no preamble and reads as empty.
/// Use [`PreambleReader::into_inner`] to continue with the marker.
#[pin_project]
#[derive(Debug)]
pub struct PreambleReader<R> {
    #[pin]
    inner: R,
    marker: Vec<u8>,
    /// Bytes read from `inner`; everything before `start` has been released.
    window: Vec<u8>,
    start: usize,
    chunk_size: usize,
    /// Last byte released, used to tell whether `start` begins a line.
    last_released: Option<u8>,
    /// Unreleased bytes past which whitespace is no longer held back.
    hold_limit: usize,
    inner_eof: bool,
    done: bool,
}

impl<R: AsyncRead> PreambleReader<R> {
    /// Creates a reader stopping at `--boundary`.
    pub fn new(inner: R, boundary: &str) -> Self {
        Self::with_chunk_size(inner, boundary, DEFAULT_CHUNK_SIZE)
    }

    /// Like [`PreambleReader::new`], reading at most `chunk_size` bytes from
    /// `inner` at a time.
    pub fn with_chunk_size(inner: R, boundary: &str, chunk_size: usize) -> Self {
        Self {
            inner,
            marker: format!("--{boundary}").into_bytes(),
            window: Vec::new(),
            start: 0,
            chunk_size: chunk_size.max(1),
            last_released: None,
            hold_limit: usize::MAX,
            inner_eof: false,
            done: false,
        }
    }

    /// Bounds the lookahead window.
    ///
    /// A whitespace run is normally held back in case the marker follows
    /// it. Once more than `limit` bytes are waiting, the run is released
    /// as preamble instead, so the window stays bounded and the caller's
    /// own size check sees the bytes.
    pub fn set_hold_limit(&mut self, limit: usize) {
        self.hold_limit = limit;
    }

    /// Returns the unread bytes and the wrapped reader.
    ///
    /// Once the preamble has been read to its end, the returned bytes start
    /// with the whitespace before the marker, then the marker itself.
    pub fn into_inner(self) -> (Vec<u8>, R) {
        let rest = self.window[self.start..].to_vec();
        (rest, self.inner)
    }
}

/// Finds the first marker occurrence that starts a line.
fn find_marker(avail: &[u8], marker: &[u8], at_line_start: bool) -> Option<usize> {
    if marker.is_empty() || avail.len() < marker.len() {
        return None;
    }
    (0..=avail.len() - marker.len()).find(|&i| {
        let starts_line = if i == 0 {
            at_line_start
        } else {
            avail[i - 1] == b'\n'
        };
        starts_line && avail[i..].starts_with(marker)
    })
}

impl<R: AsyncRead> AsyncRead for PreambleReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut this = self.project();

        loop {
            if *this.done || buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }

            let avail = &this.window[*this.start..];
            let at_line_start = this.last_released.map_or(true, |b| b == b'\n');

            let releasable = if let Some(idx) = find_marker(avail, this.marker, at_line_start) {
                let mut end = idx;
                while end > 0 && is_ascii_space(avail[end - 1]) {
                    end -= 1;
                }
                trace!(offset = idx, preamble = end, "boundary marker found");
                if end == 0 {
                    *this.done = true;
                    return Poll::Ready(Ok(()));
                }
                Some(end)
            } else if *this.inner_eof {
                if avail.is_empty() {
                    *this.done = true;
                    return Poll::Ready(Ok(()));
                }
                Some(avail.len())
            } else {
                // Hold back a possible line break plus a partial marker, and
                // any whitespace run that may end up trimmed.
                let keep = this.marker.len() + 2;
                let mut end = avail.len().saturating_sub(keep);
                if avail.len() <= *this.hold_limit {
                    while end > 0 && is_ascii_space(avail[end - 1]) {
                        end -= 1;
                    }
                }
                (end > 0).then_some(end)
            };

            if let Some(end) = releasable {
                let n = end.min(buf.remaining());
                buf.put_slice(&avail[..n]);
                *this.last_released = Some(avail[n - 1]);
                *this.start += n;
                return Poll::Ready(Ok(()));
            }

            // Need more input: compact the window and read another chunk.
            if *this.start > 0 {
                this.window.drain(..*this.start);
                *this.start = 0;
            }
            let filled = this.window.len();
            this.window.resize(filled + *this.chunk_size, 0);
            let mut read_buf = ReadBuf::new(&mut this.window[filled..]);
            let res = this.inner.as_mut().poll_read(cx, &mut read_buf);
            let n = read_buf.filled().len();
            this.window.truncate(filled + n);
            ready!(res)?;
            trace!(bytes = n, window = this.window.len(), "preamble lookahead");
            if n == 0 {
                *this.inner_eof = true;
            }
        }
    }
}
