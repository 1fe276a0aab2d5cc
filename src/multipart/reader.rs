//! Multipart MIME reader.
//!
//! Implements RFC 2046 multipart parsing with async I/O.

use crate::error::{Error, Result};
use crate::header::{Header, HeaderLimits};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::trace;

const PEEK_BUFFER_SIZE: usize = 4096;
const MAX_PART_SIZE: usize = 32 << 20; // 32 MB

/// A multipart MIME reader.
pub struct Reader<R> {
    buf_reader: BufReader<R>,
    dash_boundary: Vec<u8>, // "--boundary"
    /// A delimiter line read while scanning the previous part's body.
    peeked: Option<Vec<u8>>,
    header_limits: HeaderLimits,
    max_part_size: usize,
    parts_read: usize,
    closed: bool,
}

/// A single part in a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// The header block of this part, with RFC 2047 words decoded.
    pub header: Header,
    /// The raw body of this part, excluding the line break that precedes the
    /// next delimiter.
    pub body: Vec<u8>,
}

/// How a line relates to the boundary.
#[derive(Debug, PartialEq, Eq)]
enum Delimiter {
    Part,
    Close,
    None,
}

impl<R: AsyncRead + Unpin> Reader<R> {
    /// Creates a new multipart reader with the given boundary.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_email::multipart::Reader;
    ///
    /// # async fn example() -> tokio_email::Result<()> {
    /// let data = b"--b\r\nContent-Type: text/plain\r\n\r\nhi\r\n--b--\r\n";
    /// let mut reader = Reader::new(&data[..], "b");
    /// let part = reader.next_part().await?.unwrap();
    /// assert_eq!(part.body, b"hi");
    /// assert!(reader.next_part().await?.is_none());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(r: R, boundary: &str) -> Self {
        Self::with_buffer_size(r, boundary, PEEK_BUFFER_SIZE)
    }

    /// Creates a reader whose internal buffer holds `size` bytes.
    pub fn with_buffer_size(r: R, boundary: &str, size: usize) -> Self {
        Self {
            buf_reader: BufReader::with_capacity(size.max(1), r),
            dash_boundary: format!("--{boundary}").into_bytes(),
            peeked: None,
            header_limits: HeaderLimits::default(),
            max_part_size: MAX_PART_SIZE,
            parts_read: 0,
            closed: false,
        }
    }

    /// Sets the limits applied to each part's header block.
    pub fn set_header_limits(&mut self, limits: HeaderLimits) {
        self.header_limits = limits;
    }

    /// Sets the largest part body accepted before `MessageTooLarge`.
    pub fn set_max_part_size(&mut self, size: usize) {
        self.max_part_size = size;
    }

    /// Returns the number of parts returned so far.
    pub fn parts_read(&self) -> usize {
        self.parts_read
    }

    /// Returns the next part in the multipart body.
    ///
    /// Lines before the first delimiter are skipped. Returns `None` once the
    /// close delimiter has been read. Running out of input before the close
    /// delimiter is an error.
    pub async fn next_part(&mut self) -> Result<Option<Part>> {
        if self.dash_boundary.len() <= 2 {
            return Err(Error::Multipart("boundary is empty".to_string()));
        }
        if self.closed {
            return Ok(None);
        }

        loop {
            let line = match self.peeked.take() {
                Some(line) => line,
                None => {
                    let mut line = Vec::new();
                    let cap = self.max_part_size.saturating_add(self.delimiter_room());
                    if self.read_line(&mut line, cap).await? == 0 {
                        return Err(Error::Multipart(
                            "unexpected EOF before the close delimiter".to_string(),
                        ));
                    }
                    line
                }
            };

            match self.classify(&line) {
                Delimiter::Part => {
                    let header = Header::read_from(&mut self.buf_reader, &self.header_limits).await?;
                    let body = self.read_part_data().await?;
                    self.parts_read += 1;
                    trace!(part = self.parts_read, bytes = body.len(), "read multipart part");
                    return Ok(Some(Part { header, body }));
                }
                Delimiter::Close => {
                    self.closed = true;
                    return Ok(None);
                }
                // Preamble
                Delimiter::None => continue,
            }
        }
    }

    /// Reads everything after the close delimiter line.
    ///
    /// An epilogue larger than the part size limit is `MessageTooLarge`.
    pub async fn read_epilogue(&mut self) -> Result<Vec<u8>> {
        let mut epilogue = self.peeked.take().unwrap_or_default();
        let limit = self.max_part_size.saturating_sub(epilogue.len()) as u64 + 1;
        (&mut self.buf_reader)
            .take(limit)
            .read_to_end(&mut epilogue)
            .await?;
        if epilogue.len() > self.max_part_size {
            return Err(Error::MessageTooLarge);
        }
        Ok(epilogue)
    }

    /// Reads one line, taking at most `cap` bytes from the source.
    ///
    /// A line cut short by the cap does not end in `\n`.
    async fn read_line(&mut self, line: &mut Vec<u8>, cap: usize) -> Result<usize> {
        let n = (&mut self.buf_reader)
            .take(cap as u64)
            .read_until(b'\n', line)
            .await?;
        if n == cap && !line.ends_with(b"\n") {
            return Err(Error::MessageTooLarge);
        }
        Ok(n)
    }

    /// Longest delimiter line without trailing whitespace: `--boundary--\r\n`.
    fn delimiter_room(&self) -> usize {
        self.dash_boundary.len() + 4
    }

    /// Checks for `--boundary` or `--boundary--` followed only by linear
    /// whitespace up to the end of the line.
    fn classify(&self, line: &[u8]) -> Delimiter {
        let Some(rest) = line.strip_prefix(self.dash_boundary.as_slice()) else {
            return Delimiter::None;
        };
        let (kind, rest) = match rest.strip_prefix(b"--") {
            Some(rest) => (Delimiter::Close, rest),
            None => (Delimiter::Part, rest),
        };
        let rest = skip_lwsp_char(rest);
        if rest.is_empty() || rest == b"\r\n" || rest == b"\n" {
            kind
        } else {
            Delimiter::None
        }
    }

    /// Reads part data up to the next delimiter line.
    ///
    /// The delimiter line is kept in `peeked` for the next call to
    /// `next_part`, and the line break right before it is dropped from the
    /// data since it belongs to the delimiter.
    async fn read_part_data(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();

        loop {
            let mut line = Vec::new();
            // Enough for the rest of the allowed data or a delimiter line.
            let cap = self
                .max_part_size
                .saturating_sub(data.len())
                .saturating_add(self.delimiter_room());
            if self.read_line(&mut line, cap).await? == 0 {
                return Err(Error::Multipart(
                    "unexpected EOF in part body".to_string(),
                ));
            }

            if self.classify(&line) != Delimiter::None {
                if data.ends_with(b"\r\n") {
                    data.truncate(data.len() - 2);
                } else if data.ends_with(b"\n") {
                    data.truncate(data.len() - 1);
                }
                self.peeked = Some(line);
                return Ok(data);
            }

            data.extend_from_slice(&line);
            if data.len() > self.max_part_size {
                return Err(Error::MessageTooLarge);
            }
        }
    }
}

/// Skips leading whitespace (space and tab).
fn skip_lwsp_char(b: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < b.len() && (b[i] == b' ' || b[i] == b'\t') {
        i += 1;
    }
    &b[i..]
}
