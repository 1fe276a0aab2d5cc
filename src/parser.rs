//! Message parsing.
//!
//! [`Parser`] turns a byte stream into a [`Message`] tree. Multipart bodies
//! are split with the preamble reader and the multipart reader; each part
//! and each encapsulated message is parsed recursively. Leaf bodies are
//! decoded according to their Content-Transfer-Encoding.

use crate::error::{Error, Result};
use crate::grammar::{is_ascii_space, trim_ascii_space};
use crate::header::{Header, HeaderLimits};
use crate::message::{Message, Payload, PayloadKind};
use crate::multipart::{PreambleReader, Reader};
use crate::transfer::{BodyReader, TransferEncoding};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io::Cursor;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

/// Parser settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Maximum nesting of multipart and message nodes.
    pub max_depth: usize,
    /// Read buffer size of the boundary-aware readers.
    pub buffer_size: usize,
    /// Maximum size of one header block.
    pub max_header_bytes: usize,
    /// Maximum number of fields in one header block.
    pub max_headers: usize,
    /// Maximum size of one part or leaf body.
    pub max_part_bytes: usize,
    /// Treat a malformed part as fatal instead of keeping the parts before it.
    pub strict: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            buffer_size: 4096,
            max_header_bytes: 10 << 20,
            max_headers: 10000,
            max_part_bytes: 32 << 20,
            strict: false,
        }
    }
}

impl ParserConfig {
    fn header_limits(&self) -> HeaderLimits {
        HeaderLimits {
            max_bytes: self.max_header_bytes,
            max_headers: self.max_headers,
        }
    }
}

/// The result of a parse.
#[derive(Debug)]
pub struct Parsed {
    /// The message tree.
    pub message: Message,
    /// Problems the parser recovered from, in the order they were met.
    ///
    /// Always empty in strict mode.
    pub recovered: Vec<Error>,
}

/// A message parser.
///
/// # Examples
///
/// ```
/// use tokio_email::Parser;
///
/// # async fn example() -> tokio_email::Result<()> {
/// let raw = b"Content-Type: text/plain\r\n\r\nhello\r\nworld";
/// let parsed = Parser::new().parse(&raw[..]).await?;
/// assert_eq!(parsed.message.body(), Some(&b"hello\r\nworld"[..]));
/// assert!(parsed.recovered.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

/// Parses a message with the default settings.
///
/// Malformed parts of a multipart body end that body early; use
/// [`Parser::parse`] to see which parts were dropped.
pub async fn parse_message<R>(reader: R) -> Result<Message>
where
    R: AsyncRead + Unpin + Send,
{
    Ok(Parser::new().parse(reader).await?.message)
}

impl Parser {
    /// Creates a parser with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser with the given settings.
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Returns the settings.
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses a complete message from `reader`.
    ///
    /// Leading whitespace before the header is skipped. RFC 2047 words in
    /// every header block are decoded, and quoted-printable or base64 leaf
    /// bodies are decoded with their Content-Transfer-Encoding field
    /// removed.
    pub async fn parse<'r, R>(&self, reader: R) -> Result<Parsed>
    where
        R: AsyncRead + Unpin + Send + 'r,
    {
        let body: BodyReader<'r> = Box::new(BufReader::with_capacity(
            self.config.buffer_size.max(1),
            reader,
        ));
        let mut recovered = Vec::new();
        let message = self.parse_message(body, 0, &mut recovered).await?;
        Ok(Parsed { message, recovered })
    }

    /// Parses a header block and the body that follows it.
    fn parse_message<'a>(
        &'a self,
        mut body: BodyReader<'a>,
        depth: usize,
        recovered: &'a mut Vec<Error>,
    ) -> BoxFuture<'a, Result<Message>> {
        async move {
            skip_leading_space(&mut body).await?;
            let header = Header::read_from(&mut body, &self.config.header_limits()).await?;
            self.parse_node(header, body, depth, recovered).await
        }
        .boxed()
    }

    /// Parses the payload of a node whose header has been read.
    fn parse_node<'a>(
        &'a self,
        mut header: Header,
        body: BodyReader<'a>,
        depth: usize,
        recovered: &'a mut Vec<Error>,
    ) -> BoxFuture<'a, Result<Message>> {
        async move {
            if depth > self.config.max_depth {
                return Err(Error::NestingTooDeep {
                    limit: self.config.max_depth,
                });
            }

            let (media_type, params) = match header.content_type() {
                Ok(content_type) => content_type,
                // Lack of a Content-Type is not a problem.
                Err(Error::MissingContentType) => Default::default(),
                Err(e) => return Err(e),
            };

            match PayloadKind::for_media_type(&media_type) {
                PayloadKind::Parts => {
                    let boundary = params
                        .get("boundary")
                        .filter(|b| !b.is_empty())
                        .ok_or_else(|| Error::MissingBoundary {
                            media_type: media_type.clone(),
                        })?;
                    debug!(%media_type, %boundary, depth, "parsing multipart node");
                    self.parse_multipart(header, body, boundary, depth, recovered)
                        .await
                }
                PayloadKind::SubMessage => {
                    debug!(%media_type, depth, "parsing encapsulated message");
                    let sub_message = self.parse_message(body, depth + 1, recovered).await?;
                    Ok(Message::with_sub_message(header, sub_message))
                }
                PayloadKind::Body => {
                    let body = self.read_body(&mut header, body).await?;
                    Ok(Message::with_body(header, body))
                }
            }
        }
        .boxed()
    }

    async fn parse_multipart<'a>(
        &'a self,
        header: Header,
        body: BodyReader<'a>,
        boundary: &str,
        depth: usize,
        recovered: &'a mut Vec<Error>,
    ) -> Result<Message> {
        let limit = self.config.max_part_bytes;
        let mut preamble_reader =
            PreambleReader::with_chunk_size(body, boundary, self.config.buffer_size);
        preamble_reader.set_hold_limit(limit);
        let mut preamble = Vec::new();
        (&mut preamble_reader)
            .take(limit as u64 + 1)
            .read_to_end(&mut preamble)
            .await
            .map_err(Error::from_body_read)?;
        if preamble.len() > limit {
            return Err(Error::MessageTooLarge);
        }
        let (rest, body) = preamble_reader.into_inner();

        let mut reader = Reader::with_buffer_size(
            Cursor::new(rest).chain(body),
            boundary,
            self.config.buffer_size,
        );
        reader.set_header_limits(self.config.header_limits());
        reader.set_max_part_size(self.config.max_part_bytes);

        let mut parts = Vec::new();
        let mut complete = true;
        loop {
            let index = parts.len();
            let result = match reader.next_part().await {
                Ok(Some(part)) => {
                    let part_body: BodyReader<'_> = Box::new(Cursor::new(part.body));
                    self.parse_node(part.header, part_body, depth + 1, recovered)
                        .await
                        .map(Some)
                }
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };

            match result {
                Ok(Some(message)) => parts.push(message),
                Ok(None) => break,
                // Adversarial nesting is never recovered from.
                Err(e @ Error::NestingTooDeep { .. }) => return Err(e),
                Err(e) => {
                    let error = Error::MalformedPart {
                        index,
                        source: Box::new(e),
                    };
                    if self.config.strict {
                        return Err(error);
                    }
                    warn!(%error, kept = parts.len(), "dropping malformed multipart part");
                    recovered.push(error);
                    complete = false;
                    break;
                }
            }
        }

        let epilogue = if complete {
            let epilogue = reader.read_epilogue().await?;
            non_empty(trim_ascii_space(&epilogue))
        } else {
            None
        };
        debug!(parts = parts.len(), complete, "multipart node parsed");

        let mut message = Message::new(header, Payload::Parts(parts));
        message.preamble = non_empty(&preamble);
        message.epilogue = epilogue;
        Ok(message)
    }

    /// Reads a leaf body, decoding its transfer encoding.
    async fn read_body(&self, header: &mut Header, body: BodyReader<'_>) -> Result<Vec<u8>> {
        let encoding = TransferEncoding::parse(header.get("Content-Transfer-Encoding"));
        let mut body = if encoding.is_decoded_on_read() {
            debug!(encoding = encoding.as_str(), "decoding body");
            header.delete("Content-Transfer-Encoding");
            encoding.decoding_reader(body)
        } else {
            body
        };

        let limit = self.config.max_part_bytes as u64;
        let mut data = Vec::new();
        (&mut body)
            .take(limit + 1)
            .read_to_end(&mut data)
            .await
            .map_err(Error::from_body_read)?;
        if data.len() as u64 > limit {
            return Err(Error::MessageTooLarge);
        }
        Ok(data)
    }
}

/// Discards whitespace before the header block.
async fn skip_leading_space(body: &mut BodyReader<'_>) -> Result<()> {
    loop {
        let buf = body.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        let n = buf.iter().take_while(|&&b| is_ascii_space(b)).count();
        let done = n < buf.len();
        body.consume(n);
        if done {
            return Ok(());
        }
    }
}

fn non_empty(bytes: &[u8]) -> Option<Vec<u8>> {
    (!bytes.is_empty()).then(|| bytes.to_vec())
}
