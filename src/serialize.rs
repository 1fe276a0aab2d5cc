//! Message serialization.
//!
//! [`Message::write_to`] writes a tree back to wire format. Bodies without a
//! Content-Transfer-Encoding are encoded on the way out: quoted-printable for
//! `text/*`, base64 folded at 76 columns for everything else.

use crate::counting::CountingWriter;
use crate::error::{Error, Result};
use crate::fold::{Base64Folder, MAX_BODY_LINE_LENGTH, MAX_HEADER_TOTAL_LENGTH};
use crate::message::{Message, Payload, PayloadKind};
use crate::multipart;
use crate::quotedprintable;
use crate::transfer::TransferEncoding;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Type-erased sink shared by every level of the tree.
type Sink<'w> = dyn AsyncWrite + Unpin + Send + 'w;

impl Message {
    /// Writes this message to `w` and returns the number of bytes written.
    ///
    /// The header is written first (without Bcc), then the payload: each
    /// part framed by `\r\n--boundary\r\n` and closed by
    /// `\r\n--boundary--\r\n`, an encapsulated message after a blank line,
    /// or the body. If an I/O error interrupts the write, the bytes already
    /// written are reported in [`Error::Write`].
    ///
    /// The whole tree is checked before the first byte goes out. A node
    /// whose payload disagrees with its Content-Type, or a multipart node
    /// without a boundary that can frame parts, fails with nothing written.
    /// Boundaries taken from parsed mail are written back as they are.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_email::{Header, Message};
    ///
    /// # async fn example() -> tokio_email::Result<()> {
    /// let mut header = Header::new();
    /// header.set("Content-Type", "text/plain");
    /// let message = Message::with_body(header, "café");
    ///
    /// let mut out = Vec::new();
    /// let n = message.write_to(&mut out).await?;
    /// assert_eq!(n as usize, out.len());
    /// assert!(out.ends_with(b"quoted-printable\r\n\r\ncaf=C3=A9"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn write_to<W>(&self, w: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        // Nothing reaches the sink unless the whole tree can be written.
        check_tree(self)?;

        let mut counter = CountingWriter::new(w);
        let result = match write_node(self, &mut counter).await {
            Ok(()) => counter.flush().await.map_err(Error::Io),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(counter.count()),
            Err(Error::Io(source)) => Err(counter.write_error(source)),
            Err(e) => Err(e),
        }
    }

    /// Serializes this message into a buffer.
    pub async fn bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf).await?;
        Ok(buf)
    }
}

/// What the header says about a node, checked against its payload.
struct Layout {
    media_type: Option<String>,
    boundary: Option<String>,
}

fn layout(message: &Message) -> Result<Layout> {
    let (media_type, mut params) = match message.header.content_type() {
        Ok((media_type, params)) => (Some(media_type), params),
        Err(Error::MissingContentType) => (None, HashMap::new()),
        Err(e) => return Err(e),
    };
    let kind = media_type
        .as_deref()
        .map_or(PayloadKind::Body, PayloadKind::for_media_type);
    if !kind.matches(message.payload()) {
        return Err(Error::PayloadMismatch {
            media_type: media_type.unwrap_or_default(),
            payload: message.payload().kind(),
        });
    }

    let boundary = match kind {
        PayloadKind::Parts => {
            let boundary = params.remove("boundary").ok_or_else(|| Error::MissingBoundary {
                media_type: media_type.clone().unwrap_or_default(),
            })?;
            multipart::check_framing(&boundary)?;
            Some(boundary)
        }
        _ => None,
    };
    Ok(Layout {
        media_type,
        boundary,
    })
}

/// Checks every node of the tree, in pre-order.
fn check_tree(message: &Message) -> Result<()> {
    layout(message)?;
    match message.payload() {
        Payload::Parts(parts) => parts.iter().try_for_each(check_tree),
        Payload::SubMessage(sub_message) => check_tree(sub_message),
        Payload::Body(_) => Ok(()),
    }
}

fn write_node<'a, 'w: 'a>(message: &'a Message, w: &'a mut Sink<'w>) -> BoxFuture<'a, Result<()>> {
    async move {
        let Layout {
            media_type,
            boundary,
        } = layout(message)?;

        message
            .header
            .write_fields(&mut &mut *w, MAX_HEADER_TOTAL_LENGTH)
            .await?;

        match (message.payload(), boundary) {
            (Payload::Parts(parts), Some(boundary)) => {
                write_parts(message, parts, &boundary, w).await
            }
            (Payload::SubMessage(sub_message), _) => {
                w.write_all(b"\r\n").await?;
                write_node(sub_message, w).await
            }
            (Payload::Body(body), _) => {
                write_body(message, media_type.as_deref(), body, w).await
            }
            (Payload::Parts(_), None) => Err(Error::MissingBoundary {
                media_type: media_type.unwrap_or_default(),
            }),
        }
    }
    .boxed()
}

async fn write_parts(
    message: &Message,
    parts: &[Message],
    boundary: &str,
    w: &mut Sink<'_>,
) -> Result<()> {
    debug!(%boundary, parts = parts.len(), "writing multipart node");
    w.write_all(b"\r\n").await?;
    if let Some(preamble) = message.preamble.as_deref().filter(|p| !p.is_empty()) {
        w.write_all(preamble).await?;
        if !preamble.ends_with(b"\n") {
            w.write_all(b"\r\n").await?;
        }
    }

    let mut writer = multipart::Writer::lenient(&mut *w, boundary)?;
    for part in parts {
        writer.next_part().await?;
        write_node(part, &mut **writer.get_mut()).await?;
    }
    writer.close().await?;

    if let Some(epilogue) = message.epilogue.as_deref().filter(|e| !e.is_empty()) {
        w.write_all(epilogue).await?;
        if !epilogue.ends_with(b"\n") {
            w.write_all(b"\r\n").await?;
        }
    }
    Ok(())
}

async fn write_body(
    message: &Message,
    media_type: Option<&str>,
    body: &[u8],
    w: &mut Sink<'_>,
) -> Result<()> {
    let encoding = match media_type {
        Some(media_type) if !message.header.is_set("Content-Transfer-Encoding") => {
            TransferEncoding::for_media_type(media_type)
        }
        // Already encoded, or no Content-Type to choose by.
        _ => {
            w.write_all(b"\r\n").await?;
            w.write_all(body).await?;
            return Ok(());
        }
    };

    debug!(encoding = encoding.as_str(), bytes = body.len(), "encoding body");
    let field = format!("Content-Transfer-Encoding: {}\r\n\r\n", encoding.as_str());
    w.write_all(field.as_bytes()).await?;

    match encoding {
        TransferEncoding::QuotedPrintable => {
            let mut qp = quotedprintable::Writer::new(&mut *w);
            qp.write_all(body).await?;
            qp.finish().await?;
        }
        _ => {
            let mut folder = Base64Folder::new(&mut *w, MAX_BODY_LINE_LENGTH);
            folder.write_all(STANDARD.encode(body).as_bytes()).await?;
            folder.flush().await?;
        }
    }
    Ok(())
}
