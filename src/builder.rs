//! Constructors for common message shapes.
//!
//! Bodies are given decoded; the serializer picks a transfer encoding when
//! the message is written. A typical message with two attachments:
//!
//! ```text
//! multipart/mixed
//!   multipart/alternative
//!     text/plain
//!     text/html
//!   application/pdf (attachment)
//!   application/pdf (attachment)
//! ```
//!
//! # Examples
//!
//! ```
//! use tokio_email::{builder, Header};
//!
//! let header = Header::new_message("Report", "a@example.com", &["b@example.com"]);
//! let pdf = builder::attachment(b"%PDF-1.7".to_vec(), "q3.pdf");
//! let message = builder::new_message(header, "See attached.", "<p>See attached.</p>", vec![pdf]);
//!
//! assert_eq!(message.parts().len(), 2);
//! assert_eq!(message.parts()[1].header.get("Content-Type"), "application/pdf");
//! ```

use crate::error::Result;
use crate::header::Header;
use crate::media_type::format_media_type;
use crate::message::Message;
use crate::mime_type::type_by_filename;
use crate::multipart::random_boundary;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Builds `multipart/mixed` holding `multipart/alternative` (plain text,
/// then HTML) followed by `attachments`. The Content-Type of `header` is
/// replaced.
pub fn new_message(header: Header, text: &str, html: &str, attachments: Vec<Message>) -> Message {
    let alternative = multipart("alternative", vec![text_part(text), html_part(html)]);
    mixed(header, alternative, attachments)
}

/// Like [`new_message`], with the HTML wrapped in `multipart/related`
/// together with `inlines` (see [`inline`]).
pub fn new_message_with_inlines(
    header: Header,
    text: &str,
    html: &str,
    inlines: Vec<Message>,
    attachments: Vec<Message>,
) -> Message {
    let mut related = Vec::with_capacity(1 + inlines.len());
    related.push(html_part(html));
    related.extend(inlines);
    let alternative = multipart("alternative", vec![text_part(text), multipart("related", related)]);
    mixed(header, alternative, attachments)
}

fn mixed(mut header: Header, alternative: Message, attachments: Vec<Message>) -> Message {
    header.set("Content-Type", multipart_content_type("mixed"));
    let mut parts = Vec::with_capacity(1 + attachments.len());
    parts.push(alternative);
    parts.extend(attachments);
    Message::with_parts(header, parts)
}

/// A `multipart/<subtype>` node with a fresh boundary. Common subtypes are
/// mixed, alternative, related and report.
pub fn multipart(subtype: &str, parts: Vec<Message>) -> Message {
    let mut header = Header::new();
    header.set("Content-Type", multipart_content_type(subtype));
    Message::with_parts(header, parts)
}

fn multipart_content_type(subtype: &str) -> String {
    format!("multipart/{subtype}; boundary=\"{}\"", random_boundary())
}

/// A `text/plain` UTF-8 part.
pub fn text_part(text: &str) -> Message {
    let mut header = Header::new();
    header.set("Content-Type", "text/plain; charset=\"UTF-8\"");
    Message::with_body(header, text)
}

/// A `text/html` UTF-8 part.
pub fn html_part(html: &str) -> Message {
    let mut header = Header::new();
    header.set("Content-Type", "text/html; charset=\"UTF-8\"");
    Message::with_body(header, html)
}

/// An attachment typed by the extension of `filename`.
pub fn attachment(body: Vec<u8>, filename: &str) -> Message {
    part(
        body,
        type_by_filename(filename).unwrap_or(""),
        &disposition("attachment", filename),
        "",
    )
}

/// An inline part typed by the extension of `filename`, referenced from
/// HTML as `cid:<content_id>`. Pass `content_id` without angle brackets.
pub fn inline(body: Vec<u8>, filename: &str, content_id: &str) -> Message {
    part(
        body,
        type_by_filename(filename).unwrap_or(""),
        &disposition("inline", filename),
        content_id,
    )
}

fn disposition(kind: &str, filename: &str) -> String {
    let params = HashMap::from([("filename".to_string(), filename.to_string())]);
    match format_media_type(kind, &params) {
        formatted if formatted.is_empty() => kind.to_string(),
        formatted => formatted,
    }
}

/// A generic leaf part. Empty arguments are left out, except the content
/// type which falls back to `application/octet-stream`.
pub fn part(body: Vec<u8>, content_type: &str, content_disposition: &str, content_id: &str) -> Message {
    let mut header = Header::new();
    if content_type.is_empty() {
        header.set("Content-Type", FALLBACK_CONTENT_TYPE);
    } else {
        header.set("Content-Type", content_type);
    }
    if !content_disposition.is_empty() {
        header.set("Content-Disposition", content_disposition);
    }
    if !content_id.is_empty() {
        header.set("Content-Id", format!("<{content_id}>"));
    }
    Message::with_body(header, body)
}

/// Reads `reader` to the end and builds an [`attachment`] from it.
pub async fn attachment_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    filename: &str,
) -> Result<Message> {
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await?;
    Ok(attachment(body, filename))
}

/// Reads `reader` to the end and builds an [`inline`] part from it.
pub async fn inline_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    filename: &str,
    content_id: &str,
) -> Result<Message> {
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await?;
    Ok(inline(body, filename, content_id))
}
