//! The message tree.
//!
//! A [`Message`] is a header plus exactly one payload: child parts for
//! `multipart/*`, an encapsulated message for `message/*`, or a body for
//! anything else. Proper construction of a nested multipart message is:
//!
//! ```text
//! multipart/mixed
//!   multipart/alternative
//!     text/plain
//!     multipart/related
//!       text/html
//!       image/jpeg (inline, with Content-ID)
//!   application/pdf (attachment)
//! ```
//!
//! with the last entry of each multipart section being the one a client
//! prefers to show.

use crate::error::{Error, Result};
use crate::header::Header;
use std::collections::HashMap;

/// The payload of a message node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Child parts of a `multipart/*` node, in order.
    Parts(Vec<Message>),
    /// The encapsulated message of a `message/*` node.
    SubMessage(Box<Message>),
    /// The decoded body of any other node.
    Body(Vec<u8>),
}

impl Payload {
    /// Short name of the payload kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Parts(_) => "parts",
            Payload::SubMessage(_) => "sub-message",
            Payload::Body(_) => "body",
        }
    }
}

/// A node of the message tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The header fields of this node.
    pub header: Header,
    /// Text before the first part. Only used by multipart nodes.
    pub preamble: Option<Vec<u8>>,
    /// Text after the last part. Only used by multipart nodes.
    pub epilogue: Option<Vec<u8>>,
    payload: Payload,
}

/// The kind of payload a Content-Type calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PayloadKind {
    Parts,
    SubMessage,
    Body,
}

impl PayloadKind {
    pub(crate) fn for_media_type(media_type: &str) -> Self {
        if media_type.starts_with("multipart") {
            PayloadKind::Parts
        } else if media_type.starts_with("message") {
            PayloadKind::SubMessage
        } else {
            PayloadKind::Body
        }
    }

    pub(crate) fn matches(self, payload: &Payload) -> bool {
        matches!(
            (self, payload),
            (PayloadKind::Parts, Payload::Parts(_))
                | (PayloadKind::SubMessage, Payload::SubMessage(_))
                | (PayloadKind::Body, Payload::Body(_))
        )
    }
}

impl Message {
    /// Creates a node from a header and a payload.
    ///
    /// The payload should agree with the header's Content-Type; the
    /// serializer rejects nodes where it does not.
    pub fn new(header: Header, payload: Payload) -> Self {
        Self {
            header,
            preamble: None,
            epilogue: None,
            payload,
        }
    }

    /// Creates a leaf node holding `body`.
    pub fn with_body(header: Header, body: impl Into<Vec<u8>>) -> Self {
        Self::new(header, Payload::Body(body.into()))
    }

    /// Creates a multipart node holding `parts`.
    pub fn with_parts(header: Header, parts: Vec<Message>) -> Self {
        Self::new(header, Payload::Parts(parts))
    }

    /// Creates a `message/*` node holding `sub_message`.
    pub fn with_sub_message(header: Header, sub_message: Message) -> Self {
        Self::new(header, Payload::SubMessage(Box::new(sub_message)))
    }

    /// Returns the payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the payload for modification.
    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Consumes the node, returning its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// The child parts, empty unless the payload is parts.
    pub fn parts(&self) -> &[Message] {
        match &self.payload {
            Payload::Parts(parts) => parts,
            _ => &[],
        }
    }

    /// The encapsulated message, if any.
    pub fn sub_message(&self) -> Option<&Message> {
        match &self.payload {
            Payload::SubMessage(message) => Some(message),
            _ => None,
        }
    }

    /// The body, if the payload is a body.
    pub fn body(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Body(body) => Some(body),
            _ => None,
        }
    }

    fn media_type(&self) -> Option<String> {
        self.header.content_type().ok().map(|(media_type, _)| media_type)
    }

    fn content_type_params(&self) -> HashMap<String, String> {
        self.header
            .content_type()
            .map(|(_, params)| params)
            .unwrap_or_default()
    }

    /// Reports whether the Content-Type is `multipart/*`.
    pub fn has_parts(&self) -> bool {
        self.media_type()
            .is_some_and(|t| PayloadKind::for_media_type(&t) == PayloadKind::Parts)
    }

    /// Reports whether the Content-Type is `message/*`.
    pub fn has_sub_message(&self) -> bool {
        self.media_type()
            .is_some_and(|t| PayloadKind::for_media_type(&t) == PayloadKind::SubMessage)
    }

    /// Reports whether this node carries a body: any Content-Type other
    /// than multipart and message, or none at all. A Content-Type that
    /// does not parse has no payload kind.
    pub fn has_body(&self) -> bool {
        match self.header.content_type() {
            Ok((media_type, _)) => PayloadKind::for_media_type(&media_type) == PayloadKind::Body,
            Err(e) => matches!(e, Error::MissingContentType),
        }
    }

    /// The boundary parameter of a multipart Content-Type.
    pub fn boundary(&self) -> Option<String> {
        self.content_type_params().remove("boundary")
    }

    /// Direct children matching `filter`, in order.
    pub fn parts_filtered<F>(&self, filter: F) -> Vec<&Message>
    where
        F: Fn(&Message) -> bool,
    {
        self.parts().iter().filter(|part| filter(part)).collect()
    }

    /// Direct children whose media type starts with `prefix`.
    pub fn parts_with_content_type_prefix(&self, prefix: &str) -> Vec<&Message> {
        self.parts_filtered(|part| has_media_type_prefix(part, prefix))
    }

    /// Every node of the tree matching `filter`, depth-first pre-order
    /// starting with this one.
    pub fn all_messages_filtered<F>(&self, filter: F) -> Vec<&Message>
    where
        F: Fn(&Message) -> bool,
    {
        let mut found = Vec::new();
        self.collect_filtered(&filter, &mut found);
        found
    }

    fn collect_filtered<'a, F>(&'a self, filter: &F, found: &mut Vec<&'a Message>)
    where
        F: Fn(&Message) -> bool,
    {
        if filter(self) {
            found.push(self);
        }
        match &self.payload {
            Payload::SubMessage(message) => message.collect_filtered(filter, found),
            Payload::Parts(parts) => {
                for part in parts {
                    part.collect_filtered(filter, found);
                }
            }
            Payload::Body(_) => {}
        }
    }

    /// Every node of the tree, depth-first pre-order.
    pub fn all_messages(&self) -> Vec<&Message> {
        self.all_messages_filtered(|_| true)
    }

    /// Every node of the tree whose media type starts with `prefix`.
    pub fn messages_with_content_type_prefix(&self, prefix: &str) -> Vec<&Message> {
        self.all_messages_filtered(|message| has_media_type_prefix(message, prefix))
    }

    /// Fills in Message-Id, Date and MIME-Version on this node's header.
    pub fn save(&mut self) -> Result<()> {
        self.header.save()
    }
}

fn has_media_type_prefix(message: &Message, prefix: &str) -> bool {
    message
        .header
        .content_type()
        .is_ok_and(|(media_type, _)| media_type.starts_with(prefix))
}
