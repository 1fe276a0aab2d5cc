//! Message header fields.
//!
//! [`Header`] is a multimap from canonical field names to their values, with
//! accessors for the fields a mail client typically touches and the wire
//! codec for header blocks: [`Header::read_from`] unfolds and decodes RFC
//! 2047 words, [`Header::write_to`] encodes and folds.

use crate::counting::CountingWriter;
use crate::encoded_word::{WordDecoder, WordEncoder};
use crate::error::{Error, Result};
use crate::fold::{HeaderFolder, MAX_HEADER_TOTAL_LENGTH};
use crate::grammar::{canonical_header_key, is_field_name};
use crate::media_type::parse_media_type;
use crate::message_id;
use chrono::{DateTime, FixedOffset};
use std::collections::{BTreeMap, HashMap};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_MIME_HEADER_SIZE: usize = 10 << 20; // 10 MB
const MAX_MIME_HEADERS: usize = 10000;

/// Separator used by the address-list accessors.
const LIST_SEPARATOR: &str = ", ";

/// Size limits applied while reading a header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLimits {
    /// Maximum number of bytes in the block, including line breaks.
    pub max_bytes: usize,
    /// Maximum number of fields.
    pub max_headers: usize,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        Self {
            max_bytes: MAX_MIME_HEADER_SIZE,
            max_headers: MAX_MIME_HEADERS,
        }
    }
}

/// The header fields of a message or part.
///
/// Keys are stored in canonical form (`content-type` becomes
/// `Content-Type`) and every lookup canonicalizes its key. Values of one
/// field keep their insertion order; fields iterate in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header(BTreeMap<String, Vec<String>>);

impl Header {
    /// Creates an empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the header most messages start from: Subject, From and To.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_email::Header;
    ///
    /// let header = Header::new_message("Hi", "a@example.com", &["b@example.com", "c@example.com"]);
    /// assert_eq!(header.get("to"), "b@example.com, c@example.com");
    /// ```
    pub fn new_message<S: AsRef<str>>(subject: &str, from: &str, to: &[S]) -> Self {
        let mut header = Self::new();
        header.set_subject(subject);
        header.set_from(from);
        header.set_to(to);
        header
    }

    /// Returns the first value of `key`, or `""` if the field is absent.
    pub fn get(&self, key: &str) -> &str {
        self.values(key).first().map(String::as_str).unwrap_or("")
    }

    /// Returns every value of `key`.
    pub fn values(&self, key: &str) -> &[String] {
        self.0
            .get(&canonical_header_key(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replaces all values of `key` with `value`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(canonical_header_key(key), vec![value.into()]);
    }

    /// Appends `value` to the values of `key`.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.0
            .entry(canonical_header_key(key))
            .or_default()
            .push(value.into());
    }

    /// Removes the field, returning its values.
    pub fn delete(&mut self, key: &str) -> Option<Vec<String>> {
        self.0.remove(&canonical_header_key(key))
    }

    /// Reports whether the field is present.
    pub fn is_set(&self, key: &str) -> bool {
        self.0.contains_key(&canonical_header_key(key))
    }

    /// Number of distinct fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Reports whether the header has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(field, values)` in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Parses the Content-Type field into a media type and its parameters.
    ///
    /// An absent or empty field is [`Error::MissingContentType`], which
    /// callers treat as "plain body" rather than as a failure.
    pub fn content_type(&self) -> Result<(String, HashMap<String, String>)> {
        match self.get("Content-Type") {
            "" => Err(Error::MissingContentType),
            value => parse_media_type(value),
        }
    }

    /// Parses the Date field (RFC 5322 date-time).
    pub fn date(&self) -> Result<DateTime<FixedOffset>> {
        let value = self.get("Date");
        if value.is_empty() {
            return Err(Error::MalformedHeader("missing Date field".to_string()));
        }
        DateTime::parse_from_rfc2822(value)
            .map_err(|e| Error::MalformedHeader(format!("Date: {value:?}: {e}")))
    }

    /// The From field.
    pub fn from(&self) -> &str {
        self.get("From")
    }

    /// Sets the From field.
    pub fn set_from(&mut self, address: &str) {
        self.set("From", address);
    }

    /// The To field split into addresses.
    pub fn to(&self) -> Vec<String> {
        self.list("To")
    }

    /// Sets the To field to the joined addresses.
    pub fn set_to<S: AsRef<str>>(&mut self, addresses: &[S]) {
        self.set_list("To", addresses);
    }

    /// The Cc field split into addresses.
    pub fn cc(&self) -> Vec<String> {
        self.list("Cc")
    }

    /// Sets the Cc field to the joined addresses.
    pub fn set_cc<S: AsRef<str>>(&mut self, addresses: &[S]) {
        self.set_list("Cc", addresses);
    }

    /// The Bcc field split into addresses.
    pub fn bcc(&self) -> Vec<String> {
        self.list("Bcc")
    }

    /// Sets the Bcc field. It is never written out.
    pub fn set_bcc<S: AsRef<str>>(&mut self, addresses: &[S]) {
        self.set_list("Bcc", addresses);
    }

    /// The Subject field.
    pub fn subject(&self) -> &str {
        self.get("Subject")
    }

    /// Sets the Subject field.
    pub fn set_subject(&mut self, subject: &str) {
        self.set("Subject", subject);
    }

    /// Every recipient from To, Cc and Bcc, in that order.
    pub fn recipients(&self) -> Vec<String> {
        let mut all = self.to();
        all.extend(self.cc());
        all.extend(self.bcc());
        all
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .split(LIST_SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn set_list<S: AsRef<str>>(&mut self, key: &str, addresses: &[S]) {
        let joined = addresses
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR);
        self.set(key, joined);
    }

    /// Fills in Message-Id, Date and MIME-Version for sending.
    ///
    /// Message-Id and Date are only set if missing; MIME-Version is always
    /// `1.0`. Fails if no Message-Id could be generated.
    pub fn save(&mut self) -> Result<()> {
        self.save_with(message_id::generate)
    }

    /// Like [`Header::save`], taking the Message-Id generator.
    pub fn save_with(&mut self, generate_id: impl FnOnce() -> Result<String>) -> Result<()> {
        if self.get("Message-Id").is_empty() {
            let id = generate_id()?;
            self.set("Message-Id", id);
        }
        if self.get("Date").is_empty() {
            self.set("Date", chrono::Local::now().to_rfc2822());
        }
        self.set("MIME-Version", "1.0");
        Ok(())
    }

    /// Returns the serialized header block, without the blank line that
    /// ends it.
    pub async fn bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf).await?;
        Ok(buf)
    }

    /// Writes every field except Bcc as `Field: value\r\n`.
    ///
    /// Values are trimmed, Q-encoded when they are not plain ASCII and
    /// folded so that no line exceeds 998 octets. A value with a run of
    /// non-space characters too long for one line is Q-encoded as well, so
    /// that it folds between encoded words and reads back unchanged. Returns the number of
    /// bytes written; on an I/O failure the count so far is carried in
    /// [`Error::Write`].
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, w: &mut W) -> Result<u64> {
        self.write_folded(w, MAX_HEADER_TOTAL_LENGTH).await
    }

    /// Like [`Header::write_to`] with a custom maximum line length.
    ///
    /// Below 76 columns an encoded word may not fit on a line either, and
    /// the folder then has to break inside it.
    pub async fn write_folded<W: AsyncWrite + Unpin>(
        &self,
        w: &mut W,
        max_line_len: usize,
    ) -> Result<u64> {
        let mut counter = CountingWriter::new(w);
        match self.write_fields(&mut counter, max_line_len).await {
            Ok(()) => Ok(counter.count()),
            Err(e) => Err(counter.write_error(e)),
        }
    }

    /// Writes the fields, leaving error accounting to the caller.
    pub(crate) async fn write_fields<W: AsyncWrite + Unpin>(
        &self,
        w: &mut W,
        max: usize,
    ) -> io::Result<()> {
        let mut folder = HeaderFolder::new(w, max);
        for (field, values) in &self.0 {
            if field == "Bcc" {
                continue; // never transmitted
            }
            for value in values {
                let value = value.trim();
                let encoded = if folds_at_spaces(value, max) {
                    WordEncoder::QEncoding.encode("UTF-8", value)
                } else {
                    WordEncoder::QEncoding.encode_words("UTF-8", value)
                };
                // One write per line so the space after the colon can fold.
                let line = format!("{field}: {encoded}");
                folder.start_line();
                folder.write_all(line.as_bytes()).await?;
                folder.get_mut().write_all(b"\r\n").await?;
            }
        }
        folder.flush().await
    }

    /// Reads a header block up to and including the blank line ending it.
    ///
    /// Continuation lines are unfolded by dropping the line break only.
    /// Values are trimmed and their RFC 2047 encoded words decoded. End of
    /// input also ends the block. A line that is neither a field nor a
    /// continuation is [`Error::MalformedHeader`].
    pub async fn read_from<R: AsyncBufRead + Unpin>(
        reader: &mut R,
        limits: &HeaderLimits,
    ) -> Result<Self> {
        let mut header = Header::new();
        let mut current: Option<(String, String)> = None;
        let mut total_size = 0;
        let mut header_count = 0;
        let mut line = Vec::new();

        loop {
            line.clear();
            // Never buffer more than one byte past the limit.
            let remaining = limits.max_bytes.saturating_sub(total_size) as u64 + 1;
            let n = (&mut *reader)
                .take(remaining)
                .read_until(b'\n', &mut line)
                .await?;
            total_size += n;
            if total_size > limits.max_bytes {
                return Err(Error::MessageTooLarge);
            }
            if n == 0 {
                break;
            }

            let content = strip_line_break(&line);
            // Empty line signals end of headers
            if content.is_empty() {
                break;
            }

            if content[0] == b' ' || content[0] == b'\t' {
                match current.as_mut() {
                    Some((_, value)) => value.push_str(&String::from_utf8_lossy(content)),
                    None => {
                        return Err(Error::MalformedHeader(
                            String::from_utf8_lossy(content).into_owned(),
                        ))
                    }
                }
                continue;
            }

            if let Some((key, value)) = current.take() {
                header.add_decoded(&key, &value);
            }

            header_count += 1;
            if header_count > limits.max_headers {
                return Err(Error::MessageTooLarge);
            }

            current = Some(parse_header_line(content)?);
        }

        if let Some((key, value)) = current {
            header.add_decoded(&key, &value);
        }
        Ok(header)
    }

    fn add_decoded(&mut self, key: &str, raw: &str) {
        let raw = raw.trim();
        let value = WordDecoder::new()
            .decode_header(raw)
            .unwrap_or_else(|_| raw.to_string());
        self.add(key, value);
    }
}

impl<'a> IntoIterator for &'a Header {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Reports whether every space-separated run of `value` fits on a
/// continuation line of `max` columns.
fn folds_at_spaces(value: &str, max: usize) -> bool {
    value.split(' ').all(|run| run.len() < max)
}

fn strip_line_break(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Splits `Name: value`. Whitespace between the name and the colon is
/// tolerated.
fn parse_header_line(line: &[u8]) -> Result<(String, String)> {
    let malformed = || Error::MalformedHeader(String::from_utf8_lossy(line).into_owned());

    let colon = line.iter().position(|&b| b == b':').ok_or_else(malformed)?;
    let name = String::from_utf8_lossy(&line[..colon]);
    let name = name.trim_end_matches(&[' ', '\t'][..]);
    if !is_field_name(name) {
        return Err(malformed());
    }
    let value = String::from_utf8_lossy(&line[colon + 1..]).into_owned();
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read(data: &[u8]) -> Result<Header> {
        let mut reader = data;
        Header::read_from(&mut reader, &HeaderLimits::default()).await
    }

    #[test]
    fn test_canonical_keys() {
        let mut header = Header::new();
        header.set("content-type", "text/plain");
        header.add("X-CUSTOM", "a");
        header.add("x-custom", "b");

        assert_eq!(header.get("Content-Type"), "text/plain");
        assert_eq!(header.get("CONTENT-TYPE"), "text/plain");
        assert_eq!(header.values("X-Custom"), ["a", "b"]);
        assert!(header.is_set("x-custom"));
        assert_eq!(
            header.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            ["Content-Type", "X-Custom"]
        );

        assert_eq!(header.delete("X-Custom"), Some(vec!["a".to_string(), "b".to_string()]));
        assert!(!header.is_set("X-Custom"));
        assert_eq!(header.get("X-Custom"), "");
    }

    #[test]
    fn test_content_type() {
        let mut header = Header::new();
        assert!(matches!(header.content_type(), Err(Error::MissingContentType)));

        header.set("Content-Type", "Multipart/Mixed; boundary=\"a b\"");
        let (media_type, params) = header.content_type().unwrap();
        assert_eq!(media_type, "multipart/mixed");
        assert_eq!(params["boundary"], "a b");

        header.set("Content-Type", "not a media type");
        assert!(matches!(header.content_type(), Err(Error::MediaType(_))));
    }

    #[test]
    fn test_address_lists() {
        let mut header = Header::new();
        assert!(header.to().is_empty());

        header.set_to(&["a@example.com", "b@example.com"]);
        header.set_cc(&["c@example.com"]);
        header.set_bcc(&["d@example.com"]);
        assert_eq!(header.get("To"), "a@example.com, b@example.com");
        assert_eq!(header.to(), ["a@example.com", "b@example.com"]);
        assert_eq!(header.cc(), ["c@example.com"]);
        assert_eq!(
            header.recipients(),
            ["a@example.com", "b@example.com", "c@example.com", "d@example.com"]
        );
    }

    #[test]
    fn test_new_message() {
        let header = Header::new_message("Greetings", "me@example.com", &["you@example.com"]);
        assert_eq!(header.subject(), "Greetings");
        assert_eq!(header.from(), "me@example.com");
        assert_eq!(header.to(), ["you@example.com"]);
    }

    #[test]
    fn test_save() {
        let mut header = Header::new();
        header.save_with(|| Ok("<1.2.3@host>".to_string())).unwrap();
        assert_eq!(header.get("Message-Id"), "<1.2.3@host>");
        assert_eq!(header.get("Mime-Version"), "1.0");
        assert!(header.date().is_ok());

        // Existing values are kept.
        header.set("Date", "Mon, 2 Jan 2006 15:04:05 -0700");
        header.save_with(|| panic!("id already set")).unwrap();
        assert_eq!(header.get("Message-Id"), "<1.2.3@host>");
        assert_eq!(header.date().unwrap().timestamp(), 1136239445);
    }

    #[test]
    fn test_save_id_failure() {
        let mut header = Header::new();
        let err = header
            .save_with(|| Err(Error::IdGeneration("no entropy".to_string())))
            .unwrap_err();
        assert!(matches!(err, Error::IdGeneration(_)));
        assert!(!header.is_set("Message-Id"));
    }

    #[tokio::test]
    async fn test_write_skips_bcc_and_encodes() {
        let mut header = Header::new();
        header.set("Subject", "  café  ");
        header.set("To", "a@example.com");
        header.set_bcc(&["secret@example.com"]);

        let out = String::from_utf8(header.bytes().await.unwrap()).unwrap();
        assert_eq!(out, "Subject: =?UTF-8?q?caf=C3=A9?=\r\nTo: a@example.com\r\n");
        assert!(!out.contains("secret"));
    }

    #[tokio::test]
    async fn test_write_returns_count() {
        let mut header = Header::new();
        header.set("A", "1");
        let mut out = Vec::new();
        assert_eq!(header.write_to(&mut out).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_folded_subject_round_trip() {
        let subject: String = "Ünïcödé sübjéct wörds ".repeat(10);
        let subject = subject.trim().to_string();
        let mut header = Header::new();
        header.set_subject(&subject);

        let mut out = Vec::new();
        header.write_folded(&mut out, 78).await.unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        let lines: Vec<&str> = text.trim_end().split("\r\n").collect();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 78));

        out.extend_from_slice(b"\r\n");
        let parsed = read(&out).await.unwrap();
        assert_eq!(parsed.subject(), subject);
    }

    #[tokio::test]
    async fn test_read_from() {
        let data = b"Subject: Hello\r\n  world\r\nX-Multi: one\r\nx-multi: two\r\n\r\nbody";
        let mut reader = &data[..];
        let header = Header::read_from(&mut reader, &HeaderLimits::default())
            .await
            .unwrap();
        assert_eq!(header.subject(), "Hello  world");
        assert_eq!(header.values("X-Multi"), ["one", "two"]);
        assert_eq!(reader, b"body");
    }

    #[tokio::test]
    async fn test_read_decodes_words() {
        let header = read(b"Subject: =?UTF-8?q?caf=C3=A9?= =?ISO-8859-1?q?cr=E8me?=\n\n")
            .await
            .unwrap();
        assert_eq!(header.subject(), "cafécrème");
    }

    #[tokio::test]
    async fn test_read_ends_at_eof() {
        let header = read(b"A: 1\r\nB: 2").await.unwrap();
        assert_eq!(header.get("B"), "2");
        assert!(read(b"").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_malformed() {
        assert!(matches!(read(b"no colon\r\n\r\n").await, Err(Error::MalformedHeader(_))));
        assert!(matches!(read(b" leading: space\r\n\r\n").await, Err(Error::MalformedHeader(_))));
        assert!(matches!(read(b"bad name: x\r\n\r\n").await, Err(Error::MalformedHeader(_))));
        // Whitespace before the colon is accepted.
        assert_eq!(read(b"Subject : x\r\n\r\n").await.unwrap().subject(), "x");
    }

    #[tokio::test]
    async fn test_read_limits() {
        let limits = HeaderLimits {
            max_bytes: 1024,
            max_headers: 2,
        };
        let mut reader = &b"A: 1\r\nB: 2\r\nC: 3\r\n\r\n"[..];
        assert!(matches!(
            Header::read_from(&mut reader, &limits).await,
            Err(Error::MessageTooLarge)
        ));

        let limits = HeaderLimits {
            max_bytes: 8,
            max_headers: 10,
        };
        let mut reader = &b"Subject: far too long\r\n\r\n"[..];
        assert!(matches!(
            Header::read_from(&mut reader, &limits).await,
            Err(Error::MessageTooLarge)
        ));
    }

    #[tokio::test]
    async fn test_read_stops_inside_an_endless_line() {
        let limits = HeaderLimits {
            max_bytes: 1024,
            max_headers: 10,
        };
        let mut data = b"Subject: ".to_vec();
        data.resize(1 << 20, b'a');
        let mut reader = &data[..];
        assert!(matches!(
            Header::read_from(&mut reader, &limits).await,
            Err(Error::MessageTooLarge)
        ));
        assert_eq!(data.len() - reader.len(), 1025);
    }

    #[tokio::test]
    async fn test_long_token_reads_back_unchanged() {
        let token = "x".repeat(1500);
        let mut header = Header::new();
        header.set("X-Long", token.as_str());
        header.set("X-Short", "plain words stay as they are");

        let out = header.bytes().await.unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.contains("X-Short: plain words stay as they are\r\n"));
        assert!(text
            .split("\r\n")
            .all(|line| line.len() <= MAX_HEADER_TOTAL_LENGTH));

        let reread = read(&out).await.unwrap();
        assert_eq!(reread.get("X-Long"), token);
        assert_eq!(reread.get("X-Short"), "plain words stay as they are");
    }

    #[test]
    fn test_folds_at_spaces() {
        assert!(folds_at_spaces("short words only", 78));
        assert!(folds_at_spaces(&"y".repeat(77), 78));
        assert!(!folds_at_spaces(&"y".repeat(78), 78));
        assert!(!folds_at_spaces(&format!("a {} b", "y".repeat(100)), 78));
    }

    mod folding {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn printable_values_read_back_unchanged(
                runs in proptest::collection::vec("[!-~]{1,300}", 1..4),
                max in 78usize..200,
            ) {
                let value = runs.join(" ");
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let (text, reread) = rt.block_on(async {
                    let mut header = Header::new();
                    header.set("X-Value", value.as_str());
                    let mut out = Vec::new();
                    header.write_folded(&mut out, max).await.unwrap();
                    let reread = read(&out).await.unwrap();
                    (String::from_utf8(out).unwrap(), reread)
                });
                for line in text.trim_end_matches("\r\n").split("\r\n") {
                    prop_assert!(line.len() <= max, "{} > {}", line.len(), max);
                }
                prop_assert_eq!(reread.get("X-Value"), value.as_str());
            }
        }
    }
}
