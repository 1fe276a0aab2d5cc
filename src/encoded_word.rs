//! RFC 2047 encoded-word encoding and decoding.
//!
//! Header values are encoded on write as UTF-8 encoded words and decoded on
//! parse. Decoding understands UTF-8, US-ASCII and ISO-8859-1; words in any
//! other charset are left as they are.

use crate::error::{Error, Result};
use crate::grammar::hex_pair;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Maximum length of a single encoded word, RFC 2047 section 2.
const MAX_ENCODED_WORD_LEN: usize = 75;

const UPPER_HEX: &[u8] = b"0123456789ABCDEF";

/// An RFC 2047 encoded-word encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordEncoder {
    /// Base64 encoding scheme as defined by RFC 2045.
    BEncoding,
    /// Q-encoding scheme as defined by RFC 2047.
    QEncoding,
}

/// An RFC 2047 encoded-word decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordDecoder;

impl WordEncoder {
    /// Returns the encoded-word form of `s`.
    ///
    /// If `s` is printable ASCII it is returned unchanged. Otherwise the
    /// result is one or more space-separated encoded words, each at most 75
    /// characters, with no UTF-8 sequence split between words.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_email::WordEncoder;
    ///
    /// assert_eq!(WordEncoder::QEncoding.encode("UTF-8", "plain"), "plain");
    /// assert_eq!(WordEncoder::QEncoding.encode("UTF-8", "¡Hola!"), "=?UTF-8?q?=C2=A1Hola!?=");
    /// ```
    pub fn encode(&self, charset: &str, s: &str) -> String {
        if !needs_encoding(s) {
            return s.to_string();
        }
        self.encode_words(charset, s)
    }

    /// Like [`WordEncoder::encode`], but encodes printable ASCII as well.
    ///
    /// Encoded words are short and separated by spaces, so the result can
    /// be folded at whitespace whatever `s` looks like.
    ///
    /// ```
    /// use tokio_email::WordEncoder;
    ///
    /// let encoded = WordEncoder::QEncoding.encode_words("UTF-8", &"x".repeat(100));
    /// assert!(encoded.split(' ').all(|word| word.len() <= 75));
    /// ```
    pub fn encode_words(&self, charset: &str, s: &str) -> String {
        let (tag, overhead) = match self {
            WordEncoder::QEncoding => ('q', charset.len() + 7),
            WordEncoder::BEncoding => ('b', charset.len() + 7),
        };
        let max_len = MAX_ENCODED_WORD_LEN.saturating_sub(overhead).max(12);

        let chunks = match self {
            WordEncoder::QEncoding => q_chunks(s, max_len),
            WordEncoder::BEncoding => b_chunks(s, max_len),
        };

        chunks
            .iter()
            .map(|chunk| format!("=?{charset}?{tag}?{chunk}?="))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl WordDecoder {
    /// Creates a new WordDecoder.
    pub fn new() -> Self {
        Self
    }

    /// Decodes a single RFC 2047 encoded word such as `=?UTF-8?q?caf=C3=A9?=`.
    pub fn decode(&self, word: &str) -> Result<String> {
        let inner = word
            .strip_prefix("=?")
            .and_then(|w| w.strip_suffix("?="))
            .filter(|_| word.len() >= 8)
            .ok_or_else(|| Error::Encoding(format!("not an encoded word: {word:?}")))?;

        let mut fields = inner.splitn(3, '?');
        let (charset, encoding, text) = match (fields.next(), fields.next(), fields.next()) {
            (Some(c), Some(e), Some(t)) if !c.is_empty() && e.len() == 1 => (c, e, t),
            _ => return Err(Error::Encoding(format!("invalid encoded word: {word:?}"))),
        };

        let content = decode_text(encoding.as_bytes()[0], text)?;
        convert_charset(charset, content)
    }

    /// Decodes all encoded words of the given header value.
    ///
    /// Whitespace between two adjacent encoded words is dropped. Words that
    /// are malformed or use an unsupported charset are kept verbatim.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_email::WordDecoder;
    ///
    /// let decoded = WordDecoder::new()
    ///     .decode_header("Re: =?UTF-8?q?caf=C3=A9?= =?UTF-8?b?IGNyw6htZQ==?=")
    ///     .unwrap();
    /// assert_eq!(decoded, "Re: café crème");
    /// ```
    pub fn decode_header(&self, header: &str) -> Result<String> {
        let Some(first) = header.find("=?") else {
            return Ok(header.to_string());
        };

        let mut out = String::with_capacity(header.len());
        out.push_str(&header[..first]);
        let mut rest = &header[first..];
        let mut between_words = false;

        while let Some(start) = rest.find("=?") {
            let Some(end) = encoded_word_end(rest, start) else {
                break;
            };

            match self.decode(&rest[start..end]) {
                Ok(decoded) => {
                    let gap = &rest[..start];
                    if !between_words || !gap.chars().all(|c| c.is_ascii_whitespace()) {
                        out.push_str(gap);
                    }
                    out.push_str(&decoded);
                    rest = &rest[end..];
                    between_words = true;
                }
                Err(_) => {
                    out.push_str(&rest[..start + 2]);
                    rest = &rest[start + 2..];
                    between_words = false;
                }
            }
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Finds the exclusive end of the encoded word that starts at `start`.
fn encoded_word_end(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut cur = start + 2;
    cur += s.get(cur..)?.find('?')? + 1;
    // Encoding letter followed by '?'.
    if !bytes.get(cur)?.is_ascii_alphabetic() || *bytes.get(cur + 1)? != b'?' {
        return None;
    }
    cur += 2;
    Some(cur + s.get(cur..)?.find("?=")? + 2)
}

fn decode_text(encoding: u8, text: &str) -> Result<Vec<u8>> {
    match encoding {
        b'B' | b'b' => STANDARD
            .decode(text)
            .map_err(|e| Error::Encoding(format!("invalid B-encoded word: {e}"))),
        b'Q' | b'q' => q_decode(text.as_bytes()),
        other => Err(Error::Encoding(format!(
            "unknown encoded word encoding {:?}",
            other as char
        ))),
    }
}

fn q_decode(text: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        match text[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let byte = text
                    .get(i + 1..i + 3)
                    .and_then(hex_pair)
                    .ok_or_else(|| Error::Encoding("invalid Q-encoded escape".to_string()))?;
                out.push(byte);
                i += 2;
            }
            b if b == b'\t' || b == b' ' || (b'!'..=b'~').contains(&b) => out.push(b),
            b => {
                return Err(Error::Encoding(format!(
                    "invalid byte 0x{b:02x} in Q-encoded word"
                )))
            }
        }
        i += 1;
    }
    Ok(out)
}

fn convert_charset(charset: &str, content: Vec<u8>) -> Result<String> {
    // RFC 2231 allows a language suffix: utf-8*en
    let charset = charset.split('*').next().unwrap_or(charset);
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8(content)
            .map_err(|e| Error::Encoding(format!("invalid UTF-8 in encoded word: {e}"))),
        "us-ascii" | "ascii" => Ok(content
            .into_iter()
            .map(|b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
            .collect()),
        "iso-8859-1" | "latin1" => Ok(content.into_iter().map(char::from).collect()),
        other => Err(Error::Encoding(format!("unhandled charset {other:?}"))),
    }
}

/// Splits `s` into Q-encoded chunks no longer than `max_len`.
fn q_chunks(s: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut buf = [0u8; 4];

    for c in s.chars() {
        let mut encoded = String::new();
        for &b in c.encode_utf8(&mut buf).as_bytes() {
            if b == b' ' {
                encoded.push('_');
            } else if is_q_safe(b) {
                encoded.push(b as char);
            } else {
                encoded.push('=');
                encoded.push(UPPER_HEX[(b >> 4) as usize] as char);
                encoded.push(UPPER_HEX[(b & 0x0F) as usize] as char);
            }
        }

        if !current.is_empty() && current.len() + encoded.len() > max_len {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(&encoded);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Splits `s` into base64 chunks whose encoded form fits in `max_len`.
fn b_chunks(s: &str, max_len: usize) -> Vec<String> {
    let max_bytes = max_len / 4 * 3;
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut end = 0;

    for (i, c) in s.char_indices() {
        let next = i + c.len_utf8();
        if next - start > max_bytes && end > start {
            chunks.push(STANDARD.encode(&s.as_bytes()[start..end]));
            start = end;
        }
        end = next;
    }

    if end > start {
        chunks.push(STANDARD.encode(&s.as_bytes()[start..end]));
    }
    chunks
}

fn is_q_safe(b: u8) -> bool {
    (b'!'..=b'~').contains(&b) && b != b'=' && b != b'?' && b != b'_'
}

fn needs_encoding(s: &str) -> bool {
    s.chars().any(|c| (c < ' ' || c > '~') && c != '\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_ascii_passthrough() {
        assert_eq!(WordEncoder::QEncoding.encode("UTF-8", "Hello World"), "Hello World");
        assert_eq!(WordEncoder::BEncoding.encode("UTF-8", ""), "");
    }

    #[test]
    fn test_encode_q() {
        assert_eq!(
            WordEncoder::QEncoding.encode("UTF-8", "café au lait"),
            "=?UTF-8?q?caf=C3=A9_au_lait?="
        );
    }

    #[test]
    fn test_encode_b() {
        assert_eq!(
            WordEncoder::BEncoding.encode("UTF-8", "café"),
            "=?UTF-8?b?Y2Fmw6k=?="
        );
    }

    #[test]
    fn test_encode_splits_long_values() {
        let value = "日本語のテキスト".repeat(10);
        let encoded = WordEncoder::QEncoding.encode("UTF-8", &value);
        for word in encoded.split(' ') {
            assert!(word.len() <= MAX_ENCODED_WORD_LEN, "{word} too long");
            assert!(word.starts_with("=?UTF-8?q?") && word.ends_with("?="));
        }
        assert_eq!(WordDecoder::new().decode_header(&encoded).unwrap(), value);
    }

    #[test]
    fn test_decode_rfc_examples() {
        let d = WordDecoder::new();
        assert_eq!(d.decode("=?US-ASCII?Q?Keith_Moore?=").unwrap(), "Keith Moore");
        assert_eq!(
            d.decode("=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?=").unwrap(),
            "Keld Jørn Simonsen"
        );
        assert_eq!(d.decode("=?ISO-8859-1?Q?Andr=E9?=").unwrap(), "André");
        assert_eq!(
            d.decode("=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=").unwrap(),
            "If you can read this yo"
        );
    }

    #[test]
    fn test_decode_errors() {
        let d = WordDecoder::new();
        assert!(d.decode("plain").is_err());
        assert!(d.decode("=?UTF-8?X?abc?=").is_err());
        assert!(d.decode("=?UTF-8?Q?bad=ZZ?=").is_err());
        assert!(d.decode("=?UTF-8?q?=+F?=").is_err());
        assert!(d.decode("=?UTF-8?Q?=-1?=").is_err());
        assert!(d.decode("=?KOI8-R?Q?abc?=").is_err());
    }

    #[test]
    fn test_decode_header_whitespace_rules() {
        let d = WordDecoder::new();
        assert_eq!(d.decode_header("(=?ISO-8859-1?Q?a?=)").unwrap(), "(a)");
        assert_eq!(d.decode_header("(=?ISO-8859-1?Q?a?= b)").unwrap(), "(a b)");
        assert_eq!(
            d.decode_header("(=?ISO-8859-1?Q?a?= =?ISO-8859-1?Q?b?=)").unwrap(),
            "(ab)"
        );
        assert_eq!(
            d.decode_header("(=?ISO-8859-1?Q?a?=\r\n   =?ISO-8859-1?Q?b?=)").unwrap(),
            "(ab)"
        );
        assert_eq!(
            d.decode_header("(=?ISO-8859-1?Q?a_b?=)").unwrap(),
            "(a b)"
        );
    }

    #[test]
    fn test_decode_header_keeps_unknown_words() {
        let d = WordDecoder::new();
        assert_eq!(
            d.decode_header("=?KOI8-R?Q?abc?= and =?UTF-8?Q?ok?=").unwrap(),
            "=?KOI8-R?Q?abc?= and ok"
        );
        assert_eq!(d.decode_header("no words here").unwrap(), "no words here");
        assert_eq!(d.decode_header("dangling =? marker").unwrap(), "dangling =? marker");
    }

    proptest! {
        #[test]
        fn q_encoding_round_trips(s in "\\PC{0,120}") {
            let encoded = WordEncoder::QEncoding.encode("UTF-8", &s);
            prop_assert_eq!(WordDecoder::new().decode_header(&encoded).unwrap(), s);
        }

        #[test]
        fn b_encoding_round_trips(s in "[^=?]{0,120}") {
            let encoded = WordEncoder::BEncoding.encode("UTF-8", &s);
            prop_assert_eq!(WordDecoder::new().decode_header(&encoded).unwrap(), s);
        }

        #[test]
        fn decode_header_never_panics(s in "\\PC*") {
            let _ = WordDecoder::new().decode_header(&s);
        }
    }
}
