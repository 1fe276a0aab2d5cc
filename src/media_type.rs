//! Media type parsing and formatting.
//!
//! Implements RFC 2045 media types with RFC 2231 extended parameters.
//! The same grammar covers Content-Disposition values, which carry a bare
//! disposition token instead of a `type/subtype` pair.

use crate::error::{Error, Result};
use crate::grammar::{hex_pair, is_token, is_token_char, is_tspecial};
use std::collections::HashMap;

const UPPER_HEX: &[u8] = b"0123456789ABCDEF";

/// Parses a media type value and any optional parameters, per RFC 1521.
///
/// Returns the media type converted to lowercase and a map of parameters
/// keyed by lowercase name. Quoted parameter values are unquoted, and RFC
/// 2231 `name*=charset''value` / `name*0=` continuations are reassembled.
///
/// # Examples
///
/// ```
/// use tokio_email::parse_media_type;
///
/// let (media_type, params) = parse_media_type("multipart/mixed; boundary=\"a;b\"").unwrap();
/// assert_eq!(media_type, "multipart/mixed");
/// assert_eq!(params.get("boundary"), Some(&"a;b".to_string()));
/// ```
pub fn parse_media_type(v: &str) -> Result<(String, HashMap<String, String>)> {
    let (base, mut rest) = v.split_once(';').map_or((v, ""), |(b, r)| (b, r));
    let mediatype = base.trim().to_lowercase();
    check_media_type(&mediatype)?;

    let mut params = HashMap::new();
    let mut extended: HashMap<String, Vec<(String, String)>> = HashMap::new();

    loop {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_ascii_whitespace());
        if rest.is_empty() {
            break;
        }

        let (key, value, remainder) = consume_param(rest).ok_or_else(|| {
            Error::MediaType(format!("invalid media parameter in {v:?}"))
        })?;
        rest = remainder;

        if let Some((base_key, _)) = key.split_once('*') {
            extended
                .entry(base_key.to_string())
                .or_default()
                .push((key.clone(), value));
            continue;
        }

        if params.insert(key.clone(), value).is_some() {
            return Err(Error::MediaType(format!("duplicate parameter name {key:?}")));
        }
    }

    for (key, pieces) in extended {
        if let Some(value) = assemble_extended(&key, pieces) {
            params.insert(key, value);
        }
    }

    Ok((mediatype, params))
}

/// Serializes a media type and parameters per RFC 2045 and RFC 2231.
///
/// The type and parameter names are written in lower-case, parameters in
/// sorted order. Values that are not tokens are quoted; non-ASCII values use
/// the RFC 2231 `utf-8''` form. Returns an empty string for an invalid type.
///
/// # Examples
///
/// ```
/// use tokio_email::format_media_type;
/// use std::collections::HashMap;
///
/// let mut params = HashMap::new();
/// params.insert("charset".to_string(), "UTF-8".to_string());
/// assert_eq!(format_media_type("text/plain", &params), "text/plain; charset=UTF-8");
/// ```
pub fn format_media_type(t: &str, params: &HashMap<String, String>) -> String {
    let mut result = String::new();

    if let Some((major, sub)) = t.split_once('/') {
        if !is_token(major) || !is_token(sub) {
            return String::new();
        }
        result.push_str(&major.to_lowercase());
        result.push('/');
        result.push_str(&sub.to_lowercase());
    } else {
        if !is_token(t) {
            return String::new();
        }
        result.push_str(&t.to_lowercase());
    }

    let mut keys: Vec<_> = params.keys().collect();
    keys.sort();

    for key in keys {
        let value = &params[key];

        if !is_token(key) {
            return String::new();
        }

        result.push_str("; ");
        result.push_str(&key.to_lowercase());

        if needs_encoding(value) {
            result.push_str("*=utf-8''");
            for &b in value.as_bytes() {
                if b <= b' ' || b >= 0x7F || b == b'*' || b == b'\'' || b == b'%' || is_tspecial(b as char) {
                    result.push('%');
                    result.push(UPPER_HEX[(b >> 4) as usize] as char);
                    result.push(UPPER_HEX[(b & 0x0F) as usize] as char);
                } else {
                    result.push(b as char);
                }
            }
        } else if is_token(value) {
            result.push('=');
            result.push_str(value);
        } else {
            result.push_str("=\"");
            for ch in value.chars() {
                if ch == '"' || ch == '\\' {
                    result.push('\\');
                }
                result.push(ch);
            }
            result.push('"');
        }
    }

    result
}

fn check_media_type(mediatype: &str) -> Result<()> {
    if mediatype.is_empty() {
        return Err(Error::MediaType("no media type".to_string()));
    }
    match mediatype.split_once('/') {
        Some((major, sub)) if is_token(major) && is_token(sub) => Ok(()),
        Some(_) => Err(Error::MediaType(format!("invalid media type {mediatype:?}"))),
        // Content-Disposition values are a single token.
        None if is_token(mediatype) => Ok(()),
        None => Err(Error::MediaType(format!("invalid media type {mediatype:?}"))),
    }
}

/// Consumes `key=value` from the front of `s`, returning the lowercase key,
/// the unquoted value and the unconsumed remainder.
fn consume_param(s: &str) -> Option<(String, String, &str)> {
    let key_end = s.find(|c: char| !is_token_char(c)).unwrap_or(s.len());
    if key_end == 0 {
        return None;
    }
    let key = s[..key_end].to_lowercase();

    let rest = s[key_end..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();

    let (value, rest) = consume_value(rest)?;
    let rest = rest.trim_start();
    if !rest.is_empty() && !rest.starts_with(';') {
        return None;
    }
    Some((key, value, rest))
}

fn consume_value(s: &str) -> Option<(String, &str)> {
    let Some(quoted) = s.strip_prefix('"') else {
        let end = s.find(|c: char| !is_token_char(c)).unwrap_or(s.len());
        if end == 0 {
            return None;
        }
        return Some((s[..end].to_string(), &s[end..]));
    };

    let mut value = String::new();
    let mut chars = quoted.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((value, &quoted[i + 1..])),
            '\\' => value.push(chars.next()?.1),
            '\r' | '\n' => return None,
            _ => value.push(c),
        }
    }
    None
}

/// Reassembles RFC 2231 pieces for one parameter.
///
/// Handles both the single `name*=charset'lang'value` form and numbered
/// `name*0`, `name*1*` continuations. Pieces with unsupported charsets are
/// dropped.
fn assemble_extended(key: &str, mut pieces: Vec<(String, String)>) -> Option<String> {
    let single = format!("{key}*");
    if let Some((_, value)) = pieces.iter().find(|(k, _)| *k == single) {
        return decode_2231_value(value);
    }

    let mut numbered = Vec::new();
    for (k, v) in pieces.drain(..) {
        let suffix = &k[key.len() + 1..];
        let (index, encoded) = match suffix.strip_suffix('*') {
            Some(index) => (index, true),
            None => (suffix, false),
        };
        numbered.push((index.parse::<usize>().ok()?, encoded, v));
    }
    numbered.sort_by_key(|(index, _, _)| *index);

    let mut out = String::new();
    let mut charset_seen = false;
    for (position, (index, encoded, value)) in numbered.into_iter().enumerate() {
        if index != position {
            return None;
        }
        if !encoded {
            out.push_str(&value);
        } else if !charset_seen && index == 0 {
            charset_seen = true;
            out.push_str(&decode_2231_value(&value)?);
        } else {
            out.push_str(&String::from_utf8(percent_decode(&value)?).ok()?);
        }
    }
    Some(out)
}

fn decode_2231_value(value: &str) -> Option<String> {
    let mut fields = value.splitn(3, '\'');
    let charset = fields.next()?.to_ascii_lowercase();
    let _language = fields.next()?;
    let encoded = fields.next()?;

    let bytes = percent_decode(encoded)?;
    match charset.as_str() {
        "us-ascii" | "utf-8" | "" => String::from_utf8(bytes).ok(),
        "iso-8859-1" => Some(bytes.into_iter().map(char::from).collect()),
        _ => None,
    }
}

fn percent_decode(s: &str) -> Option<Vec<u8>> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            out.push(hex_pair(bytes.get(i + 1..i + 3)?)?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}

/// Checks if a string needs encoding per RFC 2231.
fn needs_encoding(s: &str) -> bool {
    s.chars().any(|ch| (ch < ' ' || ch > '~') && ch != '\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_type_simple() {
        let (media_type, params) = parse_media_type("Text/HTML").unwrap();
        assert_eq!(media_type, "text/html");
        assert!(params.is_empty());
    }

    #[test]
    fn test_parse_media_type_with_charset() {
        let (media_type, params) = parse_media_type("text/html; Charset=utf-8").unwrap();
        assert_eq!(media_type, "text/html");
        assert_eq!(params.get("charset"), Some(&"utf-8".to_string()));
    }

    #[test]
    fn test_parse_media_type_quoted_value() {
        let (_, params) =
            parse_media_type(r#"multipart/mixed; boundary="a \"quoted\"; boundary""#).unwrap();
        assert_eq!(params.get("boundary"), Some(&r#"a "quoted"; boundary"#.to_string()));
    }

    #[test]
    fn test_parse_media_type_trailing_semicolon() {
        let (media_type, params) = parse_media_type("text/plain; charset=us-ascii;").unwrap();
        assert_eq!(media_type, "text/plain");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_parse_disposition() {
        let (disposition, params) =
            parse_media_type("attachment; filename=\"report 2024.pdf\"").unwrap();
        assert_eq!(disposition, "attachment");
        assert_eq!(params.get("filename"), Some(&"report 2024.pdf".to_string()));
    }

    #[test]
    fn test_parse_media_type_errors() {
        assert!(parse_media_type("").is_err());
        assert!(parse_media_type("text/").is_err());
        assert!(parse_media_type("text/plain; charset").is_err());
        assert!(parse_media_type("text/plain; charset=\"unterminated").is_err());
        assert!(parse_media_type("text/plain; a=1; A=2").is_err());
    }

    #[test]
    fn test_parse_rfc2231() {
        let (_, params) =
            parse_media_type("attachment; filename*=utf-8''caf%C3%A9.txt").unwrap();
        assert_eq!(params.get("filename"), Some(&"café.txt".to_string()));

        let (_, params) =
            parse_media_type("attachment; name*0=\"long\"; name*1=\"-name\"; name*2*=%21").unwrap();
        assert_eq!(params.get("name"), Some(&"long-name!".to_string()));

        let (_, params) = parse_media_type("attachment; filename*=utf-8''a%+Fb").unwrap();
        assert_eq!(params.get("filename"), None);
    }

    #[test]
    fn test_format_media_type() {
        let params = HashMap::new();
        assert_eq!(format_media_type("text/html", &params), "text/html");

        let mut params = HashMap::new();
        params.insert("name".to_string(), "hello world".to_string());
        params.insert("charset".to_string(), "utf-8".to_string());
        assert_eq!(
            format_media_type("text/plain", &params),
            "text/plain; charset=utf-8; name=\"hello world\""
        );
    }

    #[test]
    fn test_format_then_parse_non_ascii() {
        let mut params = HashMap::new();
        params.insert("filename".to_string(), "naïve.txt".to_string());
        let formatted = format_media_type("attachment", &params);
        assert_eq!(formatted, "attachment; filename*=utf-8''na%C3%AFve.txt");

        let (_, parsed) = parse_media_type(&formatted).unwrap();
        assert_eq!(parsed.get("filename"), Some(&"naïve.txt".to_string()));
    }
}
