//! Grammar helpers for MIME tokens and header field names.
//!
//! Based on RFC 2045 token definitions and the RFC 5322 field-name rule.

/// Reports whether the character is in 'tspecials' as defined by RFC 1521 and RFC 2045.
///
/// tspecials := "(" / ")" / "<" / ">" / "@" / "," / ";" / ":" / "\" / <"> / "/" / "[" / "]" / "?" / "="
pub fn is_tspecial(c: char) -> bool {
    matches!(c, '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '=')
}

/// Reports whether the character is in 'token' as defined by RFC 1521 and RFC 2045.
///
/// token := 1*<any (US-ASCII) CHAR except SPACE, CTLs, or tspecials>
pub fn is_token_char(c: char) -> bool {
    c > '\x20' && c < '\x7f' && !is_tspecial(c)
}

/// Reports whether the string is a valid 'token' as defined by RFC 1521 and RFC 2045.
pub fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_token_char)
}

/// Reports whether the byte may appear in a header field name.
///
/// field-name := 1*ftext, ftext := %d33-57 / %d59-126
pub fn is_field_name_byte(b: u8) -> bool {
    (33..=126).contains(&b) && b != b':'
}

/// Reports whether the string is a valid header field name.
pub fn is_field_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_field_name_byte)
}

/// Whitespace as far as folding, trimming and boundary detection go.
pub fn is_ascii_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Returns the canonical form of a header key.
///
/// The first letter and every letter following a hyphen are upper-cased,
/// the rest lower-cased, so `content-type` becomes `Content-Type` and
/// `MESSAGE-ID` becomes `Message-Id`. Keys that are not valid field names
/// (for example ones containing spaces) are returned unchanged.
pub fn canonical_header_key(key: &str) -> String {
    if !is_field_name(key) {
        return key.to_string();
    }

    let mut upper = true;
    key.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// Trims leading and trailing ASCII whitespace from a byte slice.
pub fn trim_ascii_space(mut b: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = b {
        if !is_ascii_space(*first) {
            break;
        }
        b = rest;
    }
    trim_ascii_space_end(b)
}

/// Trims trailing ASCII whitespace from a byte slice.
pub fn trim_ascii_space_end(mut b: &[u8]) -> &[u8] {
    while let [rest @ .., last] = b {
        if !is_ascii_space(*last) {
            break;
        }
        b = rest;
    }
    b
}

/// Decodes two hex digits, as used by `=XX` and `%XX` escapes.
pub fn hex_pair(hex: &[u8]) -> Option<u8> {
    fn digit(b: u8) -> Option<u8> {
        (b as char).to_digit(16).map(|d| d as u8)
    }
    match hex {
        [hi, lo] => Some(digit(*hi)? << 4 | digit(*lo)?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tspecial() {
        for c in "()<>@,;:\\\"/[]?=".chars() {
            assert!(is_tspecial(c), "{c:?} should be a tspecial");
        }
        assert!(!is_tspecial('a'));
        assert!(!is_tspecial('Z'));
        assert!(!is_tspecial('0'));
    }

    #[test]
    fn test_is_token() {
        assert!(is_token("text"));
        assert!(is_token("x-custom-value"));

        assert!(!is_token(""));
        assert!(!is_token("text/plain"));
        assert!(!is_token("with space"));
        assert!(!is_token("with(paren"));
        assert!(!is_token("tab\there"));
    }

    #[test]
    fn test_is_field_name() {
        assert!(is_field_name("Content-Type"));
        assert!(is_field_name("X-Mailer"));
        assert!(!is_field_name(""));
        assert!(!is_field_name("Bad Field"));
        assert!(!is_field_name("Colon:"));
    }

    #[test]
    fn test_canonical_header_key() {
        assert_eq!(canonical_header_key("content-type"), "Content-Type");
        assert_eq!(canonical_header_key("CONTENT-TRANSFER-ENCODING"), "Content-Transfer-Encoding");
        assert_eq!(canonical_header_key("message-id"), "Message-Id");
        assert_eq!(canonical_header_key("MIME-Version"), "Mime-Version");
        assert_eq!(canonical_header_key("subject"), "Subject");
        assert_eq!(canonical_header_key("has space"), "has space");
    }

    #[test]
    fn test_trim_ascii_space() {
        assert_eq!(trim_ascii_space(b"\r\n  hello \t\r\n"), b"hello");
        assert_eq!(trim_ascii_space(b" \r\n "), b"");
        assert_eq!(trim_ascii_space_end(b"  a b \n"), b"  a b");
    }

    #[test]
    fn test_hex_pair() {
        assert_eq!(hex_pair(b"3D"), Some(0x3d));
        assert_eq!(hex_pair(b"c3"), Some(0xc3));
        assert_eq!(hex_pair(b"+F"), None);
        assert_eq!(hex_pair(b"-1"), None);
        assert_eq!(hex_pair(b"G0"), None);
        assert_eq!(hex_pair(b"A"), None);
    }
}
