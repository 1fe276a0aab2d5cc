//! MIME type detection by file extension.
//!
//! A fixed built-in table covering the attachment types mail clients send
//! most often. Text types carry `charset=utf-8`. Lookups are
//! case-insensitive.

use crate::error::Result;
use crate::media_type::parse_media_type;
use std::path::Path;

/// Built-in MIME type mappings (all lowercase extensions).
static BUILTIN_TYPES: &[(&str, &str)] = &[
    (".avif", "image/avif"),
    (".bmp", "image/bmp"),
    (".csv", "text/csv; charset=utf-8"),
    (".css", "text/css; charset=utf-8"),
    (".doc", "application/msword"),
    (".docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    (".eml", "message/rfc822"),
    (".gif", "image/gif"),
    (".gz", "application/gzip"),
    (".htm", "text/html; charset=utf-8"),
    (".html", "text/html; charset=utf-8"),
    (".ics", "text/calendar; charset=utf-8"),
    (".jpeg", "image/jpeg"),
    (".jpg", "image/jpeg"),
    (".js", "text/javascript; charset=utf-8"),
    (".json", "application/json"),
    (".mjs", "text/javascript; charset=utf-8"),
    (".mp3", "audio/mpeg"),
    (".mp4", "video/mp4"),
    (".pdf", "application/pdf"),
    (".png", "image/png"),
    (".svg", "image/svg+xml"),
    (".tar", "application/x-tar"),
    (".tif", "image/tiff"),
    (".tiff", "image/tiff"),
    (".txt", "text/plain; charset=utf-8"),
    (".wasm", "application/wasm"),
    (".webp", "image/webp"),
    (".xls", "application/vnd.ms-excel"),
    (".xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    (".xml", "text/xml; charset=utf-8"),
    (".zip", "application/zip"),
];

/// Returns the MIME type associated with the file extension ext.
///
/// The extension ext should begin with a leading dot, as in ".html".
/// When ext has no associated type, returns None.
///
/// # Examples
///
/// ```
/// use tokio_email::mime_type::type_by_extension;
///
/// assert_eq!(type_by_extension(".html"), Some("text/html; charset=utf-8"));
/// assert_eq!(type_by_extension(".JPG"), Some("image/jpeg"));
/// assert_eq!(type_by_extension(".unknown"), None);
/// ```
pub fn type_by_extension(ext: &str) -> Option<&'static str> {
    let lower = ext.to_ascii_lowercase();
    BUILTIN_TYPES
        .iter()
        .find(|(known, _)| *known == lower)
        .map(|(_, mime)| *mime)
}

/// Returns the MIME type for the extension of `filename`, if known.
pub fn type_by_filename(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?;
    type_by_extension(&format!(".{ext}"))
}

/// Returns the extensions known to be associated with the MIME type typ,
/// sorted, each with a leading dot.
pub fn extensions_by_type(mime_type: &str) -> Result<Vec<&'static str>> {
    let (just_type, _) = parse_media_type(mime_type)?;
    let mut exts: Vec<&'static str> = BUILTIN_TYPES
        .iter()
        .filter(|(_, mime)| {
            parse_media_type(mime).is_ok_and(|(known, _)| known == just_type)
        })
        .map(|(ext, _)| *ext)
        .collect();
    exts.sort_unstable();
    Ok(exts)
}
