//! MIME type detection module
//!
//! Content-Type comes from the file extension when one is known, and
//! otherwise from sniffing the first bytes of the content.

/// Number of leading bytes considered when sniffing
pub const SNIFF_LEN: usize = 512;

/// Fallback for content that looks binary
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Look up the Content-Type for a file name by its extension
///
/// Text types get an explicit UTF-8 charset. Returns `None` when the
/// extension is missing or unknown.
///
/// # Examples
/// ```
/// use dirserve::http::mime::content_type_for_name;
/// assert_eq!(content_type_for_name("index.html").as_deref(), Some("text/html; charset=utf-8"));
/// assert_eq!(content_type_for_name("movie.mp4").as_deref(), Some("video/mp4"));
/// assert_eq!(content_type_for_name("README"), None);
/// ```
pub fn content_type_for_name(name: &str) -> Option<String> {
    let ext = extension(name)?;
    let mime = mime_guess::from_ext(ext).first()?;
    if mime.type_() == mime_guess::mime::TEXT && mime.get_param(mime_guess::mime::CHARSET).is_none() {
        Some(format!("{}; charset=utf-8", mime.essence_str()))
    } else {
        Some(mime.to_string())
    }
}

/// Extension of the final path element, without the dot
fn extension(name: &str) -> Option<&str> {
    let base = name.rsplit('/').next().unwrap_or(name);
    let (_, ext) = base.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Guess a Content-Type from leading content bytes
///
/// Recognises common markup, document, image, audio, video, font and
/// archive signatures. Anything else is `text/plain; charset=utf-8` when it
/// contains no binary control bytes, else `application/octet-stream`.
pub fn sniff(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if let Some(ct) = sniff_markup(data) {
        return ct;
    }
    for &(sig, ct) in MAGIC {
        if data.starts_with(sig) {
            return ct;
        }
    }
    if let Some(ct) = sniff_riff(data) {
        return ct;
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return "video/mp4";
    }
    if data.iter().any(|&b| is_binary(b)) {
        OCTET_STREAM
    } else {
        "text/plain; charset=utf-8"
    }
}

const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

const MAGIC: &[(&[u8], &str)] = &[
    (b"\xEF\xBB\xBF", "text/plain; charset=utf-8"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\r\n\x1A\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"fLaC", "audio/flac"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

fn sniff_markup(data: &[u8]) -> Option<&'static str> {
    let start = data.iter().position(|b| !is_ws(*b))?;
    let data = &data[start..];
    if data.starts_with(b"<?xml") {
        return Some("text/xml; charset=utf-8");
    }
    for tag in HTML_TAGS {
        if data.len() <= tag.len() {
            continue;
        }
        if data[..tag.len()].eq_ignore_ascii_case(tag) && matches!(data[tag.len()], b' ' | b'>') {
            return Some("text/html; charset=utf-8");
        }
    }
    None
}

fn sniff_riff(data: &[u8]) -> Option<&'static str> {
    if data.len() < 16 || !data.starts_with(b"RIFF") {
        return None;
    }
    match &data[8..12] {
        b"WAVE" => Some("audio/wave"),
        b"AVI " => Some("video/avi"),
        b"WEBP" => Some("image/webp"),
        _ => None,
    }
}

const fn is_ws(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | 0x0C | b'\r' | b' ')
}

const fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_types() {
        assert_eq!(
            content_type_for_name("a/b/index.html").as_deref(),
            Some("text/html; charset=utf-8")
        );
        assert_eq!(
            content_type_for_name("notes.txt").as_deref(),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(content_type_for_name("pic.PNG").as_deref(), Some("image/png"));
        assert_eq!(
            content_type_for_name("style.css").as_deref(),
            Some("text/css; charset=utf-8")
        );
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(content_type_for_name("file.unknownext"), None);
        assert_eq!(content_type_for_name("Makefile"), None);
        assert_eq!(content_type_for_name("trailing."), None);
        assert_eq!(content_type_for_name("dir.d/noext"), None);
    }

    #[test]
    fn test_sniff_html() {
        assert_eq!(sniff(b"  <!doctype html><p>hi"), "text/html; charset=utf-8");
        assert_eq!(sniff(b"<html>"), "text/html; charset=utf-8");
        assert_eq!(sniff(b"<a href=x>"), "text/html; charset=utf-8");
        // Tag must be terminated
        assert_eq!(sniff(b"<abbr>"), "text/plain; charset=utf-8");
        assert_eq!(sniff(b"<?xml version=\"1.0\"?>"), "text/xml; charset=utf-8");
    }

    #[test]
    fn test_sniff_binary_signatures() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1A\n\0\0\0\rIHDR"), "image/png");
        assert_eq!(sniff(b"%PDF-1.7\n"), "application/pdf");
        assert_eq!(sniff(b"PK\x03\x04rest"), "application/zip");
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff(b"\0\0\0\x18ftypmp42"), "video/mp4");
    }

    #[test]
    fn test_sniff_fallbacks() {
        assert_eq!(sniff(b"just some words\n"), "text/plain; charset=utf-8");
        assert_eq!(sniff(b""), "text/plain; charset=utf-8");
        assert_eq!(sniff(b"abc\x00def"), OCTET_STREAM);
        assert_eq!(sniff(b"\x01\x02\x03"), OCTET_STREAM);
    }
}
