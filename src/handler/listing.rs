//! Directory listing
//!
//! Turns a directory's children into sorted [`ListingRecord`]s and renders
//! them as a small HTML page.

use crate::fs::{Listing, Resource};
use crate::http::body::ResponseBody;
use crate::http::response::{build_error_response, build_html_response};
use crate::logger;
use hyper::header::HeaderMap;
use hyper::{Response, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt::Write;

/// Characters escaped in a URL path: everything but unreserved and `$&+,/:;=@`
const PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    /// HTML-escaped name, `/`-suffixed for directories
    pub display_name: String,
    /// URL-path-escaped relative link
    pub href: String,
    pub is_dir: bool,
    /// Files only
    pub thumbnail_href: Option<String>,
    /// Files only
    pub download_href: Option<String>,
    /// Directories only: tar then zip
    pub archive_hrefs: Vec<String>,
}

/// Build records for every child, in byte-wise name order
pub fn build_records(mut listing: Listing, archive: bool) -> Vec<ListingRecord> {
    listing.sort_by_name();
    (0..listing.len())
        .map(|i| {
            let is_dir = listing.is_dir(i);
            let mut name = listing.name(i).to_string();
            if is_dir {
                name.push('/');
            }
            let href = escape_path(&name);
            let (thumbnail_href, download_href, archive_hrefs) = if is_dir {
                let archives = if archive {
                    vec![format!("{href}?archive=tar"), format!("{href}?archive=zip")]
                } else {
                    Vec::new()
                };
                (None, None, archives)
            } else {
                (
                    Some(format!("{href}?thumb=true")),
                    Some(format!("{href}?dl=true")),
                    Vec::new(),
                )
            };
            ListingRecord {
                display_name: escape_html(&name),
                href,
                is_dir,
                thumbnail_href,
                download_href,
                archive_hrefs,
            }
        })
        .collect()
}

/// Escape a relative name for use as a link target
///
/// A first segment containing `:` gets a `./` prefix so it isn't taken for
/// a URL scheme.
pub fn escape_path(name: &str) -> String {
    let escaped = utf8_percent_encode(name, PATH).to_string();
    let first_segment = escaped.split('/').next().unwrap_or_default();
    if first_segment.contains(':') {
        format!("./{escaped}")
    } else {
        escaped
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render records as an HTML page
pub fn render(records: &[ListingRecord]) -> String {
    let mut html = String::from(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         </head>\n<body>\n<a href=\"..\">..</a>\n<ul>\n",
    );
    for r in records {
        let _ = write!(html, "<li><a href=\"{}\">{}</a>", r.href, r.display_name);
        if let Some(thumb) = &r.thumbnail_href {
            let _ = write!(html, " <a href=\"{thumb}\">thumb</a>");
        }
        if let Some(dl) = &r.download_href {
            let _ = write!(html, " <a href=\"{dl}\">dl</a>");
        }
        for (href, label) in r.archive_hrefs.iter().zip(["tar", "zip"]) {
            let _ = write!(html, " <a href=\"{href}\">{label}</a>");
        }
        html.push_str("</li>\n");
    }
    html.push_str("</ul>\n</body>\n</html>\n");
    html
}

/// List an opened directory as an HTML response
pub async fn serve_listing<R: Resource>(
    dir: &mut R,
    headers: HeaderMap,
    is_head: bool,
    archive: bool,
) -> Response<ResponseBody> {
    match dir.read_dir().await {
        Ok(listing) => {
            let records = build_records(listing, archive);
            build_html_response(render(&records), headers, is_head)
        }
        Err(e) => {
            logger::log_error(&format!("Error reading directory: {e}"));
            build_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error reading directory")
        }
    }
}
