//! HTTP cache validation module
//!
//! Entity tag handling and conditional request evaluation (RFC 7232).
//! The checks run in a fixed order: `If-Match`, `If-Unmodified-Since`,
//! `If-None-Match`, `If-Modified-Since`, then `If-Range` decides whether a
//! `Range` header is honoured.

use crate::fs::Metadata;
use hyper::header::{
    HeaderMap, HeaderName, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE,
    IF_UNMODIFIED_SINCE, RANGE,
};
use hyper::Method;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of a single precondition check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Header absent (or not applicable)
    Indeterminate,
    Satisfied,
    Failed,
}

/// Overall verdict for a request against a resource's validators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Deliver the content; `range` is the `Range` header still to honour
    Proceed { range: Option<String> },
    /// Answer 304
    NotModified,
    /// Answer 412
    Failed,
}

/// Generate a strong `ETag` from the modification time and size
///
/// Format: `"<mtime-seconds-hex>-<size-hex>"`. Resources without a known
/// modification time get no tag.
pub fn generate_etag(meta: &Metadata) -> Option<String> {
    let secs = meta.modified.filter(|t| !is_zero_time(*t))?;
    let secs = unix_seconds(secs);
    Some(format!("\"{secs:x}-{:x}\"", meta.len))
}

/// Evaluate all preconditions for a request
///
/// # Arguments
/// * `etag` - The resource's current entity tag, if any
/// * `modified` - The resource's modification time, if known
pub fn evaluate(
    method: &Method,
    headers: &HeaderMap,
    etag: Option<&str>,
    modified: Option<SystemTime>,
) -> Precondition {
    let mut ch = check_if_match(headers, etag);
    if ch == Condition::Indeterminate {
        ch = check_if_unmodified_since(headers, modified);
    }
    if ch == Condition::Failed {
        return Precondition::Failed;
    }

    match check_if_none_match(headers, etag) {
        Condition::Failed => {
            return if is_get_or_head(method) {
                Precondition::NotModified
            } else {
                Precondition::Failed
            };
        }
        Condition::Indeterminate => {
            if check_if_modified_since(method, headers, modified) == Condition::Failed {
                return Precondition::NotModified;
            }
        }
        Condition::Satisfied => {}
    }

    let mut range = header_value(headers, &RANGE);
    if range.is_some() && check_if_range(method, headers, etag, modified) == Condition::Failed {
        range = None;
    }
    Precondition::Proceed { range }
}

/// `If-Match`: satisfied when any listed tag strongly matches, or on `*`
pub fn check_if_match(headers: &HeaderMap, etag: Option<&str>) -> Condition {
    let Some(im) = header_value(headers, &IF_MATCH) else {
        return Condition::Indeterminate;
    };
    let mut rest = im.as_str();
    loop {
        rest = trim_ascii(rest);
        if rest.is_empty() {
            break;
        }
        if let Some(next) = rest.strip_prefix(',') {
            rest = next;
            continue;
        }
        if rest.starts_with('*') {
            return Condition::Satisfied;
        }
        let Some((tag, remain)) = scan_etag(rest) else {
            break;
        };
        if etag.is_some_and(|current| strong_match(tag, current)) {
            return Condition::Satisfied;
        }
        rest = remain;
    }
    Condition::Failed
}

/// `If-Unmodified-Since`, compared at one-second resolution
pub fn check_if_unmodified_since(headers: &HeaderMap, modified: Option<SystemTime>) -> Condition {
    let Some(ius) = header_value(headers, &IF_UNMODIFIED_SINCE) else {
        return Condition::Indeterminate;
    };
    let Some(modified) = modified.filter(|t| !is_zero_time(*t)) else {
        return Condition::Indeterminate;
    };
    let Ok(since) = httpdate::parse_http_date(&ius) else {
        return Condition::Indeterminate;
    };
    if unix_seconds(modified) <= unix_seconds(since) {
        Condition::Satisfied
    } else {
        Condition::Failed
    }
}

/// `If-None-Match`: fails when any listed tag weakly matches, or on `*`
pub fn check_if_none_match(headers: &HeaderMap, etag: Option<&str>) -> Condition {
    let Some(inm) = header_value(headers, &IF_NONE_MATCH) else {
        return Condition::Indeterminate;
    };
    let mut rest = inm.as_str();
    loop {
        rest = trim_ascii(rest);
        if rest.is_empty() {
            break;
        }
        if let Some(next) = rest.strip_prefix(',') {
            rest = next;
            continue;
        }
        if rest.starts_with('*') {
            return Condition::Failed;
        }
        let Some((tag, remain)) = scan_etag(rest) else {
            break;
        };
        if etag.is_some_and(|current| weak_match(tag, current)) {
            return Condition::Failed;
        }
        rest = remain;
    }
    Condition::Satisfied
}

/// `If-Modified-Since`, only for GET and HEAD
pub fn check_if_modified_since(
    method: &Method,
    headers: &HeaderMap,
    modified: Option<SystemTime>,
) -> Condition {
    if !is_get_or_head(method) {
        return Condition::Indeterminate;
    }
    let Some(ims) = header_value(headers, &IF_MODIFIED_SINCE) else {
        return Condition::Indeterminate;
    };
    let Some(modified) = modified.filter(|t| !is_zero_time(*t)) else {
        return Condition::Indeterminate;
    };
    let Ok(since) = httpdate::parse_http_date(&ims) else {
        return Condition::Indeterminate;
    };
    if unix_seconds(modified) <= unix_seconds(since) {
        Condition::Failed
    } else {
        Condition::Satisfied
    }
}

/// `If-Range`: an entity tag must strongly match, a date must equal the
/// modification time to the second
pub fn check_if_range(
    method: &Method,
    headers: &HeaderMap,
    etag: Option<&str>,
    modified: Option<SystemTime>,
) -> Condition {
    if !is_get_or_head(method) {
        return Condition::Indeterminate;
    }
    let Some(ir) = header_value(headers, &IF_RANGE) else {
        return Condition::Indeterminate;
    };
    if let Some((tag, _)) = scan_etag(&ir) {
        return if etag.is_some_and(|current| strong_match(tag, current)) {
            Condition::Satisfied
        } else {
            Condition::Failed
        };
    }
    let Some(modified) = modified else {
        return Condition::Failed;
    };
    let Ok(date) = httpdate::parse_http_date(&ir) else {
        return Condition::Failed;
    };
    if unix_seconds(date) == unix_seconds(modified) {
        Condition::Satisfied
    } else {
        Condition::Failed
    }
}

/// Scan one entity tag off the front of `s`
///
/// Returns the tag (with any `W/` prefix and quotes) and the remainder.
pub fn scan_etag(s: &str) -> Option<(&str, &str)> {
    let s = trim_ascii(s);
    let start = if s.starts_with("W/") { 2 } else { 0 };
    let bytes = s.as_bytes();
    if bytes.len() - start < 2 || bytes[start] != b'"' {
        return None;
    }
    for (i, &c) in bytes.iter().enumerate().skip(start + 1) {
        match c {
            b'"' => return Some((&s[..=i], &s[i + 1..])),
            0x21 | 0x23..=0x7E | 0x80..=0xFF => {}
            _ => return None,
        }
    }
    None
}

/// Strong comparison: identical and neither is weak
pub fn strong_match(a: &str, b: &str) -> bool {
    a == b && !a.is_empty() && !a.starts_with("W/")
}

/// Weak comparison: identical once any `W/` prefix is removed
pub fn weak_match(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}

/// Format a modification time as an HTTP date, unless it is unknown
pub fn last_modified_value(modified: Option<SystemTime>) -> Option<String> {
    modified
        .filter(|t| !is_zero_time(*t))
        .map(httpdate::fmt_http_date)
}

/// The Unix epoch counts as "unknown" modification time
pub fn is_zero_time(t: SystemTime) -> bool {
    t == UNIX_EPOCH
}

/// Whole seconds since the epoch, rounded towards the past
fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(e) => {
            let d = e.duration();
            let secs = i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
            if d.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}

fn is_get_or_head(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Header value as text; empty values count as absent
fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .filter(|v| !v.is_empty())
}

fn trim_ascii(s: &str) -> &str {
    s.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'))
}
