//! HTTP response building module
//!
//! Builders for the fixed-shape responses of the file server: errors,
//! redirects, conditional outcomes and generated HTML.

use super::body::{empty, full, ResponseBody};
use hyper::header::{
    HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
    ETAG, LAST_MODIFIED, LOCATION,
};
use hyper::{Response, StatusCode};

/// Content type of plain-text error bodies
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Build a plain-text error response
///
/// The body is the message followed by a newline.
pub fn build_error_response(status: StatusCode, message: &str) -> Response<ResponseBody> {
    let body = format!("{message}\n");
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, TEXT_PLAIN)
        .header("X-Content-Type-Options", "nosniff")
        .header(CONTENT_LENGTH, body.len())
        .body(full(body))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            fallback(status)
        })
}

/// Build 301 redirect response with a relative location
pub fn build_redirect_response(location: &str) -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(LOCATION, location)
        .body(empty())
        .unwrap_or_else(|e| {
            log_build_error("301", &e);
            fallback(StatusCode::MOVED_PERMANENTLY)
        })
}

/// Build 304 Not Modified from the headers accumulated so far
///
/// Entity headers are dropped, and `Last-Modified` is redundant once an
/// `ETag` is present.
pub fn build_not_modified_response(mut headers: HeaderMap) -> Response<ResponseBody> {
    headers.remove(CONTENT_TYPE);
    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_ENCODING);
    if headers.contains_key(ETAG) {
        headers.remove(LAST_MODIFIED);
    }
    with_headers(StatusCode::NOT_MODIFIED, headers, empty())
}

/// Build 412 Precondition Failed (no body)
pub fn build_precondition_failed_response(headers: HeaderMap) -> Response<ResponseBody> {
    with_headers(StatusCode::PRECONDITION_FAILED, headers, empty())
}

/// Build 416 Range Not Satisfiable for a resource of `size` bytes
pub fn build_416_response(size: u64) -> Response<ResponseBody> {
    let mut resp = build_error_response(
        StatusCode::RANGE_NOT_SATISFIABLE,
        "invalid range: failed to overlap",
    );
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
        resp.headers_mut().insert(CONTENT_RANGE, value);
    }
    resp
}

/// Build generic HTML response
pub fn build_html_response(
    content: String,
    headers: HeaderMap,
    is_head: bool,
) -> Response<ResponseBody> {
    let content_length = content.len();
    let body = if is_head { empty() } else { full(content) };
    let mut resp = with_headers(StatusCode::OK, headers, body);
    let h = resp.headers_mut();
    h.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    h.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
    resp
}

/// Assemble a response from a status, a header map and a body
pub fn with_headers(
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
) -> Response<ResponseBody> {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}

fn fallback(status: StatusCode) -> Response<ResponseBody> {
    let mut resp = Response::new(empty());
    *resp.status_mut() = status;
    resp
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_error_response_shape() {
        let resp = build_error_response(StatusCode::NOT_FOUND, "404 page not found");
        assert_eq!(resp.status(), 404);
        assert_eq!(resp.headers()[CONTENT_TYPE], TEXT_PLAIN);
        assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"404 page not found\n");
    }

    #[test]
    fn test_not_modified_strips_entity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(10));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(ETAG, HeaderValue::from_static("\"x\""));
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        let resp = build_not_modified_response(headers);
        assert_eq!(resp.status(), 304);
        let h = resp.headers();
        assert!(!h.contains_key(CONTENT_TYPE));
        assert!(!h.contains_key(CONTENT_LENGTH));
        assert!(!h.contains_key(CONTENT_ENCODING));
        assert!(!h.contains_key(LAST_MODIFIED));
        assert_eq!(h[ETAG], "\"x\"");
    }

    #[test]
    fn test_not_modified_keeps_last_modified_without_etag() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        let resp = build_not_modified_response(headers);
        assert!(resp.headers().contains_key(LAST_MODIFIED));
    }

    #[test]
    fn test_416_carries_size() {
        let resp = build_416_response(1234);
        assert_eq!(resp.status(), 416);
        assert_eq!(resp.headers()[CONTENT_RANGE], "bytes */1234");
    }

    #[test]
    fn test_redirect() {
        let resp = build_redirect_response("dir/?x=1");
        assert_eq!(resp.status(), 301);
        assert_eq!(resp.headers()[LOCATION], "dir/?x=1");
    }

    #[test]
    fn test_html_head_keeps_length() {
        let resp = build_html_response("<pre></pre>".to_string(), HeaderMap::new(), true);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "11");
    }
}
