//! Content delivery
//!
//! Serves an opened, seekable resource: conditional requests, content type
//! detection, single and multi-range partial responses, HEAD, and forced
//! download disposition.

use crate::http::body::{self, pipe, PipeSender, ResponseBody, PIPE_CAPACITY};
use crate::http::cache::{self, Precondition};
use crate::http::mime::{content_type_for_name, sniff, OCTET_STREAM, SNIFF_LEN};
use crate::http::multipart::MultipartRanges;
use crate::http::range::{parse_range, sum_ranges, ByteRange, RangeError};
use crate::http::response::{
    build_not_modified_response, build_precondition_failed_response, with_headers,
};
use crate::http::ServeError;
use crate::logger;
use hyper::body::Bytes;
use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_ENCODING,
    CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED,
};
use hyper::{Method, Response, StatusCode};
use std::io::{self, SeekFrom};
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Read buffer for multipart producers
const COPY_BUF_SIZE: usize = 32 * 1024;

/// The parts of a request that content delivery looks at
#[derive(Debug, Clone, Copy)]
pub struct ContentRequest<'a> {
    pub method: &'a Method,
    pub headers: &'a HeaderMap,
    /// `?dl=true`: serve as an attachment
    pub force_download: bool,
}

impl ContentRequest<'_> {
    fn is_head(&self) -> bool {
        *self.method == Method::HEAD
    }
}

/// Serve `content` named `name`
///
/// # Arguments
/// * `modified` - Modification time, used for `Last-Modified` and date validators
/// * `size` - Content length when known; otherwise measured by seeking
/// * `headers` - Response headers set upstream (e.g. `ETag`, `Content-Type`)
pub async fn serve_content<R>(
    req: &ContentRequest<'_>,
    name: &str,
    modified: Option<SystemTime>,
    size: Option<u64>,
    mut headers: HeaderMap,
    content: R,
) -> Response<ResponseBody>
where
    R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
{
    if req.force_download {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
        if let Ok(value) = HeaderValue::from_bytes(attachment(name).as_bytes()) {
            headers.insert(CONTENT_DISPOSITION, value);
        }
    }
    if let Some(lm) = cache::last_modified_value(modified) {
        if let Ok(value) = HeaderValue::from_str(&lm) {
            headers.insert(LAST_MODIFIED, value);
        }
    }

    let etag = headers
        .get(ETAG)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
    let range = match cache::evaluate(req.method, req.headers, etag.as_deref(), modified) {
        Precondition::NotModified => return build_not_modified_response(headers),
        Precondition::Failed => return build_precondition_failed_response(headers),
        Precondition::Proceed { range } => range,
    };

    match deliver(req, name, size, range, headers, content).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn deliver<R>(
    req: &ContentRequest<'_>,
    name: &str,
    size: Option<u64>,
    range: Option<String>,
    mut headers: HeaderMap,
    mut content: R,
) -> Result<Response<ResponseBody>, ServeError>
where
    R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
{
    let ctype = if let Some(ct) = headers.get(CONTENT_TYPE) {
        String::from_utf8_lossy(ct.as_bytes()).into_owned()
    } else {
        let ct = match content_type_for_name(name) {
            Some(ct) => ct,
            None => {
                let mut buf = [0u8; SNIFF_LEN];
                let n = read_prefix(&mut content, &mut buf).await;
                content
                    .seek(SeekFrom::Start(0))
                    .await
                    .map_err(ServeError::SeekFailure)?;
                sniff(&buf[..n]).to_string()
            }
        };
        headers.insert(CONTENT_TYPE, header_value(&ct)?);
        ct
    };

    let size = match size {
        Some(size) => size,
        None => measure(&mut content).await?,
    };

    let mut status = StatusCode::OK;
    let mut send_size = size;
    let mut multipart = None;
    if let Some(range) = range {
        let mut ranges = match parse_range(&range, size) {
            Ok(ranges) => ranges,
            // Probing an empty resource: there is nothing to cut, send it whole
            Err(RangeError::NoOverlap) if size == 0 => Vec::new(),
            Err(e) => return Err(ServeError::from_range(e, size)),
        };
        if sum_ranges(&ranges) > size {
            // Overlapping or absurd requests: the whole file is cheaper
            ranges.clear();
        }
        match ranges.len() {
            0 => {}
            1 => {
                let single = ranges[0];
                content
                    .seek(SeekFrom::Start(single.start))
                    .await
                    .map_err(ServeError::SeekFailure)?;
                send_size = single.length;
                status = StatusCode::PARTIAL_CONTENT;
                headers.insert(CONTENT_RANGE, header_value(&single.content_range(size))?);
            }
            _ => {
                let framing = MultipartRanges::new(&ctype, size);
                send_size = framing.encoded_len(&ranges);
                status = StatusCode::PARTIAL_CONTENT;
                headers.insert(CONTENT_TYPE, header_value(&framing.content_type_header())?);
                multipart = Some((ranges, framing));
            }
        }
    }

    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if !headers.contains_key(CONTENT_ENCODING) {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(send_size));
    }

    let body = if req.is_head() {
        body::empty()
    } else if let Some((ranges, framing)) = multipart {
        spawn_multipart(content, ranges, framing)
    } else {
        body::reader(content.take(send_size))
    };
    Ok(with_headers(status, headers, body))
}

/// `Content-Disposition` value for a forced download
pub fn attachment(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    for c in name.chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            c if c.is_control() => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    quoted.push_str(&format!("%{b:02X}"));
                }
            }
            c => quoted.push(c),
        }
    }
    format!("attachment; filename=\"{quoted}\"")
}

fn header_value(s: &str) -> Result<HeaderValue, ServeError> {
    HeaderValue::from_bytes(s.as_bytes())
        .map_err(|e| ServeError::Internal(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Fill `buf` as far as the content allows; read errors end the sample early
async fn read_prefix<R: AsyncRead + Unpin>(content: &mut R, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match content.read(&mut buf[filled..]).await {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    filled
}

async fn measure<R: AsyncSeek + Unpin>(content: &mut R) -> Result<u64, ServeError> {
    let size = content
        .seek(SeekFrom::End(0))
        .await
        .map_err(ServeError::SeekFailure)?;
    content
        .seek(SeekFrom::Start(0))
        .await
        .map_err(ServeError::SeekFailure)?;
    Ok(size)
}

/// Feed a multipart body from a background task
fn spawn_multipart<R>(mut content: R, ranges: Vec<ByteRange>, framing: MultipartRanges) -> ResponseBody
where
    R: AsyncRead + AsyncSeek + Unpin + Send + 'static,
{
    let (tx, body) = pipe(PIPE_CAPACITY);
    tokio::spawn(async move {
        if let Err(e) = write_parts(&mut content, &ranges, &framing, &tx).await {
            if tx.is_closed() {
                logger::log_warning(&format!("Multipart response abandoned by client: {e}"));
            } else {
                logger::log_error(&format!("Multipart response failed: {e}"));
                tx.abort(e).await;
            }
        }
    });
    body.into_response_body()
}

async fn write_parts<R>(
    content: &mut R,
    ranges: &[ByteRange],
    framing: &MultipartRanges,
    tx: &PipeSender,
) -> io::Result<()>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    for (i, range) in ranges.iter().enumerate() {
        tx.send(Bytes::from(framing.part_header(i, range))).await?;
        content.seek(SeekFrom::Start(range.start)).await?;
        let mut remaining = range.length;
        while remaining > 0 {
            let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
            let n = content.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "content ended inside a range",
                ));
            }
            tx.send(Bytes::copy_from_slice(&buf[..n])).await?;
            remaining -= n as u64;
        }
    }
    tx.send(Bytes::from(framing.closing(ranges.len()))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use hyper::header::{IF_MATCH, IF_NONE_MATCH, RANGE};
    use std::io::Cursor;
    use std::time::{Duration, UNIX_EPOCH};

    const DATA: &[u8] = b"0123456789abcdefghij";

    fn request<'a>(method: &'a Method, headers: &'a HeaderMap) -> ContentRequest<'a> {
        ContentRequest {
            method,
            headers,
            force_download: false,
        }
    }

    fn with_range(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(RANGE, HeaderValue::from_str(value).unwrap());
        h
    }

    async fn serve(req: &ContentRequest<'_>, name: &str, data: &'static [u8]) -> Response<ResponseBody> {
        serve_content(
            req,
            name,
            None,
            Some(data.len() as u64),
            HeaderMap::new(),
            Cursor::new(data),
        )
        .await
    }

    async fn body_bytes(resp: Response<ResponseBody>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_full_content() {
        let h = HeaderMap::new();
        let resp = serve(&request(&Method::GET, &h), "a.txt", DATA).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "20");
        assert_eq!(resp.headers()[ACCEPT_RANGES], "bytes");
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(&body_bytes(resp).await[..], DATA);
    }

    #[tokio::test]
    async fn test_single_range() {
        let h = with_range("bytes=2-5");
        let resp = serve(&request(&Method::GET, &h), "a.txt", DATA).await;
        assert_eq!(resp.status(), 206);
        assert_eq!(resp.headers()[CONTENT_RANGE], "bytes 2-5/20");
        assert_eq!(resp.headers()[CONTENT_LENGTH], "4");
        assert_eq!(&body_bytes(resp).await[..], b"2345");
    }

    #[tokio::test]
    async fn test_multi_range_length_matches_body() {
        let h = with_range("bytes=0-1,-3");
        let resp = serve(&request(&Method::GET, &h), "a.txt", DATA).await;
        assert_eq!(resp.status(), 206);
        let ct = resp.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        let boundary = ct.strip_prefix("multipart/byteranges; boundary=").unwrap().to_string();
        let declared: usize = resp.headers()[CONTENT_LENGTH].to_str().unwrap().parse().unwrap();
        let body = body_bytes(resp).await;
        assert_eq!(body.len(), declared);
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with(&format!("--{boundary}\r\n")));
        assert!(text.contains("Content-Range: bytes 0-1/20\r\n"));
        assert!(text.contains("Content-Range: bytes 17-19/20\r\n"));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n\r\nhij"));
        assert!(text.ends_with(&format!("\r\n--{boundary}--\r\n")));
    }

    #[tokio::test]
    async fn test_range_sum_exceeding_size_sends_whole() {
        let h = with_range("bytes=0-19,0-19");
        let resp = serve(&request(&Method::GET, &h), "a.txt", DATA).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(&body_bytes(resp).await[..], DATA);
    }

    #[tokio::test]
    async fn test_unsatisfiable_and_malformed() {
        let h = with_range("bytes=50-60");
        let resp = serve(&request(&Method::GET, &h), "a.txt", DATA).await;
        assert_eq!(resp.status(), 416);
        assert_eq!(resp.headers()[CONTENT_RANGE], "bytes */20");

        let h = with_range("bytes=9-3");
        let resp = serve(&request(&Method::GET, &h), "a.txt", DATA).await;
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_empty_resource_ignores_range() {
        let h = with_range("bytes=0-10");
        let resp = serve(&request(&Method::GET, &h), "empty.txt", b"").await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "0");
    }

    #[tokio::test]
    async fn test_head_sends_headers_only() {
        let h = with_range("bytes=0-1,4-5");
        let resp = serve(&request(&Method::HEAD, &h), "a.txt", DATA).await;
        assert_eq!(resp.status(), 206);
        assert!(resp.headers().contains_key(CONTENT_LENGTH));
        assert!(body_bytes(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_sniffs_when_extension_unknown() {
        let h = HeaderMap::new();
        let resp = serve(&request(&Method::GET, &h), "noext", b"<html><body>x").await;
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        // The sniffed prefix is still delivered
        assert_eq!(&body_bytes(resp).await[..], b"<html><body>x");

        let resp = serve(&request(&Method::GET, &h), "blob", b"\x00\x01\x02").await;
        assert_eq!(resp.headers()[CONTENT_TYPE], OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_force_download() {
        let h = HeaderMap::new();
        let req = ContentRequest {
            method: &Method::GET,
            headers: &h,
            force_download: true,
        };
        let resp = serve(&req, "my \"report\".html", DATA).await;
        assert_eq!(resp.headers()[CONTENT_TYPE], OCTET_STREAM);
        assert_eq!(
            resp.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"my \\\"report\\\".html\""
        );
    }

    #[tokio::test]
    async fn test_not_modified_with_etag() {
        let mut upstream = HeaderMap::new();
        upstream.insert(ETAG, HeaderValue::from_static("\"v1\""));
        let mut h = HeaderMap::new();
        h.insert(IF_NONE_MATCH, HeaderValue::from_static("W/\"v1\""));
        let modified = Some(UNIX_EPOCH + Duration::from_secs(1_600_000_000));
        let req = request(&Method::GET, &h);
        let resp = serve_content(&req, "a.txt", modified, Some(20), upstream, Cursor::new(DATA)).await;
        assert_eq!(resp.status(), 304);
        assert_eq!(resp.headers()[ETAG], "\"v1\"");
        assert!(!resp.headers().contains_key(LAST_MODIFIED));
        assert!(!resp.headers().contains_key(CONTENT_LENGTH));
    }

    #[tokio::test]
    async fn test_if_match_failure_beats_range() {
        let mut upstream = HeaderMap::new();
        upstream.insert(ETAG, HeaderValue::from_static("\"v2\""));
        let mut h = with_range("bytes=0-1");
        h.insert(IF_MATCH, HeaderValue::from_static("\"v1\""));
        let req = request(&Method::GET, &h);
        let resp = serve_content(&req, "a.txt", None, Some(20), upstream, Cursor::new(DATA)).await;
        assert_eq!(resp.status(), 412);
    }

    #[tokio::test]
    async fn test_measures_unknown_size() {
        let h = HeaderMap::new();
        let req = request(&Method::GET, &h);
        let resp = serve_content(&req, "", None, None, HeaderMap::new(), Cursor::new(DATA)).await;
        assert_eq!(resp.headers()[CONTENT_LENGTH], "20");
    }

    #[test]
    fn test_attachment_escapes_controls() {
        assert_eq!(attachment("a\nb"), "attachment; filename=\"a%0Ab\"");
        assert_eq!(attachment("c\\d"), "attachment; filename=\"c\\\\d\"");
    }
}
