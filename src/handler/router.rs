//! Request dispatch
//!
//! Entry point for serving a request against a [`FileSystem`]: path
//! validation, query switches, canonicalization redirects, index files,
//! directory listings and file content.

use super::archive::{serve_archive, ArchiveFormat};
use super::content::{serve_content, ContentRequest};
use super::listing::{escape_path, serve_listing};
use super::thumbnail::{serve_thumbnail, Thumbnailer};
use crate::fs::path::{base_name, clean_path, contains_dot_dot, join};
use crate::fs::{EntryKind, FileSystem, Metadata, Resource};
use crate::http::body::ResponseBody;
use crate::http::cache::{self, Condition};
use crate::http::response::{build_not_modified_response, build_redirect_response};
use crate::http::ServeError;
use hyper::header::{HeaderMap, HeaderValue, ETAG, LAST_MODIFIED};
use hyper::{Method, Request, Response};
use percent_encoding::percent_decode_str;
use std::sync::Arc;

/// Behaviour switches for a [`FileServer`]
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Served in place of a directory listing when present
    pub index_file: String,
    /// Generate validators for regular files
    pub etag: bool,
    /// Honour `?archive=tar|zip` on directories
    pub archive: bool,
    /// External thumbnailer for `?thumb=true`
    pub thumbnailer: Option<Thumbnailer>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            index_file: "index.html".to_string(),
            etag: true,
            archive: true,
            thumbnailer: None,
        }
    }
}

/// Query-string switches, first occurrence of each key wins
#[derive(Debug, Default, PartialEq, Eq)]
struct Switches {
    thumb: bool,
    download: bool,
    archive: Option<ArchiveFormat>,
}

impl Switches {
    fn parse(query: Option<&str>) -> Self {
        let mut switches = Self::default();
        let (mut thumb, mut dl, mut archive) = (false, false, false);
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "thumb" if !thumb => {
                    thumb = true;
                    switches.thumb = value == "true";
                }
                "dl" if !dl => {
                    dl = true;
                    switches.download = value == "true";
                }
                "archive" if !archive => {
                    archive = true;
                    switches.archive = ArchiveFormat::from_query(&value);
                }
                _ => {}
            }
        }
        switches
    }
}

/// Serves files and directories from a [`FileSystem`]
pub struct FileServer<F: FileSystem> {
    fs: Arc<F>,
    options: ServeOptions,
}

impl<F: FileSystem> FileServer<F> {
    pub fn new(fs: F, options: ServeOptions) -> Self {
        Self {
            fs: Arc::new(fs),
            options,
        }
    }

    /// Answer a request. Request bodies are never read.
    pub async fn handle<B>(&self, req: &Request<B>) -> Response<ResponseBody> {
        let Ok(decoded) = percent_decode_str(req.uri().path()).decode_utf8() else {
            return ServeError::InvalidPath.into_response();
        };
        let mut upath = decoded.into_owned();
        if !upath.starts_with('/') {
            upath.insert(0, '/');
        }
        if contains_dot_dot(&upath) {
            return ServeError::InvalidPath.into_response();
        }

        let raw_query = req.uri().query();
        let switches = Switches::parse(raw_query);
        let name = clean_path(&upath);
        let is_head = *req.method() == Method::HEAD;
        let content_req = ContentRequest {
            method: req.method(),
            headers: req.headers(),
            force_download: switches.download,
        };

        if switches.thumb {
            if let Some(thumbnailer) = &self.options.thumbnailer {
                if self.kind_of(&name).await == Some(EntryKind::File) {
                    let served =
                        serve_thumbnail(thumbnailer, self.fs.as_ref(), &content_req, &name).await;
                    if let Some(resp) = served {
                        return resp;
                    }
                }
            }
        }

        if let Some(format) = switches.archive {
            if self.options.archive
                && upath.ends_with('/')
                && self.kind_of(&name).await == Some(EntryKind::Directory)
            {
                return serve_archive(Arc::clone(&self.fs), name, format, is_head);
            }
        }

        match self.serve_path(&content_req, &upath, &name, raw_query).await {
            Ok(resp) => resp,
            Err(e) => e.into_response(),
        }
    }

    /// Whether `upath` names the index file of its directory
    fn is_index_page(&self, upath: &str) -> bool {
        let index = self.options.index_file.as_str();
        !index.is_empty()
            && upath
                .strip_suffix(index)
                .is_some_and(|dir| dir.ends_with('/'))
    }

    async fn serve_path(
        &self,
        req: &ContentRequest<'_>,
        upath: &str,
        name: &str,
        raw_query: Option<&str>,
    ) -> Result<Response<ResponseBody>, ServeError> {
        if self.is_index_page(upath) {
            return Ok(local_redirect("./", raw_query));
        }

        let mut file = self.fs.open(name).await?;
        let mut meta = file.metadata().await?;

        if meta.is_dir() && !upath.ends_with('/') {
            let target = format!("{}/", escape_path(base_name(upath)));
            return Ok(local_redirect(&target, raw_query));
        }
        if !meta.is_dir() && upath.ends_with('/') {
            let target = format!("../{}", escape_path(base_name(upath)));
            return Ok(local_redirect(&target, raw_query));
        }

        if meta.is_dir() {
            if let Some((index, index_meta)) = self.open_index(name).await {
                file = index;
                meta = index_meta;
            }
        }

        if meta.is_dir() {
            if cache::check_if_modified_since(req.method, req.headers, meta.modified)
                == Condition::Failed
            {
                return Ok(build_not_modified_response(HeaderMap::new()));
            }
            let mut headers = HeaderMap::new();
            if let Some(lm) = cache::last_modified_value(meta.modified) {
                if let Ok(value) = HeaderValue::from_str(&lm) {
                    headers.insert(LAST_MODIFIED, value);
                }
            }
            let is_head = *req.method == Method::HEAD;
            return Ok(serve_listing(&mut file, headers, is_head, self.options.archive).await);
        }

        let mut headers = HeaderMap::new();
        if self.options.etag && meta.is_file() {
            if let Some(tag) = cache::generate_etag(&meta) {
                if let Ok(value) = HeaderValue::from_str(&tag) {
                    headers.insert(ETAG, value);
                }
            }
        }
        Ok(serve_content(req, &meta.name, meta.modified, Some(meta.len), headers, file).await)
    }

    /// Open the index file of directory `dir`, unless it is itself a directory
    async fn open_index(&self, dir: &str) -> Option<(F::File, Metadata)> {
        let file = self.fs.open(&join(dir, &self.options.index_file)).await.ok()?;
        let meta = file.metadata().await.ok()?;
        if meta.is_dir() {
            None
        } else {
            Some((file, meta))
        }
    }

    /// Kind of the entry at `name`, following symlinks
    async fn kind_of(&self, name: &str) -> Option<EntryKind> {
        let file = self.fs.open(name).await.ok()?;
        file.metadata().await.ok().map(|m| m.kind)
    }
}

/// A 301 to a relative target, keeping the raw query
fn local_redirect(target: &str, raw_query: Option<&str>) -> Response<ResponseBody> {
    match raw_query {
        Some(q) if !q.is_empty() => build_redirect_response(&format!("{target}?{q}")),
        _ => build_redirect_response(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use http_body_util::BodyExt;
    use hyper::header::{CONTENT_TYPE, IF_MODIFIED_SINCE, LOCATION};
    use std::time::{Duration, UNIX_EPOCH};

    fn server() -> FileServer<MemoryFs> {
        let mut fs = MemoryFs::new();
        fs.add_file("/hello.txt", "hello world")
            .add_file("/site/index.html", "<p>home</p>")
            .add_file("/docs/b.txt", "b")
            .add_file("/docs/a b.txt", "a")
            .add_dir("/docs/sub")
            .add_dir("/odd/index.html")
            .set_modified("/hello.txt", UNIX_EPOCH + Duration::from_secs(100_000_000))
            .set_modified("/docs", UNIX_EPOCH + Duration::from_secs(100_000_000));
        FileServer::new(fs, ServeOptions::default())
    }

    fn get(uri: &str) -> Request<()> {
        Request::builder().uri(uri).body(()).unwrap()
    }

    async fn text(resp: Response<ResponseBody>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_switches() {
        assert_eq!(Switches::parse(None), Switches::default());
        let s = Switches::parse(Some("dl=true&archive=zip&thumb=1"));
        assert!(s.download);
        assert!(!s.thumb);
        assert_eq!(s.archive, Some(ArchiveFormat::Zip));
        let first_wins = Switches::parse(Some("dl=false&dl=true"));
        assert!(!first_wins.download);
    }

    #[tokio::test]
    async fn test_file_with_etag() {
        let resp = server().handle(&get("/hello.txt")).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()[ETAG], "\"5f5e100-b\"");
        assert_eq!(resp.headers()[LAST_MODIFIED], "Sat, 03 Mar 1973 09:46:40 GMT");
        assert_eq!(text(resp).await, "hello world");
    }

    #[tokio::test]
    async fn test_missing_is_generic_404() {
        let resp = server().handle(&get("/nope.txt")).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(text(resp).await, "404 page not found\n");
    }

    #[tokio::test]
    async fn test_dot_dot_rejected() {
        let resp = server().handle(&get("/docs/../hello.txt")).await;
        assert_eq!(resp.status(), 400);
        let encoded = server().handle(&get("/docs/%2e%2e/hello.txt")).await;
        assert_eq!(encoded.status(), 400);
    }

    #[tokio::test]
    async fn test_canonical_redirects() {
        let s = server();
        let dir = s.handle(&get("/docs?x=1")).await;
        assert_eq!(dir.status(), 301);
        assert_eq!(dir.headers()[LOCATION], "docs/?x=1");

        let file = s.handle(&get("/hello.txt/")).await;
        assert_eq!(file.headers()[LOCATION], "../hello.txt");

        let index = s.handle(&get("/site/index.html")).await;
        assert_eq!(index.headers()[LOCATION], "./");
    }

    #[tokio::test]
    async fn test_index_redirect_follows_configured_name() {
        let mut fs = MemoryFs::new();
        fs.add_file("/d/home.html", "<p>home</p>")
            .add_file("/d/index.html", "plain page")
            .add_file("/d/myhome.html", "other");
        let options = ServeOptions {
            index_file: "home.html".to_string(),
            ..ServeOptions::default()
        };
        let s = FileServer::new(fs, options);

        let home = s.handle(&get("/d/home.html?q=1")).await;
        assert_eq!(home.status(), 301);
        assert_eq!(home.headers()[LOCATION], "./?q=1");

        let index = s.handle(&get("/d/index.html")).await;
        assert_eq!(index.status(), 200);
        assert_eq!(text(index).await, "plain page");

        let other = s.handle(&get("/d/myhome.html")).await;
        assert_eq!(other.status(), 200);

        let dir = s.handle(&get("/d/")).await;
        assert_eq!(text(dir).await, "<p>home</p>");
    }

    #[tokio::test]
    async fn test_index_served_for_directory() {
        let resp = server().handle(&get("/site/")).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(text(resp).await, "<p>home</p>");
    }

    #[tokio::test]
    async fn test_index_directory_not_served() {
        let resp = server().handle(&get("/odd/")).await;
        assert_eq!(resp.status(), 200);
        assert!(text(resp).await.contains("<a href=\"index.html/\">index.html/</a>"));
    }

    #[tokio::test]
    async fn test_listing_and_conditional() {
        let s = server();
        let resp = s.handle(&get("/docs/")).await;
        assert_eq!(resp.headers()[LAST_MODIFIED], "Sat, 03 Mar 1973 09:46:40 GMT");
        let body = text(resp).await;
        let a = body.find("a%20b.txt").unwrap();
        let b = body.find("\"b.txt\"").unwrap();
        let sub = body.find("sub/").unwrap();
        assert!(a < b && b < sub);

        let req = Request::builder()
            .uri("/docs/")
            .header(IF_MODIFIED_SINCE, "Sat, 03 Mar 1973 09:46:40 GMT")
            .body(())
            .unwrap();
        assert_eq!(s.handle(&req).await.status(), 304);
    }

    #[tokio::test]
    async fn test_archive_switch_only_on_directories() {
        let s = server();
        let on_file = s.handle(&get("/hello.txt?archive=tar")).await;
        assert_eq!(on_file.status(), 200);
        assert_eq!(text(on_file).await, "hello world");

        let head = Request::builder()
            .method(Method::HEAD)
            .uri("/docs/?archive=tar")
            .body(())
            .unwrap();
        let resp = s.handle(&head).await;
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/x-tar");
    }

    #[tokio::test]
    async fn test_archive_can_be_disabled() {
        let mut fs = MemoryFs::new();
        fs.add_file("/d/x", "x");
        let options = ServeOptions {
            archive: false,
            ..ServeOptions::default()
        };
        let s = FileServer::new(fs, options);
        let resp = s.handle(&get("/d/?archive=zip")).await;
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(!text(resp).await.contains("archive="));
    }

    #[tokio::test]
    async fn test_download_switch() {
        let resp = server().handle(&get("/hello.txt?dl=true")).await;
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(
            resp.headers()["content-disposition"],
            "attachment; filename=\"hello.txt\""
        );
    }

    #[tokio::test]
    async fn test_thumb_without_thumbnailer_falls_through() {
        let resp = server().handle(&get("/hello.txt?thumb=true")).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(text(resp).await, "hello world");
    }
}
