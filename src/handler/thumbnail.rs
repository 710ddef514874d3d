//! Thumbnail delegation
//!
//! Runs an external thumbnailer against a file's native path and serves its
//! PNG output. Any failure is reported as `None` so the caller falls back to
//! ordinary content delivery.

use super::content::{serve_content, ContentRequest};
use crate::fs::FileSystem;
use crate::http::body::ResponseBody;
use crate::logger;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::Response;
use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Placeholder in argument templates replaced with the input path
pub const INPUT_TOKEN: &str = "{input}";

/// An external command that writes a PNG thumbnail to stdout
#[derive(Debug, Clone)]
pub struct Thumbnailer {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Thumbnailer {
    pub const fn new(command: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            args,
            timeout,
        }
    }

    /// Argument list with every `{input}` replaced by `input`
    pub fn args_for(&self, input: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(INPUT_TOKEN, &input))
            .collect()
    }

    /// Run the command, returning its stdout on success
    pub async fn render(&self, input: &Path) -> Option<Vec<u8>> {
        let child = Command::new(&self.command)
            .args(self.args_for(input))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                logger::log_warning(&format!("Thumbnailer {} unavailable: {e}", self.command));
                return None;
            }
        };

        match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() && !output.stdout.is_empty() => {
                Some(output.stdout)
            }
            Ok(Ok(output)) => {
                logger::log_warning(&format!(
                    "Thumbnailer failed for {}: {}",
                    input.display(),
                    output.status
                ));
                None
            }
            Ok(Err(e)) => {
                logger::log_warning(&format!("Thumbnailer wait failed: {e}"));
                None
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Thumbnailer timed out after {}s for {}",
                    self.timeout.as_secs(),
                    input.display()
                ));
                None
            }
        }
    }
}

/// Serve a thumbnail of the regular file at `name`, if one can be made
pub async fn serve_thumbnail<F: FileSystem>(
    thumbnailer: &Thumbnailer,
    fs: &F,
    req: &ContentRequest<'_>,
    name: &str,
) -> Option<Response<ResponseBody>> {
    let input = fs.native_path(name)?;
    let png = thumbnailer.render(&input).await?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
    let size = png.len() as u64;
    Some(serve_content(req, name, None, Some(size), headers, Cursor::new(png)).await)
}
