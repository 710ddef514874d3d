//! Directory archive export
//!
//! Streams a directory subtree as a tar or zip archive. The encoder runs on
//! a blocking thread and writes into a bounded pipe whose read end is the
//! response body; filesystem calls are bridged back onto the runtime.
//!
//! Only regular files are archived. Directories are descended into,
//! everything else (symlinks, devices, sockets) is skipped. Each file must
//! yield exactly the size it was stat'ed with, otherwise the export is
//! aborted and the client sees a truncated response.

use super::content::attachment;
use crate::fs::path::{base_name, join};
use crate::fs::{EntryKind, FileSystem, Metadata, Resource};
use crate::http::body::{empty, pipe, PipeSender, ResponseBody, PIPE_CAPACITY};
use crate::http::response::with_headers;
use crate::logger;
use chrono::{DateTime, Datelike, Timelike, Utc};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::io::{self, BufWriter, Read, Write};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio_util::io::SyncIoBridge;
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, ZipWriter};

/// Write buffer between the encoder and the pipe
const ARCHIVE_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    Zip,
}

impl ArchiveFormat {
    /// Parse the `archive` query value
    pub fn from_query(value: &str) -> Option<Self> {
        match value {
            "tar" => Some(Self::Tar),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Tar => "application/x-tar",
            Self::Zip => "application/zip",
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
        }
    }
}

/// Download file name for an archive of `dir`
pub fn archive_file_name(dir: &str, format: ArchiveFormat) -> String {
    let base = match base_name(dir) {
        "/" => "root",
        name => name,
    };
    format!("{base}.{}", format.extension())
}

/// Respond with an archive of the directory at `dir`
///
/// Headers and status go out before the first byte is encoded, so failures
/// past this point can only abort the body.
pub fn serve_archive<F: FileSystem>(
    fs: Arc<F>,
    dir: String,
    format: ArchiveFormat,
    is_head: bool,
) -> Response<ResponseBody> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    let disposition = attachment(&archive_file_name(&dir, format));
    if let Ok(value) = HeaderValue::from_bytes(disposition.as_bytes()) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    if is_head {
        return with_headers(StatusCode::OK, headers, empty());
    }

    let (tx, body) = pipe(PIPE_CAPACITY);
    let rt = Handle::current();
    tokio::task::spawn_blocking(move || {
        let out = BufWriter::with_capacity(ARCHIVE_BUF_SIZE, tx.clone());
        match format {
            ArchiveFormat::Tar => export(&rt, fs.as_ref(), &dir, TarSink::new(out), &tx),
            ArchiveFormat::Zip => export(&rt, fs.as_ref(), &dir, ZipSink::new(out), &tx),
        }
    });
    with_headers(StatusCode::OK, headers, body.into_response_body())
}

/// Run one export to completion, aborting the body on failure
fn export<F, S>(rt: &Handle, fs: &F, dir: &str, mut sink: S, tx: &PipeSender)
where
    F: FileSystem,
    S: EntrySink,
{
    let result = match walk(rt, fs, dir, "", &mut sink) {
        Ok(()) => sink.finish(),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        if tx.is_closed() {
            logger::log_warning(&format!("Archive of {dir} abandoned by client: {e}"));
        } else {
            logger::log_error(&format!("Archive of {dir} failed: {e}"));
            tx.blocking_abort(e);
        }
    }
    // A sink dropped after an abort may still flush; the body ends at the error frame
}

/// Visit the subtree below `root/rel` in name order
fn walk<F, S>(rt: &Handle, fs: &F, root: &str, rel: &str, sink: &mut S) -> io::Result<()>
where
    F: FileSystem,
    S: EntrySink,
{
    let dir_path = if rel.is_empty() {
        root.to_string()
    } else {
        join(root, rel)
    };
    let mut listing = {
        let mut dir = rt.block_on(fs.open(&dir_path))?;
        rt.block_on(dir.read_dir())?
    };
    listing.sort_by_name();

    for i in 0..listing.len() {
        let name = listing.name(i);
        let child_rel = if rel.is_empty() {
            name.to_string()
        } else {
            format!("{rel}/{name}")
        };
        let child = join(root, &child_rel);
        let meta = rt.block_on(fs.stat(&child))?;
        match meta.kind {
            EntryKind::Directory => walk(rt, fs, root, &child_rel, sink)?,
            EntryKind::File => {
                let file = rt.block_on(fs.open(&child))?;
                let bridge = SyncIoBridge::new_with_handle(file, rt.clone());
                let mut reader = SizeCheckedReader::new(bridge, meta.len, &child_rel);
                sink.append(&child_rel, &meta, &mut reader)?;
            }
            EntryKind::Symlink | EntryKind::Other => {}
        }
    }
    Ok(())
}

/// Reader that must yield exactly `expected` bytes
pub struct SizeCheckedReader<R> {
    inner: R,
    remaining: u64,
    name: String,
}

impl<R: Read> SizeCheckedReader<R> {
    pub fn new(inner: R, expected: u64, name: &str) -> Self {
        Self {
            inner,
            remaining: expected,
            name: name.to_string(),
        }
    }

    fn mismatch(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("mismatch of size with {}", self.name),
        )
    }
}

impl<R: Read> Read for SizeCheckedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            // Declared size reached: the file must be exhausted too
            let mut probe = [0u8; 1];
            return match self.inner.read(&mut probe)? {
                0 => Ok(0),
                _ => Err(self.mismatch()),
            };
        }
        let want = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(self.mismatch());
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// An archive encoder fed one regular file at a time
trait EntrySink {
    fn append(&mut self, path: &str, meta: &Metadata, data: &mut dyn Read) -> io::Result<()>;

    /// Write trailing records and flush
    fn finish(self) -> io::Result<()>;
}

struct TarSink<W: Write> {
    builder: tar::Builder<W>,
}

impl<W: Write> TarSink<W> {
    fn new(out: W) -> Self {
        Self {
            builder: tar::Builder::new(out),
        }
    }
}

impl<W: Write> EntrySink for TarSink<W> {
    fn append(&mut self, path: &str, meta: &Metadata, data: &mut dyn Read) -> io::Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(meta.len);
        header.set_mode(meta.mode);
        header.set_mtime(mtime_secs(meta.modified));
        self.builder.append_data(&mut header, path, data)
    }

    fn finish(self) -> io::Result<()> {
        self.builder.into_inner()?.flush()
    }
}

/// Streaming zip encoder: stored entries, sizes and CRC in data descriptors
struct ZipSink<W: Write> {
    writer: ZipWriter<StreamWriter<W>>,
}

impl<W: Write> ZipSink<W> {
    fn new(out: W) -> Self {
        Self {
            writer: ZipWriter::new_stream(out),
        }
    }
}

impl<W: Write> EntrySink for ZipSink<W> {
    fn append(&mut self, path: &str, meta: &Metadata, data: &mut dyn Read) -> io::Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(meta.mode)
            .last_modified_time(zip_datetime(meta.modified))
            .large_file(meta.len >= u64::from(u32::MAX));
        self.writer
            .start_file(path, options)
            .map_err(io::Error::other)?;
        io::copy(data, &mut self.writer)?;
        Ok(())
    }

    fn finish(self) -> io::Result<()> {
        self.writer.finish().map_err(io::Error::other)?.flush()
    }
}

fn mtime_secs(modified: Option<SystemTime>) -> u64 {
    modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs())
}

/// Entry timestamp in UTC, clamped to the 1980..=2107 span zip can carry
fn zip_datetime(modified: Option<SystemTime>) -> zip::DateTime {
    let Some(t) = modified else {
        return zip::DateTime::default();
    };
    let dt: DateTime<Utc> = t.into();
    let year = dt.year();
    if year < 1980 {
        return zip::DateTime::default();
    }
    if year > 2107 {
        return zip::DateTime::from_date_and_time(2107, 12, 31, 23, 59, 58).unwrap_or_default();
    }
    // chrono bounds every field below the u8 range
    let field = |v: u32| u8::try_from(v).unwrap_or(0);
    zip::DateTime::from_date_and_time(
        u16::try_from(year).unwrap_or(1980),
        field(dt.month()),
        field(dt.day()),
        field(dt.hour()),
        field(dt.minute()),
        field(dt.second()),
    )
    .unwrap_or_default()
}
