//! Filesystem abstraction module
//!
//! A uniform capability surface over a backing store: open by `/`-separated
//! path, read, seek, stat and list children. Two stores are provided:
//! - [`DiskFs`]: a native directory tree
//! - [`MemoryFs`]: an in-memory hierarchical byte container

pub mod disk;
pub mod listing;
pub mod memory;
pub mod path;

pub use disk::DiskFs;
pub use listing::{Listing, NamedEntry};
pub use memory::MemoryFs;

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek};

/// Errors surfaced by a [`FileSystem`]
///
/// Everything that is neither "missing" nor "forbidden" stays an opaque
/// I/O error; the HTTP layer maps it to a generic 500.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("file does not exist")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Classify a raw I/O error into the filesystem taxonomy
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => Self::from(io::ErrorKind::NotFound),
            FsError::PermissionDenied => Self::from(io::ErrorKind::PermissionDenied),
            FsError::Io(e) => e,
        }
    }
}

/// Entry classification as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    Other,
}

/// Stat result for an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Base name of the entry
    pub name: String,
    /// Size in bytes (meaningful for regular files only)
    pub len: u64,
    /// Last modification time, if the store tracks one
    pub modified: Option<SystemTime>,
    pub kind: EntryKind,
    /// Unix permission bits
    pub mode: u32,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// An opened file or directory
///
/// The handle is owned by the request that opened it and is closed when
/// dropped, so every exit path releases it.
pub trait Resource: AsyncRead + AsyncSeek + Unpin + Send + 'static {
    /// Stat the opened entry
    fn metadata(&self) -> impl Future<Output = Result<Metadata, FsError>> + Send;

    /// Enumerate all immediate children (directories only)
    fn read_dir(&mut self) -> impl Future<Output = Result<Listing, FsError>> + Send;
}

/// A collection of named files addressed by `/`-separated paths
///
/// A leading `/` denotes the root of the store.
pub trait FileSystem: Send + Sync + 'static {
    type File: Resource;

    /// Open an entry for reading
    ///
    /// Descending through a non-directory segment reports
    /// [`FsError::NotFound`], never a generic I/O error.
    fn open(&self, name: &str) -> impl Future<Output = Result<Self::File, FsError>> + Send;

    /// Stat an entry without following a trailing symlink
    fn stat(&self, name: &str) -> impl Future<Output = Result<Metadata, FsError>> + Send;

    /// Host path of an entry, when the store is backed by the native filesystem
    fn native_path(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// Remap an ambiguous open error by walking the path's prefixes
///
/// If any prefix of `name` exists but is not a directory, the open failed
/// because it tried to descend through a file, which is reported as
/// [`FsError::NotFound`]. Not-found and permission errors pass through
/// untouched, and so does the original error when a prefix can't be
/// classified.
pub async fn map_open_error<F, Fut>(original: FsError, name: &str, mut is_dir: F) -> FsError
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, FsError>>,
{
    if !matches!(original, FsError::Io(_)) {
        return original;
    }

    let parts: Vec<&str> = name.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match is_dir(parts[..=i].join("/")).await {
            Ok(true) => {}
            Ok(false) => return FsError::NotFound,
            Err(_) => return original,
        }
    }
    original
}
