//! Native directory tree store
//!
//! Paths are resolved relative to a root directory. Like any plain
//! directory export, symlinks are followed when opened, even when they
//! point outside the root.

use super::path::{base_name, clean_path};
use super::{map_open_error, EntryKind, FileSystem, FsError, Listing, Metadata, NamedEntry, Resource};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// A [`FileSystem`] rooted at a native directory
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    /// Create a store rooted at `root`; an empty root means the current directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            root
        };
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a slash-separated name onto the host filesystem
    fn resolve(&self, name: &str) -> Result<PathBuf, FsError> {
        if std::path::MAIN_SEPARATOR != '/' && name.contains(std::path::MAIN_SEPARATOR) {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid character in file path",
            )));
        }
        let mut path = self.root.clone();
        for seg in clean_path(name).split('/').filter(|s| !s.is_empty()) {
            path.push(seg);
        }
        Ok(path)
    }
}

impl FileSystem for DiskFs {
    type File = DiskFile;

    async fn open(&self, name: &str) -> Result<DiskFile, FsError> {
        let cleaned = clean_path(name);
        let path = self.resolve(&cleaned)?;
        match File::open(&path).await {
            Ok(file) => Ok(DiskFile {
                file,
                name: base_name(&cleaned).to_string(),
                path,
            }),
            Err(e) => {
                let root = self.root.clone();
                let err = map_open_error(FsError::from_io(e), &cleaned, move |prefix| {
                    let full = root.join(prefix.trim_start_matches('/'));
                    async move {
                        tokio::fs::metadata(full)
                            .await
                            .map(|m| m.is_dir())
                            .map_err(FsError::from_io)
                    }
                })
                .await;
                Err(err)
            }
        }
    }

    async fn stat(&self, name: &str) -> Result<Metadata, FsError> {
        let cleaned = clean_path(name);
        let path = self.resolve(&cleaned)?;
        let meta = tokio::fs::symlink_metadata(&path)
            .await
            .map_err(FsError::from_io)?;
        Ok(to_metadata(base_name(&cleaned).to_string(), &meta))
    }

    fn native_path(&self, name: &str) -> Option<PathBuf> {
        self.resolve(name).ok()
    }
}

/// An opened native file or directory
#[derive(Debug)]
pub struct DiskFile {
    file: File,
    name: String,
    path: PathBuf,
}

impl Resource for DiskFile {
    async fn metadata(&self) -> Result<Metadata, FsError> {
        let meta = self.file.metadata().await.map_err(FsError::from_io)?;
        Ok(to_metadata(self.name.clone(), &meta))
    }

    /// Lists children with their entry type only; no per-entry stat
    async fn read_dir(&mut self) -> Result<Listing, FsError> {
        let mut dir = tokio::fs::read_dir(&self.path)
            .await
            .map_err(FsError::from_io)?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(FsError::from_io)? {
            let kind = entry
                .file_type()
                .await
                .map_or(EntryKind::Other, kind_of);
            entries.push(NamedEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(Listing::Names(entries))
    }
}

impl AsyncRead for DiskFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for DiskFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}

fn kind_of(ft: std::fs::FileType) -> EntryKind {
    if ft.is_symlink() {
        EntryKind::Symlink
    } else if ft.is_dir() {
        EntryKind::Directory
    } else if ft.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

fn to_metadata(name: String, meta: &std::fs::Metadata) -> Metadata {
    Metadata {
        name,
        len: meta.len(),
        modified: meta.modified().ok(),
        kind: kind_of(meta.file_type()),
        mode: mode_of(meta),
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"hello world").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("A")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_open_read_seek() {
        let dir = fixture();
        let fs = DiskFs::new(dir.path());
        let mut file = fs.open("/b.txt").await.unwrap();
        file.seek(SeekFrom::Start(6)).await.unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "world");

        let meta = file.metadata().await.unwrap();
        assert_eq!(meta.name, "b.txt");
        assert_eq!(meta.len, 11);
        assert!(meta.is_file());
    }

    #[tokio::test]
    async fn test_open_missing() {
        let dir = fixture();
        let fs = DiskFs::new(dir.path());
        assert!(matches!(fs.open("/nope").await, Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn test_open_through_file_is_not_found() {
        let dir = fixture();
        let fs = DiskFs::new(dir.path());
        assert!(matches!(
            fs.open("/b.txt/inner").await,
            Err(FsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_read_dir_names() {
        let dir = fixture();
        let fs = DiskFs::new(dir.path());
        let mut root = fs.open("/").await.unwrap();
        assert!(root.metadata().await.unwrap().is_dir());
        let mut listing = root.read_dir().await.unwrap();
        assert!(matches!(listing, Listing::Names(_)));
        listing.sort_by_name();
        assert_eq!(listing.len(), 3);
        assert_eq!(listing.name(0), "A");
        assert!(listing.is_dir(0));
        assert_eq!(listing.name(1), "a.txt");
        assert_eq!(listing.name(2), "b.txt");
    }

    #[tokio::test]
    async fn test_dot_dot_stays_in_root() {
        let dir = fixture();
        let fs = DiskFs::new(dir.path().join("A"));
        assert!(matches!(fs.open("/../b.txt").await, Err(FsError::NotFound)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stat_does_not_follow_symlink() {
        let dir = fixture();
        std::os::unix::fs::symlink(dir.path().join("b.txt"), dir.path().join("link")).unwrap();
        let fs = DiskFs::new(dir.path());
        let meta = fs.stat("/link").await.unwrap();
        assert_eq!(meta.kind, EntryKind::Symlink);
        let opened = fs.open("/link").await.unwrap();
        assert!(opened.metadata().await.unwrap().is_file());
    }
}
