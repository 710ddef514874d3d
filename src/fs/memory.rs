//! In-memory hierarchical byte container
//!
//! Useful for embedding assets or for tests. Symlinks hold an absolute
//! store path and are followed on open (a bounded number of hops).

use super::path::{base_name, clean_path};
use super::{map_open_error, EntryKind, FileSystem, FsError, Listing, Metadata, Resource};
use hyper::body::Bytes;
use std::collections::BTreeMap;
use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

const MAX_SYMLINK_HOPS: u8 = 8;

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Bytes,
        modified: Option<SystemTime>,
        mode: u32,
    },
    Dir {
        children: BTreeMap<String, Node>,
        modified: Option<SystemTime>,
    },
    Symlink {
        target: String,
    },
}

impl Node {
    fn empty_dir() -> Self {
        Self::Dir {
            children: BTreeMap::new(),
            modified: None,
        }
    }

    fn metadata(&self, name: &str) -> Metadata {
        let name = name.to_string();
        match self {
            Self::File {
                data,
                modified,
                mode,
            } => Metadata {
                name,
                len: data.len() as u64,
                modified: *modified,
                kind: EntryKind::File,
                mode: *mode,
            },
            Self::Dir { modified, .. } => Metadata {
                name,
                len: 0,
                modified: *modified,
                kind: EntryKind::Directory,
                mode: 0o755,
            },
            Self::Symlink { target } => Metadata {
                name,
                len: target.len() as u64,
                modified: None,
                kind: EntryKind::Symlink,
                mode: 0o777,
            },
        }
    }
}

/// A [`FileSystem`] holding its whole tree in memory
///
/// Cloning is cheap; clones share the tree until one of them is modified.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    root: Arc<Node>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::empty_dir()),
        }
    }

    /// Add (or replace) a regular file, creating parent directories
    pub fn add_file(&mut self, path: &str, data: impl Into<Bytes>) -> &mut Self {
        self.insert(
            path,
            Node::File {
                data: data.into(),
                modified: None,
                mode: 0o644,
            },
        );
        self
    }

    /// Add an empty directory, creating parents
    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        self.insert(path, Node::empty_dir());
        self
    }

    /// Add a symlink pointing at an absolute store path
    pub fn add_symlink(&mut self, path: &str, target: &str) -> &mut Self {
        self.insert(
            path,
            Node::Symlink {
                target: target.to_string(),
            },
        );
        self
    }

    /// Set the modification time of an existing file or directory
    pub fn set_modified(&mut self, path: &str, time: SystemTime) -> &mut Self {
        if let Some(node) = self.node_mut(path) {
            match node {
                Node::File { modified, .. } | Node::Dir { modified, .. } => *modified = Some(time),
                Node::Symlink { .. } => {}
            }
        }
        self
    }

    fn insert(&mut self, path: &str, node: Node) {
        let cleaned = clean_path(path);
        let mut segments: Vec<&str> = cleaned.split('/').filter(|s| !s.is_empty()).collect();
        let Some(leaf) = segments.pop() else {
            return;
        };
        let mut current = Arc::make_mut(&mut self.root);
        for seg in segments {
            let Node::Dir { children, .. } = current else {
                return;
            };
            let child = children.entry(seg.to_string()).or_insert_with(Node::empty_dir);
            if !matches!(child, Node::Dir { .. }) {
                *child = Node::empty_dir();
            }
            current = child;
        }
        if let Node::Dir { children, .. } = current {
            children.insert(leaf.to_string(), node);
        }
    }

    fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
        let cleaned = clean_path(path);
        let mut current = Arc::make_mut(&mut self.root);
        for seg in cleaned.split('/').filter(|s| !s.is_empty()) {
            let Node::Dir { children, .. } = current else {
                return None;
            };
            current = children.get_mut(seg)?;
        }
        Some(current)
    }

    /// Look up a node, following intermediate symlinks and optionally the last one
    fn lookup(&self, path: &str, follow_last: bool, hops: u8) -> Result<&Node, FsError> {
        if hops > MAX_SYMLINK_HOPS {
            return Err(FsError::Io(io::Error::other("too many levels of symbolic links")));
        }
        let cleaned = clean_path(path);
        let segments: Vec<&str> = cleaned.split('/').filter(|s| !s.is_empty()).collect();
        let mut current: &Node = &self.root;
        for (i, seg) in segments.iter().enumerate() {
            let children = match current {
                Node::Dir { children, .. } => children,
                Node::File { .. } | Node::Symlink { .. } => {
                    return Err(FsError::Io(io::Error::other("not a directory")));
                }
            };
            current = children.get(*seg).ok_or(FsError::NotFound)?;
            let is_last = i + 1 == segments.len();
            if let Node::Symlink { target } = current {
                if !is_last || follow_last {
                    current = self.lookup(target, true, hops + 1)?;
                }
            }
        }
        Ok(current)
    }
}

impl FileSystem for MemoryFs {
    type File = MemoryFile;

    async fn open(&self, name: &str) -> Result<MemoryFile, FsError> {
        let cleaned = clean_path(name);
        let node = match self.lookup(&cleaned, true, 0) {
            Ok(node) => node,
            Err(err) => {
                let err = map_open_error(err, &cleaned, |prefix| {
                    let is_dir = self
                        .lookup(&prefix, true, 0)
                        .map(|n| matches!(n, Node::Dir { .. }));
                    std::future::ready(is_dir)
                })
                .await;
                return Err(err);
            }
        };

        let meta = node.metadata(base_name(&cleaned));
        let (data, children) = match node {
            Node::File { data, .. } => (data.clone(), None),
            Node::Dir { children, .. } => {
                let stats = children
                    .iter()
                    .map(|(name, child)| child.metadata(name))
                    .collect();
                (Bytes::new(), Some(stats))
            }
            Node::Symlink { .. } => return Err(FsError::NotFound),
        };
        Ok(MemoryFile {
            cursor: Cursor::new(data),
            meta,
            children,
        })
    }

    async fn stat(&self, name: &str) -> Result<Metadata, FsError> {
        let cleaned = clean_path(name);
        let node = self.lookup(&cleaned, false, 0)?;
        Ok(node.metadata(base_name(&cleaned)))
    }
}

/// An opened in-memory entry
#[derive(Debug)]
pub struct MemoryFile {
    cursor: Cursor<Bytes>,
    meta: Metadata,
    children: Option<Vec<Metadata>>,
}

impl Resource for MemoryFile {
    async fn metadata(&self) -> Result<Metadata, FsError> {
        Ok(self.meta.clone())
    }

    /// Lists children with a full stat per entry
    async fn read_dir(&mut self) -> Result<Listing, FsError> {
        self.children
            .clone()
            .map(Listing::Stats)
            .ok_or_else(|| FsError::Io(io::Error::other("not a directory")))
    }
}

impl AsyncRead for MemoryFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.cursor).poll_read(cx, buf)
    }
}

impl AsyncSeek for MemoryFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.cursor).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.cursor).poll_complete(cx)
    }
}
