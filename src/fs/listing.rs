//! Directory enumeration results
//!
//! A store may list children cheaply (name and type only) or with a full
//! stat per child. Both shapes sit behind [`Listing`] so callers only deal
//! with `len`, `name(i)` and `is_dir(i)`.

use super::{EntryKind, Metadata};

/// Name-only directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Children of a directory
#[derive(Debug, Clone)]
pub enum Listing {
    /// Lightweight enumeration: name and entry type, no per-entry stat
    Names(Vec<NamedEntry>),
    /// Full enumeration with a stat per entry
    Stats(Vec<Metadata>),
}

impl Listing {
    pub fn len(&self) -> usize {
        match self {
            Self::Names(v) => v.len(),
            Self::Stats(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the `i`-th child
    pub fn name(&self, i: usize) -> &str {
        match self {
            Self::Names(v) => &v[i].name,
            Self::Stats(v) => &v[i].name,
        }
    }

    pub fn kind(&self, i: usize) -> EntryKind {
        match self {
            Self::Names(v) => v[i].kind,
            Self::Stats(v) => v[i].kind,
        }
    }

    pub fn is_dir(&self, i: usize) -> bool {
        self.kind(i) == EntryKind::Directory
    }

    /// Sort children by name using ordinal (byte-wise) comparison
    pub fn sort_by_name(&mut self) {
        match self {
            Self::Names(v) => v.sort_by(|a, b| a.name.cmp(&b.name)),
            Self::Stats(v) => v.sort_by(|a, b| a.name.cmp(&b.name)),
        }
    }
}
