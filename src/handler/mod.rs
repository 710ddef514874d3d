//! Request handler module
//!
//! Turns requests into responses against a filesystem: dispatch and
//! canonicalization, content delivery, directory listings, archive export
//! and thumbnail delegation.

pub mod archive;
pub mod content;
pub mod listing;
pub mod router;
pub mod thumbnail;

// Re-export main entry points
pub use archive::ArchiveFormat;
pub use content::{serve_content, ContentRequest};
pub use router::{FileServer, ServeOptions};
pub use thumbnail::Thumbnailer;
