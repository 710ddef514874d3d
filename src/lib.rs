//! dirserve - a directory-serving HTTP file server
//!
//! Serves a directory tree over HTTP/1.1 with conditional requests, byte
//! ranges (including multipart), directory listings, tar/zip exports of
//! directories and optional thumbnail delegation.

pub mod config;
pub mod fs;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
