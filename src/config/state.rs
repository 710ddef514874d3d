// Application state module
// Shared, read-only state handed to every connection

use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::Config;
use crate::fs::DiskFs;
use crate::handler::FileServer;
use crate::logger::LogFormat;

/// Application state
pub struct AppState {
    pub config: Config,
    pub server: FileServer<DiskFs>,
    pub access_log_format: LogFormat,
    /// Connections currently being served
    pub active_connections: AtomicUsize,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let fs = DiskFs::new(&config.serve.root);
        Self {
            config: config.clone(),
            server: FileServer::new(fs, config.serve_options()),
            access_log_format: LogFormat::parse(&config.logging.access_log_format),
            active_connections: AtomicUsize::new(0),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}
