// Configuration module entry point
// Loads application configuration and builds the shared runtime state

mod state;
mod types;

use std::net::SocketAddr;
use std::time::Duration;

use crate::handler::{ServeOptions, Thumbnailer};

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, LoggingConfig, PerformanceConfig, ServeConfig, ServerConfig, ThumbnailConfig,
};

/// Config file used when none is given (extension resolved by the loader)
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// Environment variables prefixed `DIRSERVE`, with `__` between
    /// section and key (`DIRSERVE_SERVER__PORT`), override the file.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("DIRSERVE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9955)?
            .set_default("serve.root", ".")?
            .set_default("serve.index_file", "index.html")?
            .set_default("serve.etag", true)?
            .set_default("serve.archive", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Options for the file server built from `serve` and `thumbnail`
    pub fn serve_options(&self) -> ServeOptions {
        let thumbnailer = self.thumbnail.command.as_ref().map(|command| {
            Thumbnailer::new(
                command.clone(),
                self.thumbnail.args.clone(),
                Duration::from_secs(self.thumbnail.timeout),
            )
        });
        ServeOptions {
            index_file: self.serve.index_file.clone(),
            etag: self.serve.etag,
            archive: self.serve.archive,
            thumbnailer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load_from("/nonexistent/dirserve-config").unwrap();
        assert_eq!(cfg.server.port, 9955);
        assert_eq!(cfg.serve.root, ".");
        assert_eq!(cfg.serve.index_file, "index.html");
        assert!(cfg.serve.etag && cfg.serve.archive);
        assert!(cfg.thumbnail.command.is_none());
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert!(cfg.serve_options().thumbnailer.is_none());
    }

    #[test]
    fn test_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("dirserve.toml")).unwrap();
        writeln!(
            file,
            "[server]\nport = 8081\n\n[serve]\nroot = \"/srv\"\narchive = false\n\n\
             [thumbnail]\ncommand = \"ffmpegthumbnailer\"\n"
        )
        .unwrap();
        let path = dir.path().join("dirserve");
        let cfg = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 8081);
        assert_eq!(cfg.serve.root, "/srv");
        assert!(!cfg.serve.archive);
        assert_eq!(cfg.thumbnail.args[5], "{input}");
        let options = cfg.serve_options();
        assert!(!options.archive);
        assert!(options.thumbnailer.is_some());
    }

    #[test]
    fn test_invalid_address() {
        let mut cfg = Config::load_from("/nonexistent/dirserve-config").unwrap();
        cfg.server.host = "not an ip".to_string();
        assert!(cfg.get_socket_addr().is_err());
    }
}
