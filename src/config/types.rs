// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub serve: ServeConfig,
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// What to serve and how
#[derive(Debug, Deserialize, Clone)]
pub struct ServeConfig {
    /// Directory tree to serve
    pub root: String,
    /// Served in place of a directory listing when present
    pub index_file: String,
    /// Generate `ETag`s for regular files
    pub etag: bool,
    /// Allow `?archive=tar|zip` exports of directories
    pub archive: bool,
}

/// External thumbnailer
#[derive(Debug, Deserialize, Clone)]
pub struct ThumbnailConfig {
    /// Executable to run; thumbnails are disabled when unset
    #[serde(default)]
    pub command: Option<String>,
    /// Argument template, `{input}` is replaced with the file path
    #[serde(default = "default_thumbnail_args")]
    pub args: Vec<String>,
    /// Seconds before the command is killed
    #[serde(default = "default_thumbnail_timeout")]
    pub timeout: u64,
}

fn default_thumbnail_args() -> Vec<String> {
    ["-s", "0", "-q", "10", "-i", "{input}", "-o", "/dev/stdout", "-cpng"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[allow(clippy::missing_const_for_fn)]
fn default_thumbnail_timeout() -> u64 {
    10
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: default_thumbnail_args(),
            timeout: default_thumbnail_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}
