//! Access log format module
//!
//! Supports multiple log formats:
//! - `combined` (Apache/Nginx combined format)
//! - `common` (Common Log Format - CLF)
//! - `json` (JSON structured logging)
//! - Custom patterns with `$variables`

use chrono::Local;
use std::fmt::Write;

const CLF_TIME: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Parsed `logging.access_log_format`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Combined,
    Common,
    Json,
    Custom(String),
}

impl LogFormat {
    pub fn parse(name: &str) -> Self {
        match name {
            "combined" => Self::Combined,
            "common" => Self::Common,
            "json" => Self::Json,
            custom => Self::Custom(custom.to_string()),
        }
    }
}

/// One served request
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    /// Client IP address
    pub remote_addr: String,
    /// Request timestamp
    pub time: chrono::DateTime<Local>,
    pub method: String,
    /// Request URI path, as received
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// HTTP version (1.0, 1.1)
    pub http_version: String,
    pub status: u16,
    /// Response body size; unknown for streamed archives and multipart bodies
    pub body_bytes: Option<u64>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    /// Time to build the response, in microseconds
    pub request_time_us: u64,
}

impl AccessLogEntry {
    /// Create a new access log entry with current timestamp
    pub fn new(remote_addr: String, method: String, path: String) -> Self {
        Self {
            remote_addr,
            time: Local::now(),
            method,
            path,
            query: None,
            http_version: "1.1".to_string(),
            status: 200,
            body_bytes: None,
            referer: None,
            user_agent: None,
            request_time_us: 0,
        }
    }

    pub fn format(&self, format: &LogFormat) -> String {
        match format {
            LogFormat::Combined => format!(
                "{} \"{}\" \"{}\"",
                self.format_common(),
                self.referer.as_deref().unwrap_or("-"),
                self.user_agent.as_deref().unwrap_or("-"),
            ),
            LogFormat::Common => self.format_common(),
            LogFormat::Json => self.format_json(),
            LogFormat::Custom(pattern) => self.format_custom(pattern),
        }
    }

    fn request_uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    fn bytes_field(&self) -> String {
        self.body_bytes.map_or_else(|| "-".to_string(), |b| b.to_string())
    }

    /// `$remote_addr - - [$time_local] "$request" $status $body_bytes_sent`
    fn format_common(&self) -> String {
        format!(
            "{} - - [{}] \"{} {} HTTP/{}\" {} {}",
            self.remote_addr,
            self.time.format(CLF_TIME),
            self.method,
            self.request_uri(),
            self.http_version,
            self.status,
            self.bytes_field(),
        )
    }

    fn format_json(&self) -> String {
        let mut out = String::from("{");
        let _ = write!(out, "\"remote_addr\":{}", json_str(&self.remote_addr));
        let _ = write!(out, ",\"time\":{}", json_str(&self.time.to_rfc3339()));
        let _ = write!(out, ",\"method\":{}", json_str(&self.method));
        let _ = write!(out, ",\"path\":{}", json_str(&self.path));
        let _ = write!(out, ",\"query\":{}", json_opt(self.query.as_deref()));
        let _ = write!(out, ",\"http_version\":{}", json_str(&self.http_version));
        let _ = write!(out, ",\"status\":{}", self.status);
        let _ = write!(
            out,
            ",\"body_bytes\":{}",
            self.body_bytes.map_or_else(|| "null".to_string(), |b| b.to_string())
        );
        let _ = write!(out, ",\"referer\":{}", json_opt(self.referer.as_deref()));
        let _ = write!(out, ",\"user_agent\":{}", json_opt(self.user_agent.as_deref()));
        let _ = write!(out, ",\"request_time_us\":{}}}", self.request_time_us);
        out
    }

    /// Custom format with variable substitution
    ///
    /// Supported variables: `$remote_addr`, `$time_local`, `$time_iso8601`,
    /// `$request`, `$request_method`, `$request_uri`, `$request_time`,
    /// `$status`, `$body_bytes_sent`, `$http_referer`, `$http_user_agent`.
    fn format_custom(&self, pattern: &str) -> String {
        let request_uri = self.request_uri();
        let request_line = format!("{} {} HTTP/{}", self.method, request_uri, self.http_version);
        #[allow(clippy::cast_precision_loss)]
        let request_time = self.request_time_us as f64 / 1_000_000.0;

        // $request_time and friends must be replaced before $request
        pattern
            .replace("$remote_addr", &self.remote_addr)
            .replace("$time_local", &self.time.format(CLF_TIME).to_string())
            .replace("$time_iso8601", &self.time.to_rfc3339())
            .replace("$request_time", &format!("{request_time:.3}"))
            .replace("$request_method", &self.method)
            .replace("$request_uri", &request_uri)
            .replace("$request", &request_line)
            .replace("$status", &self.status.to_string())
            .replace("$body_bytes_sent", &self.bytes_field())
            .replace("$http_referer", self.referer.as_deref().unwrap_or("-"))
            .replace("$http_user_agent", self.user_agent.as_deref().unwrap_or("-"))
    }
}

fn json_opt(value: Option<&str>) -> String {
    value.map_or_else(|| "null".to_string(), json_str)
}

fn json_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if u32::from(c) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_entry() -> AccessLogEntry {
        let mut entry = AccessLogEntry::new(
            "192.168.1.1".to_string(),
            "GET".to_string(),
            "/music/a b.mp3".to_string(),
        );
        entry.query = Some("dl=true".to_string());
        entry.status = 206;
        entry.body_bytes = Some(1234);
        entry.referer = Some("https://example.com/music/".to_string());
        entry.user_agent = Some("Mozilla/5.0".to_string());
        entry.request_time_us = 1500;
        entry
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(
            LogFormat::parse("$status"),
            LogFormat::Custom("$status".to_string())
        );
    }

    #[test]
    fn test_format_combined() {
        let log = create_test_entry().format(&LogFormat::Combined);
        assert!(log.starts_with("192.168.1.1 - - ["));
        assert!(log.contains("\"GET /music/a b.mp3?dl=true HTTP/1.1\" 206 1234"));
        assert!(log.ends_with("\"https://example.com/music/\" \"Mozilla/5.0\""));
    }

    #[test]
    fn test_format_common_unknown_size() {
        let mut entry = create_test_entry();
        entry.body_bytes = None;
        let log = entry.format(&LogFormat::Common);
        assert!(log.ends_with("206 -"));
        assert!(!log.contains("Mozilla"));
    }

    #[test]
    fn test_format_json() {
        let mut entry = create_test_entry();
        entry.user_agent = Some("say \"hi\"".to_string());
        entry.query = None;
        let log = entry.format(&LogFormat::Json);
        assert!(log.starts_with("{\"remote_addr\":\"192.168.1.1\""));
        assert!(log.contains("\"query\":null"));
        assert!(log.contains("\"status\":206,\"body_bytes\":1234"));
        assert!(log.contains("\"user_agent\":\"say \\\"hi\\\"\""));
        assert!(log.ends_with("\"request_time_us\":1500}"));
    }

    #[test]
    fn test_format_custom() {
        let log = create_test_entry().format(&LogFormat::Custom(
            "$remote_addr $request_method $status $request_time $body_bytes_sent".to_string(),
        ));
        assert_eq!(log, "192.168.1.1 GET 206 0.002 1234");
    }
}
