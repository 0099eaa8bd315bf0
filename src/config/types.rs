// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

use crate::cgi::{ContentLengthPolicy, HandlerOptions};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub cgi: CgiConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
}

/// Handler behavior
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct CgiConfig {
    #[serde(default)]
    pub content_length_policy: ContentLengthPolicy,
    /// Cap on CONTENT_LENGTH in CGI mode (unbounded if not set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_size: Option<u64>,
}

impl CgiConfig {
    pub const fn handler_options(&self) -> HandlerOptions {
        HandlerOptions {
            content_length_policy: self.content_length_policy,
            max_body_size: self.max_body_size,
        }
    }
}

/// Gateway listener configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

#[allow(clippy::missing_const_for_fn)]
fn default_backlog() -> u32 {
    128
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout/stderr if not set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PerformanceConfig {
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub keep_alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u64>,
}

impl PerformanceConfig {
    /// Per-connection deadline
    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(std::cmp::max(self.read_timeout, self.write_timeout))
    }
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub max_body_size: u64,
}
