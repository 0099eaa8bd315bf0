// Configuration module entry point
// Loads, validates and dumps the process configuration

mod state;
mod types;

use std::net::SocketAddr;

use config::builder::DefaultState;
use config::ConfigBuilder;

pub use state::AppState;
pub use types::{CgiConfig, Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig};

/// Config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "cgi-echo";

/// Prefix of environment overrides, e.g. `CGI_ECHO_SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "CGI_ECHO";

impl Config {
    /// Load configuration from the given file path (extension optional),
    /// then environment overrides. A missing file is not an error.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::load_layers(config_path, Self::environment_source())
    }

    fn load_layers(
        config_path: &str,
        environment: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let settings = Self::builder_with_defaults()?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(environment)
            .build()?;

        settings.try_deserialize()
    }

    /// `CGI_ECHO_` then the key path with `__` between sections
    fn environment_source() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Load configuration from TOML text over the defaults, ignoring the environment
    pub fn from_toml_str(source: &str) -> Result<Self, config::ConfigError> {
        let settings = Self::builder_with_defaults()?
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        settings.try_deserialize()
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("cgi.content_length_policy", "strict")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.backlog", 128)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("performance.keep_alive", true)?
            .set_default("http.server_name", "cgi-echo/0.1")?
            .set_default("http.max_body_size", 10_485_760) // 10MB
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Check values the loader cannot express as types.
    /// `serving` adds the checks that only matter for the gateway.
    pub fn validate(&self, serving: bool) -> Result<(), String> {
        if crate::logger::Level::parse(&self.logging.level).is_none() {
            return Err(format!(
                "Unknown log level '{}' (expected error, warn, info or debug)",
                self.logging.level
            ));
        }
        if self.logging.access_log_format.trim().is_empty() {
            return Err("Access log format must not be empty".to_string());
        }
        if self.cgi.max_body_size == Some(0) {
            return Err("cgi.max_body_size must be > 0 when set".to_string());
        }

        if !serving {
            return Ok(());
        }

        if self.server.port == 0 {
            return Err("Server port must be > 0".to_string());
        }
        self.get_socket_addr()?;
        if self.server.workers == Some(0) {
            return Err("Worker threads must be >= 1".to_string());
        }
        if self.server.backlog == 0 {
            return Err("Listen backlog must be >= 1".to_string());
        }
        if self.performance.read_timeout == 0 || self.performance.write_timeout == 0 {
            return Err("Read/write timeouts must be > 0".to_string());
        }
        if self.performance.max_connections == Some(0) {
            return Err("Max connections must be >= 1 when set".to_string());
        }
        if self.http.max_body_size == 0 {
            return Err("HTTP max body size must be > 0".to_string());
        }
        Ok(())
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cgi: CgiConfig::default(),
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                workers: None,
                backlog: 128,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                access_log: true,
                access_log_format: "combined".to_string(),
                access_log_file: None,
                error_log_file: None,
            },
            performance: PerformanceConfig {
                read_timeout: 30,
                write_timeout: 30,
                keep_alive: true,
                max_connections: None,
            },
            http: HttpConfig {
                server_name: "cgi-echo/0.1".to_string(),
                max_body_size: 10_485_760,
            },
        }
    }
}
