//! # Configuration Management
//!
//! Centralized configuration for the gate.
//!
//! This module provides structured configuration for the acceptor, the
//! credential handshake, and logging, loadable from TOML files or environment
//! variables.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Security Considerations
//! - The login timeout bounds how long an unauthenticated socket may idle
//! - Token TTLs bound the replay window of the handshake stages
//! - The per-IP limit caps what a single address can hold open

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Main configuration structure containing all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GateConfig {
    /// Server and admission configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Handshake and account-store configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GateConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GateError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| GateError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("TANK_GATE_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("TANK_GATE_PORT") {
            if let Ok(val) = port.parse::<u16>() {
                config.server.port = val;
            }
        }
        if let Ok(max) = std::env::var("TANK_GATE_MAX_CONNECTIONS") {
            if let Ok(val) = max.parse::<usize>() {
                config.server.max_connections = val;
            }
        }
        if let Ok(limit) = std::env::var("TANK_GATE_PER_IP_LIMIT") {
            if let Ok(val) = limit.parse::<usize>() {
                config.server.per_ip_limit = val;
            }
        }
        if let Ok(secs) = std::env::var("TANK_GATE_LOGIN_TIMEOUT_SECS") {
            if let Ok(val) = secs.parse::<u64>() {
                config.server.login_timeout = Duration::from_secs(val);
            }
        }
        if let Ok(url) = std::env::var("TANK_GATE_DATABASE_URL") {
            config.auth.database_url = url;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means the
    /// configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.auth.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GateError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server and admission configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind host (e.g., "0.0.0.0")
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Maximum number of concurrently live connections
    pub max_connections: usize,

    /// Listen backlog
    pub accept_backlog: u32,

    /// Bound on idle pooled visitors
    pub accept_pool_size: usize,

    /// Live connections allowed per remote IP address
    pub per_ip_limit: usize,

    /// How long an unauthenticated socket may wait for its login packet
    #[serde(with = "duration_secs")]
    pub login_timeout: Duration,

    /// Receive buffer size per connection, in bytes
    pub recv_buffer_size: usize,

    /// Send buffer size per connection, in bytes
    pub send_buffer_size: usize,

    /// Bound on idle pooled packet buffers
    pub buffer_pool_size: usize,

    /// Per-player inbound queue capacity (drop-newest when full)
    pub inbound_queue: usize,

    /// Per-connection outbound queue capacity (producers block when full)
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 9200,
            max_connections: 1000,
            accept_backlog: 512,
            accept_pool_size: 30,
            per_ip_limit: 4,
            login_timeout: Duration::from_secs(5),
            recv_buffer_size: 4096,
            send_buffer_size: 4096,
            buffer_pool_size: 200,
            inbound_queue: 100,
            outbound_queue: 100,
        }
    }
}

impl ServerConfig {
    /// Bind address in `host:port` form.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Server host cannot be empty".to_string());
        } else if self.host.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid server host: '{}' (expected an IP address)",
                self.host
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.per_ip_limit == 0 {
            errors.push("Per-IP limit must be greater than 0".to_string());
        }

        if self.login_timeout.as_millis() < 100 {
            errors.push("Login timeout too short (minimum: 100ms)".to_string());
        } else if self.login_timeout.as_secs() > 300 {
            errors.push("Login timeout too long (maximum: 300s)".to_string());
        }

        if self.inbound_queue == 0 || self.outbound_queue == 0 {
            errors.push("Queue capacities must be greater than 0".to_string());
        }

        if self.recv_buffer_size < 64 || self.send_buffer_size < 64 {
            errors.push("Socket buffers too small (minimum: 64 bytes)".to_string());
        }

        errors
    }
}

/// Handshake and account-store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Connection string of the account database (consumed by the store
    /// implementation, not by this crate)
    pub database_url: String,

    /// Database name
    pub database_name: String,

    /// Lifetime of web-stage tokens
    #[serde(with = "duration_mins")]
    pub web_token_ttl: Duration,

    /// Lifetime of tcp-stage tokens
    #[serde(with = "duration_mins")]
    pub tcp_token_ttl: Duration,

    /// Interval of the background token sweep
    #[serde(with = "duration_mins")]
    pub sweep_interval: Duration,

    /// PEM-encoded RSA private key for credential unwrapping; a fresh key is
    /// generated when absent
    #[serde(default)]
    pub rsa_private_key_pem: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            database_url: String::from("mongodb://localhost:27017"),
            database_name: String::from("tank"),
            web_token_ttl: Duration::from_secs(30 * 60),
            tcp_token_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            rsa_private_key_pem: None,
        }
    }
}

impl AuthConfig {
    /// Validate auth configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.database_url.is_empty() {
            errors.push("Database URL cannot be empty".to_string());
        }

        if self.web_token_ttl.as_secs() < 60 {
            errors.push("Web token TTL too short (minimum: 1 minute)".to_string());
        }
        if self.tcp_token_ttl.as_secs() < 60 {
            errors.push("Tcp token TTL too short (minimum: 1 minute)".to_string());
        }
        if self.tcp_token_ttl > self.web_token_ttl {
            errors.push("Tcp token TTL should not exceed web token TTL".to_string());
        }
        if self.sweep_interval.as_secs() < 60 {
            errors.push("Sweep interval too short (minimum: 1 minute)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("tank-gate"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        }

        if self.log_to_file && self.log_file_path.is_none() {
            errors.push("log_file_path must be specified when log_to_file is true".to_string());
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for second-granularity Duration fields
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Helper module for minute-granularity Duration fields
mod duration_mins {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_secs() / 60).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mins = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(mins * 60))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GateConfig::default();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
        assert_eq!(config.server.bind_addr(), "0.0.0.0:9200");
    }

    #[test]
    fn toml_round_trip() {
        let config = GateConfig::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed = GateConfig::from_toml(&toml).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.auth.web_token_ttl, config.auth.web_token_ttl);
    }

    #[test]
    fn ttl_fields_are_minutes() {
        let config = GateConfig::from_toml(
            r#"
            [auth]
            database_url = "mongodb://db:27017"
            database_name = "tank"
            web_token_ttl = 30
            tcp_token_ttl = 5
            sweep_interval = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.auth.web_token_ttl, Duration::from_secs(1800));
        assert_eq!(config.auth.tcp_token_ttl, Duration::from_secs(300));
    }

    #[test]
    fn invalid_values_are_reported() {
        let config = GateConfig::default_with_overrides(|c| {
            c.server.max_connections = 0;
            c.server.per_ip_limit = 0;
            c.logging.log_to_console = false;
        });
        let errors = config.validate();
        assert!(errors.len() >= 3);
        assert!(config.validate_strict().is_err());
    }
}
