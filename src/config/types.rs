/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Configuration structure definitions
//!
//! Defines the schema for gateway configuration files (YAML format).

use serde::Deserialize;
use serde_yml::Value;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Invalid listen address: {0}")]
    InvalidListenAddress(String),

    #[error("TLS certificate path cannot be empty")]
    EmptyCertPath,

    #[error("TLS key path cannot be empty")]
    EmptyKeyPath,

    #[error("Idle timeout must be greater than zero")]
    ZeroIdleTimeout,

    #[error("Handler type cannot be empty")]
    EmptyHandlerType,
}

/// Main gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging configuration (level, file output)
    #[serde(default)]
    pub log: LogConfig,

    /// QUIC listener settings shared by every handler type
    #[serde(default)]
    pub server: ServerConfig,

    /// Stream handler selection and its arguments
    #[serde(default)]
    pub handler: HandlerConfig,
}

impl Config {
    /// Validate configuration
    ///
    /// Checks the shared sections only. Handler arguments are validated by the
    /// matching `HandlerFactory` when the handler is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log.level.to_lowercase().as_str() {
            "off" | "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(ConfigError::InvalidLogLevel(self.log.level.clone())),
        }

        self.server.listen_addr()?;

        if self.server.cert.is_empty() {
            return Err(ConfigError::EmptyCertPath);
        }
        if self.server.key.is_empty() {
            return Err(ConfigError::EmptyKeyPath);
        }
        if self.server.idle_timeout == 0 {
            return Err(ConfigError::ZeroIdleTimeout);
        }

        if self.handler.handler_type.is_empty() {
            return Err(ConfigError::EmptyHandlerType);
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level: off, trace, debug, info, warn, error
    #[serde(default = "default_level")]
    pub level: String,

    /// Optional file path for log output (in addition to console)
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> LogConfig {
        LogConfig {
            level: default_level(),
            file: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// QUIC listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// UDP address to listen on, `ip:port`
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Server certificate chain (PEM)
    #[serde(default = "default_cert")]
    pub cert: String,

    /// Server private key (PEM, PKCS#8/RSA/EC)
    #[serde(default = "default_key")]
    pub key: String,

    /// CA bundle used to require and verify client certificates
    #[serde(default)]
    pub mtls_ca_certs: Option<String>,

    /// Append negotiated TLS secrets to this file (NSS key log format)
    #[serde(default)]
    pub keylog: Option<String>,

    /// QUIC idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Accept 0-RTT early data
    #[serde(default = "default_early_data")]
    pub early_data: bool,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        SocketAddr::from_str(&self.listen)
            .map_err(|_| ConfigError::InvalidListenAddress(self.listen.clone()))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: default_listen(),
            cert: default_cert(),
            key: default_key(),
            mtls_ca_certs: None,
            keylog: None,
            idle_timeout: default_idle_timeout(),
            early_data: default_early_data(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:853".to_string()
}

fn default_cert() -> String {
    "server.crt".to_string()
}

fn default_key() -> String {
    "server.key".to_string()
}

fn default_idle_timeout() -> u64 {
    10
}

fn default_early_data() -> bool {
    true
}

/// Stream handler entry
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    /// Handler type (e.g., "proxy", "echo")
    #[serde(rename = "type")]
    pub handler_type: String,

    /// Handler-specific arguments (parsed by the handler factory)
    pub args: Option<Value>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig {
            handler_type: "proxy".to_string(),
            args: None,
        }
    }
}
