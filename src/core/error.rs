/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Unified error handling for the gateway
//!
//! Every layer returns a `GatewayError` describing the operation that failed.
//! The owning task (listener, session or stream) decides whether the error is
//! fatal, ends a session, or is only logged for a single stream.

use crate::config::types::ConfigError;
use quinn::crypto::rustls::NoInitialCipherSuite;
use quinn::{ConnectError, ConnectionError, VarIntBoundsExceeded};
use thiserror::Error;

/// Main error type for the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate, key or CA bundle could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// Tokio runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Client-facing framing or DNS decoding error
    #[error("DNS protocol error: {0}")]
    Protocol(String),

    /// Backend dial/read/write failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Hickory codec error
    #[error("DNS Hickory protocol error: {0}")]
    HickoryProtocol(#[from] hickory_proto::ProtoError),

    /// rustls configuration error
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),

    /// Quic connect error
    #[error("quic connect error: {0}")]
    QuicConnect(#[from] ConnectError),

    /// Quic connection error
    #[error("quic connection error: {0}")]
    QuicConnection(#[from] ConnectionError),

    /// No initial cipher error
    #[error("No initial cipher error: {0}")]
    NoInitialCipherSuite(#[from] NoInitialCipherSuite),

    #[error("integer bounds exceeded error: {0}")]
    VarIntBoundsExceeded(#[from] VarIntBoundsExceeded),
}

impl GatewayError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GatewayError::Config(msg.into())
    }

    /// Create a TLS loading error
    pub fn tls<S: Into<String>>(msg: S) -> Self {
        GatewayError::Tls(msg.into())
    }

    /// Create a runtime error
    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        GatewayError::Runtime(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        GatewayError::Protocol(msg.into())
    }

    /// Create a backend error
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        GatewayError::Backend(msg.into())
    }
}

/// Allow conversion from ConfigError to GatewayError
impl From<ConfigError> for GatewayError {
    fn from(e: ConfigError) -> Self {
        GatewayError::Config(e.to_string())
    }
}

/// Convenient type alias for Results using GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;
