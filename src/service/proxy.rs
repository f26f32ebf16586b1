/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! DoQ to plain DNS proxy
//!
//! Each stream carries one framed query. The query is re-keyed with a fresh
//! backend transaction ID and sent over UDP, or over TCP for zone transfers.
//! Every backend response is forwarded as soon as it arrives with its ID
//! rewritten to 0, then the stream's write side is finished.
//!
//! IDs are patched in the wire bytes; payloads are never re-encoded.

use crate::core::dns_utils::{first_query_type, set_wire_id};
use crate::core::error::{GatewayError, Result};
use crate::network::backend::{
    BackendConfig, BackendTarget, DEFAULT_CONNECT_TIMEOUT, DEFAULT_UDP_TIMEOUT,
    DEFAULT_XFR_IDLE_TIMEOUT, IdleDeadline, TcpTransfer, UdpBackend,
};
use crate::network::framing::{read_frame, write_frame};
use crate::server::{DoqStream, HandlerFactory, StreamHandler, StreamSender};
use crate::service::txid::{IdSource, OsRandomIds};
use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::serialize::binary::BinDecodable;
use serde::Deserialize;
use serde_yml::Value;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// `handler.args` for the proxy
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Backend for ordinary queries, `ip:port`
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Backend for AXFR/IXFR; defaults to `backend`
    #[serde(default)]
    pub tcp_backend: Option<String>,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// UDP reply deadline in seconds
    #[serde(default = "default_udp_timeout")]
    pub udp_timeout: u64,

    /// Zone-transfer idle window in milliseconds
    #[serde(default = "default_xfr_idle_timeout")]
    pub xfr_idle_timeout: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            tcp_backend: None,
            connect_timeout: default_connect_timeout(),
            udp_timeout: default_udp_timeout(),
            xfr_idle_timeout: default_xfr_idle_timeout(),
        }
    }
}

fn default_backend() -> String {
    "8.8.4.4:53".to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_udp_timeout() -> u64 {
    DEFAULT_UDP_TIMEOUT.as_secs()
}

fn default_xfr_idle_timeout() -> u64 {
    DEFAULT_XFR_IDLE_TIMEOUT.as_millis() as u64
}

impl ProxyConfig {
    /// Parse `handler.args`; absent arguments mean all defaults.
    pub fn from_args(args: Option<&Value>) -> Result<Self> {
        match args {
            Some(args) => serde_yml::from_value::<ProxyConfig>(args.clone()).map_err(|e| {
                GatewayError::config(format!("Failed to parse proxy handler config: {}", e))
            }),
            None => Ok(ProxyConfig::default()),
        }
    }

    /// Resolve addresses and timeouts.
    pub fn backend_config(&self) -> Result<BackendConfig> {
        if self.backend.is_empty() {
            return Err(GatewayError::config("Proxy 'backend' cannot be empty"));
        }
        let udp_addr = parse_backend(&self.backend)?;
        let tcp_addr = match &self.tcp_backend {
            Some(tcp_backend) => parse_backend(tcp_backend)?,
            None => udp_addr,
        };

        if self.connect_timeout == 0 {
            return Err(GatewayError::config(
                "Proxy 'connect_timeout' must be greater than zero",
            ));
        }
        if self.udp_timeout == 0 {
            return Err(GatewayError::config(
                "Proxy 'udp_timeout' must be greater than zero",
            ));
        }
        if self.xfr_idle_timeout == 0 {
            return Err(GatewayError::config(
                "Proxy 'xfr_idle_timeout' must be greater than zero",
            ));
        }

        Ok(BackendConfig {
            udp_addr,
            tcp_addr,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            udp_timeout: Duration::from_secs(self.udp_timeout),
            completion: Arc::new(IdleDeadline::new(Duration::from_millis(
                self.xfr_idle_timeout,
            ))),
        })
    }
}

fn parse_backend(addr: &str) -> Result<SocketAddr> {
    SocketAddr::from_str(addr)
        .map_err(|_| GatewayError::config(format!("Invalid backend address: {}", addr)))
}

/// Stream handler bridging DoQ streams to the configured backends.
#[derive(Debug)]
pub struct ProxyHandler {
    backend: BackendConfig,
    ids: Arc<dyn IdSource>,
}

impl ProxyHandler {
    pub fn new(backend: BackendConfig, ids: Arc<dyn IdSource>) -> Self {
        Self { backend, ids }
    }
}

#[async_trait]
impl StreamHandler for ProxyHandler {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn handle_stream(&self, stream: DoqStream) -> Result<()> {
        let DoqStream {
            mut send, mut recv, ..
        } = stream;

        let mut query = read_frame(&mut recv).await?;
        let request = Message::from_bytes(&query)
            .map_err(|e| GatewayError::protocol(format!("decode DNS query: {}", e)))?;
        let query_type = first_query_type(&request);

        let backend_id = self.ids.next_id();
        set_wire_id(&mut query, backend_id);

        match self.backend.target_for(query_type) {
            BackendTarget::Udp(addr) => {
                debug!(backend = %addr, backend_id, ?query_type, "forwarding query over UDP");
                let backend = UdpBackend::connect(addr, self.backend.udp_timeout).await?;
                let mut response = backend.exchange(&query).await?;
                forward(&mut send, &mut response).await?;
            }
            BackendTarget::Tcp(addr) => {
                debug!(backend = %addr, backend_id, ?query_type, "starting zone transfer over TCP");
                let mut transfer = TcpTransfer::start(
                    addr,
                    self.backend.connect_timeout,
                    &query,
                    self.backend.completion.clone(),
                )
                .await?;
                while let Some(mut response) = transfer.next_response().await? {
                    forward(&mut send, &mut response).await?;
                }
                debug!(responses = transfer.received(), "zone transfer complete");
            }
        }

        send.shutdown()
            .await
            .map_err(|e| GatewayError::protocol(format!("finish stream: {}", e)))?;
        Ok(())
    }
}

/// Zero the ID and write one response frame to the client.
async fn forward(send: &mut StreamSender, response: &mut [u8]) -> Result<()> {
    set_wire_id(response, 0);
    write_frame(send, response).await
}

/// Builds [`ProxyHandler`]s from `handler.args`.
#[derive(Debug, Default)]
pub struct ProxyFactory;

impl HandlerFactory for ProxyFactory {
    fn validate_config(&self, args: Option<&Value>) -> Result<()> {
        ProxyConfig::from_args(args)?.backend_config().map(|_| ())
    }

    fn create(&self, args: Option<&Value>) -> Result<Arc<dyn StreamHandler>> {
        let backend = ProxyConfig::from_args(args)?.backend_config()?;
        info!(
            "Proxy backends: udp={}, tcp={}, connect_timeout={:?}, udp_timeout={:?}, xfr_idle={:?}",
            backend.udp_addr,
            backend.tcp_addr,
            backend.connect_timeout,
            backend.udp_timeout,
            backend.completion.idle_window()
        );
        Ok(Arc::new(ProxyHandler::new(backend, Arc::new(OsRandomIds))))
    }
}
