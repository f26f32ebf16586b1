/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Backend transport adapters
//!
//! A backend exchange is always owned by exactly one stream task:
//! - UDP: one datagram out, one datagram back (`udp::UdpBackend`).
//! - TCP: one framed query out, a sequence of framed responses back until the
//!   configured `TransferCompletion` strategy ends the transfer
//!   (`tcp::TcpTransfer`).

use crate::core::dns_utils::is_zone_transfer;
use hickory_proto::rr::RecordType;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub mod tcp;
pub mod udp;

pub use tcp::TcpTransfer;
pub use udp::UdpBackend;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_UDP_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_XFR_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Resolved backend transport for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendTarget {
    Udp(SocketAddr),
    Tcp(SocketAddr),
}

/// Decides when a zone-transfer response sequence is over.
pub trait TransferCompletion: Debug + Send + Sync {
    /// Longest wait for the next frame, measured from the previous one.
    /// Elapsing ends the transfer successfully.
    fn idle_window(&self) -> Duration;

    /// Inspect a received response; `true` ends the transfer after it is
    /// forwarded, without waiting out the idle window.
    fn is_final(&self, _payload: &[u8]) -> bool {
        false
    }
}

/// Ends a transfer once the backend stays silent for a fixed window.
///
/// A slow backend pausing longer than the window is cut short, and an idle
/// backend holds the stream for one full window after its last message.
#[derive(Debug, Clone, Copy)]
pub struct IdleDeadline {
    window: Duration,
}

impl IdleDeadline {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

impl Default for IdleDeadline {
    fn default() -> Self {
        Self::new(DEFAULT_XFR_IDLE_TIMEOUT)
    }
}

impl TransferCompletion for IdleDeadline {
    fn idle_window(&self) -> Duration {
        self.window
    }
}

/// Backend addresses and timeouts shared by every stream of a gateway.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub udp_addr: SocketAddr,
    pub tcp_addr: SocketAddr,
    pub connect_timeout: Duration,
    pub udp_timeout: Duration,
    pub completion: Arc<dyn TransferCompletion>,
}

impl BackendConfig {
    /// Same address for both transports, default timeouts.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            udp_addr: addr,
            tcp_addr: addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            udp_timeout: DEFAULT_UDP_TIMEOUT,
            completion: Arc::new(IdleDeadline::default()),
        }
    }

    /// AXFR/IXFR go to the TCP backend, everything else to UDP.
    pub fn target_for(&self, query_type: Option<RecordType>) -> BackendTarget {
        match query_type {
            Some(query_type) if is_zone_transfer(query_type) => BackendTarget::Tcp(self.tcp_addr),
            _ => BackendTarget::Udp(self.udp_addr),
        }
    }
}
