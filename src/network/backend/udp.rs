/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

use crate::core::dns_utils::wire_id;
use crate::core::error::{GatewayError, Result};
use bytes::BytesMut;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

/// Largest datagram accepted from a backend.
const MAX_DATAGRAM_LEN: usize = u16::MAX as usize;

/// One-shot UDP exchange with a DNS backend.
///
/// The socket is ephemeral and connected, so only datagrams from the backend
/// address are delivered. It is closed when the value is dropped.
#[derive(Debug)]
pub struct UdpBackend {
    socket: UdpSocket,
    reply_timeout: Duration,
}

impl UdpBackend {
    pub async fn connect(addr: SocketAddr, reply_timeout: Duration) -> Result<Self> {
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| GatewayError::backend(format!("bind UDP socket: {}", e)))?;
        socket
            .connect(addr)
            .await
            .map_err(|e| GatewayError::backend(format!("connect to UDP backend {}: {}", addr, e)))?;
        Ok(Self {
            socket,
            reply_timeout,
        })
    }

    /// Send `query` once and wait for the reply carrying the same ID.
    ///
    /// Datagrams with another ID are discarded. No retry is attempted; the
    /// whole wait is bounded by the reply timeout.
    pub async fn exchange(&self, query: &[u8]) -> Result<BytesMut> {
        let n = self
            .socket
            .send(query)
            .await
            .map_err(|e| GatewayError::backend(format!("send query to UDP backend: {}", e)))?;
        if n != query.len() {
            return Err(GatewayError::backend(format!(
                "Partial UDP send: sent {} of {} bytes",
                n,
                query.len()
            )));
        }

        let expected_id = wire_id(query);
        timeout(self.reply_timeout, self.recv_matching(expected_id))
            .await
            .map_err(|_| {
                GatewayError::backend(format!(
                    "read response from UDP backend: no reply within {:?}",
                    self.reply_timeout
                ))
            })?
    }

    async fn recv_matching(&self, expected_id: Option<u16>) -> Result<BytesMut> {
        let mut buf = BytesMut::zeroed(MAX_DATAGRAM_LEN);
        loop {
            let n = self.socket.recv(&mut buf[..]).await.map_err(|e| {
                GatewayError::backend(format!("read response from UDP backend: {}", e))
            })?;
            let reply_id = wire_id(&buf[..n]);
            if expected_id.is_some() && reply_id != expected_id {
                debug!(
                    "Dropping UDP backend reply with id {:?}, expected {:?}",
                    reply_id, expected_id
                );
                continue;
            }
            buf.truncate(n);
            return Ok(buf);
        }
    }
}
