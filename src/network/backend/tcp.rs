/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

use crate::core::error::{GatewayError, Result};
use crate::network::backend::TransferCompletion;
use crate::network::framing::{LENGTH_PREFIX_LEN, encode_frame, read_payload};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// A single zone transfer over a dedicated TCP backend connection.
///
/// The connection is used for exactly one query and is closed when the value
/// is dropped, whatever the outcome.
#[derive(Debug)]
pub struct TcpTransfer {
    stream: TcpStream,
    completion: Arc<dyn TransferCompletion>,
    finished: bool,
    received: usize,
}

impl TcpTransfer {
    /// Dial the backend and send the framed query.
    pub async fn start(
        addr: SocketAddr,
        connect_timeout: Duration,
        query: &[u8],
        completion: Arc<dyn TransferCompletion>,
    ) -> Result<Self> {
        let mut stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(GatewayError::backend(format!(
                    "connect to TCP backend {}: {}",
                    addr, e
                )));
            }
            Err(_) => {
                return Err(GatewayError::backend(format!(
                    "connect to TCP backend {}: timed out after {:?}",
                    addr, connect_timeout
                )));
            }
        };
        let _ = stream.set_nodelay(true);

        let frame = encode_frame(query)?;
        stream
            .write_all(&frame)
            .await
            .map_err(|e| GatewayError::backend(format!("send query to TCP backend: {}", e)))?;

        Ok(Self {
            stream,
            completion,
            finished: false,
            received: 0,
        })
    }

    /// Number of responses read so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Next response payload in arrival order, or `None` once the transfer is
    /// complete.
    ///
    /// Silence for the completion window before a message starts and a clean
    /// close on a frame boundary both end the transfer. A stall or close after
    /// the first prefix byte is an error.
    pub async fn next_response(&mut self) -> Result<Option<BytesMut>> {
        if self.finished {
            return Ok(None);
        }

        let window = self.completion.idle_window();
        let mut len_prefix = [0u8; LENGTH_PREFIX_LEN];
        match timeout(window, self.stream.read(&mut len_prefix[..1])).await {
            Err(_) => {
                debug!(
                    "TCP backend idle for {:?} after {} responses, transfer complete",
                    window, self.received
                );
                self.finished = true;
                return Ok(None);
            }
            Ok(Ok(0)) => {
                debug!(
                    "TCP backend closed after {} responses, transfer complete",
                    self.received
                );
                self.finished = true;
                return Ok(None);
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(GatewayError::backend(format!(
                    "read length from TCP backend: {}",
                    e
                )));
            }
        }

        match timeout(window, self.stream.read_exact(&mut len_prefix[1..])).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(GatewayError::backend(format!(
                    "read length from TCP backend: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(GatewayError::backend(
                    "read length from TCP backend: stalled inside the length prefix",
                ));
            }
        }
        let msg_len = u16::from_be_bytes(len_prefix) as usize;

        let payload = match timeout(window, read_payload(&mut self.stream, msg_len)).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                return Err(GatewayError::backend(format!(
                    "read response from TCP backend: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(GatewayError::backend(format!(
                    "read response from TCP backend: stalled inside a {} byte message",
                    msg_len
                )));
            }
        };

        self.received += 1;
        if self.completion.is_final(&payload) {
            self.finished = true;
        }
        Ok(Some(payload))
    }
}
