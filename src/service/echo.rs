/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Echo service: writes back whatever the client sent on the stream.

use crate::core::error::{GatewayError, Result};
use crate::network::framing::{LENGTH_PREFIX_LEN, MAX_FRAME_LEN};
use crate::server::{DoqStream, HandlerFactory, StreamHandler};
use async_trait::async_trait;
use serde_yml::Value;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Most bytes read from one stream: a maximal frame plus its prefix.
const ECHO_LIMIT: usize = MAX_FRAME_LEN + LENGTH_PREFIX_LEN;

#[derive(Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl StreamHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    async fn handle_stream(&self, stream: DoqStream) -> Result<()> {
        let DoqStream { mut send, recv, .. } = stream;

        let mut payload = Vec::new();
        recv.take(ECHO_LIMIT as u64)
            .read_to_end(&mut payload)
            .await
            .map_err(|e| GatewayError::protocol(format!("read stream: {}", e)))?;

        send.write_all(&payload)
            .await
            .map_err(|e| GatewayError::protocol(format!("write stream: {}", e)))?;
        send.shutdown()
            .await
            .map_err(|e| GatewayError::protocol(format!("finish stream: {}", e)))?;

        debug!(bytes = payload.len(), "echoed");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EchoFactory;

impl HandlerFactory for EchoFactory {
    fn validate_config(&self, args: Option<&Value>) -> Result<()> {
        if args.is_some() {
            warn!("Echo handler takes no arguments, ignoring 'handler.args'");
        }
        Ok(())
    }

    fn create(&self, _args: Option<&Value>) -> Result<Arc<dyn StreamHandler>> {
        Ok(Arc::new(EchoHandler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_echo_returns_stream_contents() {
        let (mut client_tx, server_rx) = duplex(1024);
        let (server_tx, mut client_rx) = duplex(1024);
        client_tx.write_all(b"\x00\x05hello").await.unwrap();
        client_tx.shutdown().await.unwrap();

        EchoHandler
            .handle_stream(DoqStream::new(0, server_tx, server_rx))
            .await
            .unwrap();

        let mut out = Vec::new();
        client_rx.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"\x00\x05hello");
    }

    #[tokio::test]
    async fn test_echo_stops_at_limit() {
        let (mut client_tx, server_rx) = duplex(256 * 1024);
        let (server_tx, mut client_rx) = duplex(256 * 1024);
        client_tx.write_all(&vec![7u8; ECHO_LIMIT + 100]).await.unwrap();
        client_tx.shutdown().await.unwrap();

        EchoHandler
            .handle_stream(DoqStream::new(4, server_tx, server_rx))
            .await
            .unwrap();

        let mut out = Vec::new();
        client_rx.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), ECHO_LIMIT);
    }
}
