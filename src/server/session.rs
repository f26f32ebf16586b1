/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Session manager: one QUIC connection, many concurrent streams
//!
//! A session accepts bidirectional streams until stream acceptance fails,
//! running the handler for each stream in its own task. It then stops
//! accepting, joins every stream task it spawned, and only afterwards closes
//! the connection. No stream task outlives its session.

use crate::server::{DoqStream, StreamHandler};
use async_trait::async_trait;
use quinn::{ConnectionError, VarInt};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, info, info_span, warn};

/// Source of streams for one session.
#[async_trait]
pub trait StreamAcceptor: Send + Sync {
    /// Next bidirectional stream opened by the peer.
    async fn accept_stream(&self) -> Result<DoqStream, ConnectionError>;

    /// Close the underlying connection with `reason` (empty when clean).
    fn close_session(&self, reason: &str);
}

#[async_trait]
impl StreamAcceptor for quinn::Connection {
    async fn accept_stream(&self) -> Result<DoqStream, ConnectionError> {
        let (send, recv) = self.accept_bi().await?;
        let id = VarInt::from(send.id()).into_inner();
        Ok(DoqStream::new(id, send, recv))
    }

    fn close_session(&self, reason: &str) {
        quinn::Connection::close(self, VarInt::from_u32(0), reason.as_bytes());
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Streams accepted over the session's lifetime
    pub streams: u64,
    /// Reason sent with the close, `None` for a clean end
    pub failure: Option<String>,
}

/// Serve every stream of one connection, then close it.
///
/// Runs inside the caller's session span; each stream task gets a nested
/// `stream` span carrying its id.
pub async fn serve_session<A>(conn: A, handler: Arc<dyn StreamHandler>) -> SessionSummary
where
    A: StreamAcceptor,
{
    info!("session accepted");

    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut streams = 0u64;

    let end = loop {
        tokio::select! {
            accepted = conn.accept_stream() => match accepted {
                Ok(stream) => {
                    streams += 1;
                    let span = info_span!("stream", stream_id = stream.id);
                    tasks.spawn(run_stream(handler.clone(), stream).instrument(span));
                }
                Err(e) => break e,
            },

            // Reap finished streams while the session is busy
            Some(result) = tasks.join_next() => report_join(result),
        }
    };

    if !tasks.is_empty() {
        debug!("Stream accept ended ({}), draining {} streams", end, tasks.len());
    }
    while let Some(result) = tasks.join_next().await {
        report_join(result);
    }

    let failure = close_reason(&end);
    match &failure {
        Some(reason) => warn!("session failure: {}", reason),
        None => debug!("session ended: {}", end),
    }
    conn.close_session(failure.as_deref().unwrap_or(""));
    info!(streams, "session closed");

    SessionSummary { streams, failure }
}

async fn run_stream(handler: Arc<dyn StreamHandler>, stream: DoqStream) {
    debug!("stream accepted");
    if let Err(e) = handler.handle_stream(stream).await {
        warn!("stream failure: {}", e);
    }
    debug!("stream closed");
}

fn report_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        warn!("Stream task panicked: {:?}", e);
    }
}

/// `None` when the peer or this side closed the connection normally.
fn close_reason(end: &ConnectionError) -> Option<String> {
    match end {
        ConnectionError::ApplicationClosed(close) if close.error_code == VarInt::from_u32(0) => {
            None
        }
        ConnectionError::LocallyClosed => None,
        other => Some(other.to_string()),
    }
}
