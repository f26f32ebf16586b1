/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! DoQ server engine
//!
//! The listener, session and harness are shared by every edge behavior. The
//! only point where behaviors differ is the [`StreamHandler`] invoked once per
//! accepted stream; [`HandlerFactory`] builds it (and the parameters it
//! carries) from configuration before the listener starts.

use crate::core::error::Result;
use async_trait::async_trait;
use serde_yml::Value;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod harness;
pub mod listener;
pub mod session;

/// Send half of a stream. Dropping it finishes the stream.
pub type StreamSender = Box<dyn AsyncWrite + Send + Unpin>;

/// Receive half of a stream.
pub type StreamReceiver = Box<dyn AsyncRead + Send + Unpin>;

/// One accepted bidirectional stream, scoped to a single query exchange.
pub struct DoqStream {
    pub id: u64,
    pub send: StreamSender,
    pub recv: StreamReceiver,
}

impl DoqStream {
    pub fn new<S, R>(id: u64, send: S, recv: R) -> Self
    where
        S: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            id,
            send: Box::new(send),
            recv: Box::new(recv),
        }
    }
}

impl Debug for DoqStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoqStream").field("id", &self.id).finish()
    }
}

/// Per-stream behavior plugged into the shared engine.
///
/// Invoked inside the stream's tracing span, so every event it emits carries
/// the session and stream identifiers. The stream is owned by the call and is
/// closed on every return path.
#[async_trait]
pub trait StreamHandler: Debug + Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn handle_stream(&self, stream: DoqStream) -> Result<()>;
}

/// Builds a [`StreamHandler`] from the `handler.args` configuration value.
pub trait HandlerFactory: Debug + Send + Sync {
    /// Validate the arguments without building anything
    fn validate_config(&self, args: Option<&Value>) -> Result<()>;

    fn create(&self, args: Option<&Value>) -> Result<Arc<dyn StreamHandler>>;
}
