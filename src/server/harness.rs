/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Generic server harness
//!
//! Ties configuration, handler construction, TLS loading and the listener
//! together. Every gateway binary goes through [`launch`]; tests drive
//! [`Gateway`] directly with an explicit `Config`.

use crate::config;
use crate::config::types::Config;
use crate::core;
use crate::core::error::{GatewayError, Result};
use crate::network::tls_config::load_server_tls;
use crate::server::listener::Listener;
use crate::server::{HandlerFactory, StreamHandler};
use crate::service::HandlerRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::{runtime, signal};
use tracing::{error, info, warn};

/// A bound listener and the handler it serves.
#[derive(Debug)]
pub struct Gateway {
    listener: Listener,
    handler: Arc<dyn StreamHandler>,
}

impl Gateway {
    /// Build the handler, load TLS material and bind the endpoint.
    ///
    /// Every failure here happens before any connection is accepted.
    pub fn build(config: &Config, factory: &dyn HandlerFactory) -> Result<Self> {
        let args = config.handler.args.as_ref();
        factory.validate_config(args)?;
        let handler = factory.create(args)?;

        let tls = load_server_tls(&config.server)?;
        let listener = Listener::bind(&config.server, tls)?;
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then drain.
    pub async fn serve(self, shutdown: oneshot::Receiver<()>) -> Result<()> {
        self.listener.run(self.handler, shutdown).await
    }
}

/// Build and serve `config` with the handler `factory` creates.
pub async fn run(
    config: Config,
    factory: &dyn HandlerFactory,
    shutdown: oneshot::Receiver<()>,
) -> Result<()> {
    Gateway::build(&config, factory)?.serve(shutdown).await
}

/// Process entry point shared by the gateway binaries
///
/// `handler_type` replaces the configured `handler.type` when given.
pub fn launch(handler_type: Option<&str>) -> Result<()> {
    let mut tokio_runtime = runtime::Builder::new_multi_thread();
    tokio_runtime.enable_all().thread_name("doq-worker");
    let tokio_runtime = tokio_runtime
        .build()
        .map_err(|err| GatewayError::runtime(format!("Failed to initialize Tokio runtime: {err}")))?;
    tokio_runtime.block_on(run_async_main(handler_type))
}

async fn run_async_main(handler_type: Option<&str>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(());
    });

    let mut runtime = core::init();
    let options = runtime.options.clone();

    let mut config = match config::init(&options.config) {
        Ok(config) => config,
        Err(e) => {
            // No configured log sink yet; report on the default one
            let _guard = core::init_log(Default::default());
            error!(
                "Configuration initialization failed ({:?}): {}",
                options.config, e
            );
            return Err(e);
        }
    };

    if let Some(level) = options.log_level {
        config.log.level = level;
    }
    if let Some(listen) = options.listen {
        config.server.listen = listen;
    }
    if let Some(handler_type) = handler_type {
        config.handler.handler_type = handler_type.to_string();
    }

    runtime.log_guard = Some(core::init_log(config.log.clone()));
    info!("Loaded configuration from: {:?}", options.config);

    if let Err(e) = config.validate() {
        error!("Invalid command-line override: {}", e);
        return Err(e.into());
    }

    let registry = HandlerRegistry::with_builtin();
    let result = match registry.get(&config.handler.handler_type) {
        Ok(factory) => run(config, factory, shutdown_rx).await,
        Err(e) => Err(e),
    };

    match &result {
        Ok(()) => info!("Graceful shutdown complete"),
        Err(e) => error!("Gateway stopped: {}", e),
    }
    result
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};
        match unix_signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C signal, initiating graceful shutdown"),
                    _ = terminate.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                }
                return;
            }
            Err(e) => warn!("Failed to listen for SIGTERM: {}", e),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C signal, initiating graceful shutdown"),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
}
