/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! QUIC listener
//!
//! Owns the bound endpoint and spawns one session task per accepted
//! connection. Shutdown stops admission and drains every live session before
//! returning.

use crate::config::types::ServerConfig;
use crate::core::error::{GatewayError, Result};
use crate::server::StreamHandler;
use crate::server::session::serve_session;
use quinn::{ConnectionError, Endpoint, EndpointConfig, IdleTimeout, Incoming, TransportConfig};
use rustls::pki_types::CertificateDer;
use socket2::{Domain, Socket, Type};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, field, info, info_span, warn};

/// Bound DoQ endpoint, ready to serve.
#[derive(Debug)]
pub struct Listener {
    endpoint: Endpoint,
    zero_rtt: bool,
}

impl Listener {
    /// Bind the endpoint described by `config`, secured by `tls`.
    pub fn bind(config: &ServerConfig, tls: rustls::ServerConfig) -> Result<Self> {
        let addr = config.listen_addr()?;
        let socket = build_udp_socket(addr)
            .map_err(|e| GatewayError::runtime(format!("bind UDP socket {}: {}", addr, e)))?;

        // Client certificates only arrive with the client Finished, so a
        // mutual-TLS listener completes the handshake before serving.
        let zero_rtt = config.early_data && config.mtls_ca_certs.is_none();

        let quic_crypto = quinn::crypto::rustls::QuicServerConfig::try_from(Arc::new(tls))?;
        let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_crypto));

        let mut transport = TransportConfig::default();
        transport.max_idle_timeout(Some(IdleTimeout::try_from(config.idle_timeout())?));
        server_config.transport = Arc::new(transport);

        let endpoint = Endpoint::new(
            EndpointConfig::default(),
            Some(server_config),
            socket,
            Arc::new(quinn::TokioRuntime),
        )?;

        Ok(Self { endpoint, zero_rtt })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Accept connections until `shutdown` fires or the endpoint stops.
    ///
    /// Either way every live session is joined first. A shutdown returns
    /// `Ok`; the endpoint ending on its own is an error.
    pub async fn run(
        self,
        handler: Arc<dyn StreamHandler>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<()> {
        let local = self.local_addr()?;
        info!(
            "DoQ listener serving on {} with handler [{}]",
            local,
            handler.name()
        );

        let mut sessions: JoinSet<()> = JoinSet::new();
        let mut active_sessions = 0u64;

        let requested = loop {
            tokio::select! {
                incoming = self.endpoint.accept() => match incoming {
                    Some(incoming) => {
                        active_sessions += 1;
                        sessions.spawn(handle_incoming(incoming, handler.clone(), self.zero_rtt));
                        debug!("New QUIC connection started (active: {})", active_sessions);
                    }
                    None => break false,
                },

                _ = &mut shutdown => break true,

                // Clean up finished sessions
                Some(result) = sessions.join_next() => {
                    active_sessions = active_sessions.saturating_sub(1);
                    if let Err(e) = result {
                        warn!("Session task panicked: {:?}", e);
                    }
                }
            }
        };

        // Refuse new connections while the live ones drain
        self.endpoint.set_server_config(None);
        if !sessions.is_empty() {
            info!("Waiting for {} sessions to finish", sessions.len());
        }
        while let Some(result) = sessions.join_next().await {
            if let Err(e) = result {
                warn!("Session task panicked: {:?}", e);
            }
        }

        self.endpoint.close(0u32.into(), b"");
        self.endpoint.wait_idle().await;

        if requested {
            info!("DoQ listener on {} stopped", local);
            Ok(())
        } else {
            Err(GatewayError::runtime(format!(
                "QUIC endpoint on {} stopped accepting connections",
                local
            )))
        }
    }
}

/// Complete one connection's handshake and serve it as a session.
async fn handle_incoming(incoming: Incoming, handler: Arc<dyn StreamHandler>, zero_rtt: bool) {
    let remote_addr = incoming.remote_address();
    let span = info_span!(
        "session",
        client = %remote_addr,
        client_cert_subject = field::Empty
    );

    async move {
        let connection = match establish(incoming, zero_rtt).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("QUIC handshake failed: {}", e);
                return;
            }
        };

        if let Some(subject) = peer_subject(&connection) {
            Span::current().record("client_cert_subject", subject.as_str());
        }

        serve_session(connection, handler).await;
    }
    .instrument(span)
    .await
}

async fn establish(
    incoming: Incoming,
    zero_rtt: bool,
) -> std::result::Result<quinn::Connection, ConnectionError> {
    let connecting = incoming.accept()?;
    if zero_rtt {
        // Servers always succeed here; streams flow in 0.5-RTT
        return match connecting.into_0rtt() {
            Ok((connection, _)) => Ok(connection),
            Err(connecting) => connecting.await,
        };
    }
    connecting.await
}

/// Subject of the verified client certificate, when one was presented.
fn peer_subject(connection: &quinn::Connection) -> Option<String> {
    let identity = connection.peer_identity()?;
    let certs = identity.downcast::<Vec<CertificateDer<'static>>>().ok()?;
    let leaf = certs.first()?;
    match x509_parser::parse_x509_certificate(leaf.as_ref()) {
        Ok((_, cert)) => Some(cert.subject().to_string()),
        Err(e) => {
            debug!("Failed to parse client certificate: {}", e);
            None
        }
    }
}

fn build_udp_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let sock = if addr.is_ipv4() {
        Socket::new(Domain::IPV4, Type::DGRAM, None)?
    } else {
        let s = Socket::new(Domain::IPV6, Type::DGRAM, None)?;
        s.set_only_v6(true)?;
        s
    };

    sock.set_nonblocking(true)?;
    sock.bind(&addr.into())?;

    Ok(sock.into())
}
