/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! doq-client - DNS-over-QUIC test client
//!
//! Sends every `<qname> <qtype>` pair as its own stream over one connection
//! and prints the responses. The server certificate is not verified.

use bytes::BytesMut;
use clap::{ArgAction, Parser};
use doq_gateway::config::types::LogConfig;
use doq_gateway::core;
use doq_gateway::core::error::{GatewayError, Result};
use doq_gateway::network::framing::encode_frame;
use doq_gateway::network::tls_config::{build_client_tls, open_key_log};
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{Connection, Endpoint, ReadExactError, RecvStream};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Gap after which a zone transfer is considered complete
const XFR_IDLE_GAP: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[clap(version, about = "DNS-over-QUIC test client")]
struct ClientOptions {
    /// DoQ server address
    #[clap(long, default_value = "127.0.0.1:853")]
    server: SocketAddr,

    /// Set the DO bit
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    dnssec: bool,

    /// Set the RD bit
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    recursion: bool,

    /// Write TLS session secrets to this file (NSS key log format)
    #[clap(long)]
    export_keys_path: Option<String>,

    /// Connect and per-query timeout in seconds
    #[clap(long, default_value_t = 3)]
    timeout: u64,

    /// TLS server name (SNI)
    #[clap(long, default_value = "localhost")]
    server_name: String,

    /// Log level: off, trace, debug, info, warn, error
    #[clap(short, long, default_value = "warn")]
    log_level: String,

    /// Query pairs: <qname> <qtype> [<qname> <qtype>...]
    queries: Vec<String>,
}

fn main() -> ExitCode {
    let options = ClientOptions::parse();

    let queries = match parse_queries(&options.queries) {
        Ok(queries) => queries,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: doq-client [OPTIONS] <qname> <qtype> [<qname> <qtype>...]");
            return ExitCode::FAILURE;
        }
    };

    let _guard = core::init_log(LogConfig {
        level: options.log_level.clone(),
        file: None,
    });

    let tokio_runtime = match runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(e) => {
            error!("Failed to initialize Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match tokio_runtime.block_on(run(options, queries)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_queries(args: &[String]) -> Result<Vec<(Name, RecordType)>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(GatewayError::config(
            "queries must be given as <qname> <qtype> pairs",
        ));
    }
    args.chunks_exact(2)
        .map(|pair| {
            let mut name = Name::from_str(&pair[0])
                .map_err(|e| GatewayError::config(format!("invalid name {}: {}", pair[0], e)))?;
            // command-line names are always absolute
            name.set_fqdn(true);
            let qtype = RecordType::from_str(&pair[1].to_uppercase())
                .map_err(|_| GatewayError::config(format!("unknown query type {}", pair[1])))?;
            Ok((name, qtype))
        })
        .collect()
}

/// `Ok(false)` when any query failed.
async fn run(options: ClientOptions, queries: Vec<(Name, RecordType)>) -> Result<bool> {
    let mut tls = build_client_tls(None, None)?;
    if let Some(path) = &options.export_keys_path {
        tls.key_log = open_key_log(path, true)?;
    }
    let crypto = QuicClientConfig::try_from(Arc::new(tls))?;

    let local: SocketAddr = if options.server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let mut endpoint = Endpoint::client(local)?;
    endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(crypto)));

    let query_timeout = Duration::from_secs(options.timeout);
    let connecting = endpoint.connect(options.server, &options.server_name)?;
    let connection = match timeout(query_timeout, connecting).await {
        Ok(connection) => connection?,
        Err(_) => {
            return Err(GatewayError::protocol(format!(
                "QUIC handshake with {} timed out",
                options.server
            )));
        }
    };
    debug!("Connected to {}", options.server);

    let mut tasks = JoinSet::new();
    let mut all_ok = true;
    for (name, qtype) in queries {
        if qtype == RecordType::IXFR {
            println!(";; skipping {} IXFR: needs the current zone serial", name);
            continue;
        }
        let query = build_query(&name, qtype, options.recursion, options.dnssec)?;
        let connection = connection.clone();
        tasks.spawn(async move {
            let outcome = exchange(&connection, &query, qtype, query_timeout).await;
            (name, qtype, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let Ok((name, qtype, outcome)) = joined else {
            all_ok = false;
            continue;
        };
        match outcome {
            Ok(responses) => {
                println!(";; {} {}: {} response(s)", name, qtype, responses.len());
                for response in responses {
                    println!("{}", response);
                }
            }
            Err(e) => {
                warn!("{} {} failed: {}", name, qtype, e);
                all_ok = false;
            }
        }
    }

    connection.close(0u32.into(), b"");
    endpoint.wait_idle().await;
    Ok(all_ok)
}

fn build_query(name: &Name, qtype: RecordType, recursion: bool, dnssec: bool) -> Result<Vec<u8>> {
    let mut message = Message::new();
    message.set_id(0);
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(recursion);
    message.add_query(Query::query(name.clone(), qtype));
    let mut edns = Edns::new();
    edns.set_max_payload(4096);
    edns.set_dnssec_ok(dnssec);
    message.set_edns(edns);
    Ok(message.to_bytes()?)
}

/// One stream: send the query, collect responses until the server finishes.
///
/// Zone transfers also end after a quiet gap.
async fn exchange(
    connection: &Connection,
    query: &[u8],
    qtype: RecordType,
    query_timeout: Duration,
) -> Result<Vec<Message>> {
    let (mut send, mut recv) = connection.open_bi().await?;
    send.write_all(&encode_frame(query)?)
        .await
        .map_err(|e| GatewayError::protocol(format!("send query: {}", e)))?;
    send.finish()
        .map_err(|e| GatewayError::protocol(format!("finish stream: {}", e)))?;

    let wait = if qtype == RecordType::AXFR {
        XFR_IDLE_GAP
    } else {
        query_timeout
    };

    let mut responses = Vec::new();
    loop {
        match timeout(wait, next_frame(&mut recv)).await {
            Ok(Ok(Some(payload))) => responses.push(Message::from_bytes(&payload)?),
            Ok(Ok(None)) => break,
            Ok(Err(e)) => return Err(e),
            Err(_) if qtype == RecordType::AXFR && !responses.is_empty() => break,
            Err(_) => return Err(GatewayError::protocol("timed out waiting for response")),
        }
    }
    if responses.is_empty() {
        return Err(GatewayError::protocol("stream finished without a response"));
    }
    Ok(responses)
}

/// `None` once the server finished the stream on a frame boundary.
async fn next_frame(recv: &mut RecvStream) -> Result<Option<BytesMut>> {
    let mut prefix = [0u8; 2];
    match recv.read_exact(&mut prefix).await {
        Ok(()) => {}
        Err(ReadExactError::FinishedEarly(0)) => return Ok(None),
        Err(e) => return Err(GatewayError::protocol(format!("read length: {}", e))),
    }

    let len = u16::from_be_bytes(prefix) as usize;
    let mut payload = BytesMut::zeroed(len);
    recv.read_exact(&mut payload)
        .await
        .map_err(|e| GatewayError::protocol(format!("read response ({} bytes): {}", len, e)))?;
    Ok(Some(payload))
}
