/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Shared fixtures for unit tests: a throwaway PKI, DNS message builders and
//! in-process mock backends.

use crate::network::framing::{encode_frame, read_frame};
use crate::network::tls_config::build_client_tls;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose,
};
use quinn::Endpoint;
use quinn::crypto::rustls::QuicClientConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::RootCertStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, UdpSocket};

/// CA, server certificate for `localhost` and a client certificate, all
/// generated per test.
pub struct TestPki {
    ca_cert: Certificate,
    server_cert: Certificate,
    server_key: KeyPair,
    client_cert: Certificate,
    client_key: KeyPair,
}

impl TestPki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "doq test ca");
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let server_key = KeyPair::generate().unwrap();
        let server_cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .signed_by(&server_key, &ca_cert, &ca_key)
            .unwrap();

        let client_key = KeyPair::generate().unwrap();
        let mut client_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        client_params
            .distinguished_name
            .push(DnType::CommonName, "doq-test-client");
        let client_cert = client_params
            .signed_by(&client_key, &ca_cert, &ca_key)
            .unwrap();

        Self {
            ca_cert,
            server_cert,
            server_key,
            client_cert,
            client_key,
        }
    }

    pub fn server_chain(&self) -> Vec<CertificateDer<'static>> {
        vec![self.server_cert.der().clone()]
    }

    pub fn server_key(&self) -> PrivateKeyDer<'static> {
        PrivatePkcs8KeyDer::from(self.server_key.serialize_der()).into()
    }

    pub fn client_chain(&self) -> Vec<CertificateDer<'static>> {
        vec![self.client_cert.der().clone()]
    }

    pub fn client_key(&self) -> PrivateKeyDer<'static> {
        PrivatePkcs8KeyDer::from(self.client_key.serialize_der()).into()
    }

    pub fn roots(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca_cert.der().clone()).unwrap();
        roots
    }

    pub fn server_cert_pem(&self) -> String {
        self.server_cert.pem()
    }

    pub fn server_key_pem(&self) -> String {
        self.server_key.serialize_pem()
    }

    pub fn ca_cert_pem(&self) -> String {
        self.ca_cert.pem()
    }
}

/// QUIC client endpoint on loopback trusting `roots`, optionally presenting
/// a client certificate.
pub fn quic_client(
    roots: RootCertStore,
    identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
) -> Endpoint {
    quic_client_with(build_client_tls(Some(roots), identity).unwrap())
}

/// Client offering `alpn` instead of `doq`; an empty list offers none.
pub fn quic_client_with_alpn(roots: RootCertStore, alpn: Vec<Vec<u8>>) -> Endpoint {
    let mut tls = build_client_tls(Some(roots), None).unwrap();
    tls.alpn_protocols = alpn;
    quic_client_with(tls)
}

fn quic_client_with(tls: rustls::ClientConfig) -> Endpoint {
    let crypto = QuicClientConfig::try_from(Arc::new(tls)).unwrap();
    let mut endpoint = Endpoint::client("127.0.0.1:0".parse().unwrap()).unwrap();
    endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(crypto)));
    endpoint
}

/// Write `content` to a per-process file under the temp directory.
pub fn write_temp_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "doq-gateway-{}-{}",
        std::process::id(),
        name
    ));
    std::fs::write(&path, content).unwrap();
    path
}

/// Wire bytes of a client query, ID 0 as DoQ requires.
pub fn make_query(name: &str, qtype: RecordType, recursion: bool, dnssec: bool) -> Vec<u8> {
    let mut message = Message::new();
    message.set_id(0);
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(recursion);
    message.add_query(Query::query(Name::from_ascii(name).unwrap(), qtype));
    let mut edns = Edns::new();
    edns.set_max_payload(4096);
    edns.set_dnssec_ok(dnssec);
    message.set_edns(edns);
    message.to_bytes().unwrap()
}

/// Build a minimal DNS response from request, preserving id/opcode/query.
pub fn build_response_from_request(request: &Message, rcode: ResponseCode) -> Message {
    let mut response = Message::new();
    response.set_id(request.id());
    response.set_op_code(request.op_code());
    response.set_message_type(MessageType::Response);
    response.set_recursion_desired(request.recursion_desired());
    response.set_response_code(rcode);
    *response.queries_mut() = request.queries().to_vec();
    response
}

/// Response to `request` carrying the single A record `192.0.2.<last_octet>`.
pub fn make_answer(request: &Message, last_octet: u8) -> Vec<u8> {
    let mut response = build_response_from_request(request, ResponseCode::NoError);
    let name = request
        .queries()
        .first()
        .map(|query| query.name().clone())
        .unwrap_or_else(Name::root);
    response.add_answer(Record::from_rdata(
        name,
        300,
        RData::A(A::new(192, 0, 2, last_octet)),
    ));
    response.to_bytes().unwrap()
}

/// What a mock backend observed.
#[derive(Default)]
pub struct BackendLog {
    pub exchanges: AtomicUsize,
    pub ids: Mutex<Vec<u16>>,
}

impl BackendLog {
    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn ids(&self) -> Vec<u16> {
        self.ids.lock().unwrap().clone()
    }
}

/// UDP backend answering every query with one A record.
pub async fn spawn_udp_backend() -> (SocketAddr, Arc<BackendLog>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let log = Arc::new(BackendLog::default());
    let task_log = log.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(request) = Message::from_bytes(&buf[..n]) else {
                continue;
            };
            task_log.exchanges.fetch_add(1, Ordering::SeqCst);
            task_log.ids.lock().unwrap().push(request.id());
            let _ = socket.send_to(&make_answer(&request, 1), peer).await;
        }
    });
    (addr, log)
}

/// TCP backend emitting `count` framed responses per query, then holding the
/// connection open for `idle` before closing it.
pub async fn spawn_tcp_backend(count: usize, idle: Duration) -> (SocketAddr, Arc<BackendLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(BackendLog::default());
    let task_log = log.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut conn, _)) = listener.accept().await else {
                return;
            };
            let log = task_log.clone();
            tokio::spawn(async move {
                let Ok(query) = read_frame(&mut conn).await else {
                    return;
                };
                let Ok(request) = Message::from_bytes(&query) else {
                    return;
                };
                log.exchanges.fetch_add(1, Ordering::SeqCst);
                log.ids.lock().unwrap().push(request.id());
                for i in 0..count {
                    let frame = encode_frame(&make_answer(&request, i as u8 + 1)).unwrap();
                    if conn.write_all(&frame).await.is_err() {
                        return;
                    }
                }
                tokio::time::sleep(idle).await;
            });
        }
    });
    (addr, log)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_response_keeps_question() {
        let query = make_query("example.com.", RecordType::A, true, false);
        let mut request = Message::from_bytes(&query).unwrap();
        request.set_id(77);
        let response = build_response_from_request(&request, ResponseCode::Refused);
        assert_eq!(response.id(), 77);
        assert_eq!(response.message_type(), MessageType::Response);
        assert_eq!(response.response_code(), ResponseCode::Refused);
        assert!(response.recursion_desired());
        assert_eq!(response.queries(), request.queries());
    }
}
