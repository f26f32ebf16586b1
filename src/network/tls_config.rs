/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! TLS configuration for the DoQ endpoint and the test client
//!
//! Provides:
//! - Server configuration: certificate chain and key from PEM files, TLS 1.3
//!   only, ALPN `doq`, optional mutual TLS against a CA bundle, optional
//!   session-secret export
//! - Client configuration for the test client, with or without certificate
//!   validation

use crate::config::types::ServerConfig as ListenerConfig;
use crate::core::error::{GatewayError, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::{
    ClientConfig, DigitallySignedStruct, Error, KeyLog, RootCertStore, ServerConfig,
    SignatureScheme,
};
use std::fmt::{Debug, Formatter};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// The single application protocol identifier negotiated for DoQ (RFC 9250).
pub const DOQ_ALPN: &[u8] = b"doq";

fn provider() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

/// Build the listener's TLS configuration from the files named in `config`.
///
/// Any unreadable or empty certificate, key or CA file is a startup error.
pub fn load_server_tls(config: &ListenerConfig) -> Result<ServerConfig> {
    info!(
        "Loading TLS configuration: cert={}, key={}",
        config.cert, config.key
    );
    let certs = load_certs(&config.cert)?;
    let key = load_private_key(&config.key)?;

    let client_roots = match &config.mtls_ca_certs {
        Some(path) => {
            info!("Mutual TLS enabled, client CA bundle={}", path);
            Some(load_ca_bundle(path)?)
        }
        None => None,
    };

    let mut tls = build_server_tls(certs, key, client_roots)?;
    // 0-RTT is never offered to mTLS listeners
    if config.early_data && config.mtls_ca_certs.is_none() {
        // quinn only accepts 0 or u32::MAX here
        tls.max_early_data_size = u32::MAX;
    }
    if let Some(path) = &config.keylog {
        warn!("Exporting TLS session secrets to {}", path);
        tls.key_log = open_key_log(path, false)?;
    }
    Ok(tls)
}

/// Assemble a TLS 1.3 server configuration advertising ALPN `doq`.
///
/// With `client_roots`, every client must present a certificate chaining to
/// one of the roots.
pub fn build_server_tls(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_roots: Option<RootCertStore>,
) -> Result<ServerConfig> {
    let builder = ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?;

    let builder = match client_roots {
        Some(roots) => {
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider())
                .build()
                .map_err(|e| {
                    GatewayError::tls(format!("Failed to build client verifier: {}", e))
                })?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder
        .with_single_cert(certs, key)
        .map_err(|e| GatewayError::tls(format!("Failed to build TLS configuration: {}", e)))?;
    config.alpn_protocols = vec![DOQ_ALPN.to_vec()];
    Ok(config)
}

/// Read a PEM certificate chain.
pub fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        GatewayError::tls(format!("Failed to open certificate file {}: {}", path, e))
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            GatewayError::tls(format!("Failed to parse certificate file {}: {}", path, e))
        })?;

    if certs.is_empty() {
        return Err(GatewayError::tls(format!(
            "No certificates found in {}",
            path
        )));
    }
    Ok(certs)
}

/// Read a PEM private key (PKCS#8, RSA or EC).
pub fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        GatewayError::tls(format!("Failed to open private key file {}: {}", path, e))
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            GatewayError::tls(format!("Failed to parse private key file {}: {}", path, e))
        })?
        .ok_or_else(|| GatewayError::tls(format!("No private key found in {}", path)))
}

/// Read the CA bundle used to verify client certificates.
pub fn load_ca_bundle(path: &str) -> Result<RootCertStore> {
    let certs = load_certs(path)
        .map_err(|e| GatewayError::tls(format!("load mTLS CA certificates: {}", e)))?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        warn!("Ignored {} unparsable certificates in {}", ignored, path);
    }
    if added == 0 {
        return Err(GatewayError::tls(format!(
            "load mTLS CA certificates: found no usable certificate in {}",
            path
        )));
    }
    Ok(roots)
}

/// Build a TLS 1.3 client configuration for DoQ.
///
/// Without `roots` the server certificate is not validated at all.
pub fn build_client_tls(
    roots: Option<RootCertStore>,
    identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
) -> Result<ClientConfig> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?;

    let builder = match roots {
        Some(roots) => builder.with_root_certificates(roots),
        None => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerification)),
    };

    let mut config = match identity {
        Some((certs, key)) => builder.with_client_auth_cert(certs, key)?,
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![DOQ_ALPN.to_vec()];
    config.enable_early_data = true;
    Ok(config)
}

/// Open a session-secret sink in NSS key log format.
///
/// The server appends to an existing file, the client truncates it.
pub fn open_key_log(path: &str, truncate: bool) -> Result<Arc<dyn KeyLog>> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    let file = options
        .open(Path::new(path))
        .map_err(|e| GatewayError::tls(format!("open keylog file {}: {}", path, e)))?;
    Ok(Arc::new(FileKeyLog {
        file: Mutex::new(file),
    }))
}

/// Writes one `LABEL client_random secret` line per negotiated secret.
struct FileKeyLog {
    file: Mutex<File>,
}

impl Debug for FileKeyLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileKeyLog")
    }
}

impl KeyLog for FileKeyLog {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        let mut line = String::with_capacity(label.len() + 2 * (client_random.len() + secret.len()) + 3);
        line.push_str(label);
        line.push(' ');
        for byte in client_random {
            let _ = write!(line, "{:02x}", byte);
        }
        line.push(' ');
        for byte in secret {
            let _ = write!(line, "{:02x}", byte);
        }
        line.push('\n');

        if let Ok(mut file) = self.file.lock() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                warn!("Failed to write TLS key log: {}", e);
            }
        }
    }
}

/// Certificate verifier that accepts any certificate (INSECURE!)
///
/// Used only by the test client. **Never use in production!**
struct NoCertVerification;

impl Debug for NoCertVerification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NoCertVerification")
    }
}

impl ServerCertVerifier for NoCertVerification {
    fn verify_server_cert(
        &self,
        _: &CertificateDer<'_>,
        _: &[CertificateDer<'_>],
        _: &ServerName<'_>,
        _: &[u8],
        _: UnixTime,
    ) -> std::result::Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::{TestPki, write_temp_file};

    #[test]
    fn test_server_tls_advertises_doq() {
        let pki = TestPki::new();
        let config = build_server_tls(pki.server_chain(), pki.server_key(), None).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"doq".to_vec()]);
    }

    #[test]
    fn test_load_server_tls_from_files() {
        let pki = TestPki::new();
        let cert = write_temp_file("tls-load-cert.pem", &pki.server_cert_pem());
        let key = write_temp_file("tls-load-key.pem", &pki.server_key_pem());
        let ca = write_temp_file("tls-load-ca.pem", &pki.ca_cert_pem());

        let listener = ListenerConfig {
            cert: cert.display().to_string(),
            key: key.display().to_string(),
            mtls_ca_certs: Some(ca.display().to_string()),
            ..ListenerConfig::default()
        };
        let config = load_server_tls(&listener).unwrap();
        assert_eq!(config.max_early_data_size, 0);
        assert_eq!(config.alpn_protocols, vec![DOQ_ALPN.to_vec()]);
    }

    #[test]
    fn test_early_data_only_without_mtls() {
        let pki = TestPki::new();
        let cert = write_temp_file("tls-early-cert.pem", &pki.server_cert_pem());
        let key = write_temp_file("tls-early-key.pem", &pki.server_key_pem());
        let listener = ListenerConfig {
            cert: cert.display().to_string(),
            key: key.display().to_string(),
            early_data: true,
            ..ListenerConfig::default()
        };
        assert_eq!(load_server_tls(&listener).unwrap().max_early_data_size, u32::MAX);

        let disabled = ListenerConfig {
            early_data: false,
            ..listener
        };
        assert_eq!(load_server_tls(&disabled).unwrap().max_early_data_size, 0);
    }

    #[test]
    fn test_tls12_only_client_rejected() {
        let pki = TestPki::new();
        let server = build_server_tls(pki.server_chain(), pki.server_key(), None).unwrap();
        let client = ClientConfig::builder_with_provider(provider())
            .with_protocol_versions(&[&rustls::version::TLS12])
            .unwrap()
            .with_root_certificates(pki.roots())
            .with_no_client_auth();

        let name = ServerName::try_from("localhost").unwrap();
        let mut client = rustls::ClientConnection::new(Arc::new(client), name).unwrap();
        let mut server = rustls::ServerConnection::new(Arc::new(server)).unwrap();

        let mut hello = Vec::new();
        client.write_tls(&mut hello).unwrap();
        server.read_tls(&mut hello.as_slice()).unwrap();
        assert!(server.process_new_packets().is_err());
    }

    #[test]
    fn test_missing_cert_file_is_tls_error() {
        let listener = ListenerConfig {
            cert: "/nonexistent/doq-gateway/server.crt".to_string(),
            ..ListenerConfig::default()
        };
        assert!(matches!(
            load_server_tls(&listener),
            Err(GatewayError::Tls(_))
        ));
    }

    #[test]
    fn test_empty_ca_bundle_rejected() {
        let path = write_temp_file("tls-empty-ca.pem", "not a certificate\n");
        let err = load_ca_bundle(&path.display().to_string()).unwrap_err();
        assert!(err.to_string().contains("mTLS CA"));
    }

    #[test]
    fn test_key_log_line_format() {
        let path = std::env::temp_dir().join(format!(
            "doq-gateway-keylog-{}.txt",
            std::process::id()
        ));
        let key_log = open_key_log(&path.display().to_string(), true).unwrap();
        key_log.log("CLIENT_HANDSHAKE_TRAFFIC_SECRET", &[0x01, 0xab], &[0xff, 0x00]);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "CLIENT_HANDSHAKE_TRAFFIC_SECRET 01ab ff00\n");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_client_tls_insecure_has_alpn() {
        let config = build_client_tls(None, None).unwrap();
        assert_eq!(config.alpn_protocols, vec![DOQ_ALPN.to_vec()]);
        assert!(config.enable_early_data);
    }
}
