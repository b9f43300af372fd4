//! TLS for both ends of the relay.
//!
//! - **Server side** (forward mode): [`server_acceptor`] loads a PEM
//!   certificate chain and key and returns a `tokio_rustls::TlsAcceptor` used
//!   to terminate `wss://` before the WebSocket upgrade.
//! - **Client side** (reverse mode): [`client_config`] builds the rustls
//!   `ClientConfig` handed to tokio-tungstenite for `wss://` dials, with the
//!   certificate trust chosen by [`TrustPolicy`].
//!
//! All configs use the `ring` crypto provider explicitly, so no process-wide
//! default provider needs to be installed.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use crate::domain::{ServerTlsConfig, TrustPolicy};

/// Errors raised while building a TLS configuration.  All of them are
/// startup errors.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to load certificate from {path}: {reason}")]
    CertificateLoad { path: PathBuf, reason: String },

    #[error("failed to load private key from {path}: {reason}")]
    PrivateKeyLoad { path: PathBuf, reason: String },

    #[error("TLS configuration error: {0}")]
    Config(String),
}

impl TlsError {
    fn cert_load(path: &Path, reason: impl Into<String>) -> Self {
        TlsError::CertificateLoad {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn key_load(path: &Path, reason: impl Into<String>) -> Self {
        TlsError::PrivateKeyLoad {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Reads every certificate from a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::cert_load(path, e.to_string()))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::cert_load(path, e.to_string()))?;

    if certs.is_empty() {
        return Err(TlsError::cert_load(path, "no certificates found in file"));
    }
    Ok(certs)
}

/// Reads the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::key_load(path, e.to_string()))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::key_load(path, e.to_string()))?
        .ok_or_else(|| TlsError::key_load(path, "no private key found in file"))
}

/// Builds the acceptor that terminates TLS on the WebSocket listener.
///
/// # Errors
///
/// Returns an error if either file cannot be read or parsed, or if the key
/// does not match the certificate.
pub fn server_acceptor(config: &ServerTlsConfig) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certificates(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    let provider = rustls::crypto::ring::default_provider();
    let server_config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Config(format!("failed to set protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| TlsError::Config(format!("failed to build server config: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Builds the client config used for `wss://` dials.
pub fn client_config(trust: TrustPolicy) -> Result<Arc<ClientConfig>, TlsError> {
    let provider = rustls::crypto::ring::default_provider();
    let builder = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Config(format!("failed to set protocol versions: {e}")))?;

    let config = match trust {
        TrustPolicy::AcceptAny => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth(),
        TrustPolicy::WebPkiRoots => {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };

    Ok(Arc::new(config))
}

/// Verifier behind [`TrustPolicy::AcceptAny`]: every certificate is accepted
/// without chain or hostname validation.  Handshake signatures are not
/// checked either, so the connection is encrypted but not authenticated.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
