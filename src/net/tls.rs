//! TLS configuration and certificate loading.
//!
//! The secure listener gets its configuration from a [`CertificateProvider`],
//! handed the external hostnames and the contact address. Issuing
//! certificates (ACME) is the provider's business; the default provider
//! serves a PEM pair from disk.
//!
//! `https` destinations are verified against the system roots plus an
//! optional PEM bundle (see [`upstream_tls_config`]).

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("TLS configuration error: {0}")]
    Config(#[from] rustls::Error),
}

/// Supplies the secure listener's TLS configuration.
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    async fn tls_config(&self, hostnames: &[String], contact: &str) -> Result<RustlsConfig, TlsError>;
}

/// Serves one certificate chain and key loaded from PEM files.
#[derive(Debug, Clone)]
pub struct PemCertificates {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl PemCertificates {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

#[async_trait]
impl CertificateProvider for PemCertificates {
    async fn tls_config(&self, hostnames: &[String], contact: &str) -> Result<RustlsConfig, TlsError> {
        let certs = load_certs(&self.cert_path).await?;
        let key = load_key(&self.key_path).await?;

        let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        tracing::info!(
            cert = %self.cert_path.display(),
            hosts = hostnames.len(),
            contact,
            "TLS enabled with provided certificates"
        );
        Ok(RustlsConfig::from_config(Arc::new(config)))
    }
}

/// Client configuration for `https` destinations.
///
/// Trusts the system store plus the certificates in `ca_path`, if given.
pub fn upstream_tls_config(ca_path: Option<&Path>) -> Result<rustls::ClientConfig, TlsError> {
    let mut roots = rustls::RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        tracing::warn!(error = %error, "Skipping unreadable system certificate");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::debug!(added, ignored, "Loaded system trust roots");

    if let Some(path) = ca_path {
        let pem = std::fs::read(path).map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        for cert in parse_certs(path, &pem)? {
            roots.add(cert)?;
        }
        tracing::info!(ca = %path.display(), "Trusting extra upstream roots");
    }

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(config)
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

async fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem = read(path).await?;
    parse_certs(path, &pem)
}

fn parse_certs(path: &Path, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

async fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let pem = read(path).await?;
    rustls_pemfile::private_key(&mut BufReader::new(&pem[..]))
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
