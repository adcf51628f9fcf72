//! TLS setup for both ends of the transport.
//!
//! The server's "host credential" is a PEM certificate chain plus private
//! key, loaded at startup into a `TlsAcceptor`. The client side builds a
//! `TlsConnector` trusting either an explicit PEM bundle (`--ca`, the
//! normal case for self-signed deployments) — there is no implicit trust
//! of system roots.

use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Errors that can occur when loading TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read certificate file: {0}")]
    CertRead(#[source] std::io::Error),
    #[error("failed to read private key file: {0}")]
    KeyRead(#[source] std::io::Error),
    #[error("no certificates found in PEM file")]
    NoCerts,
    #[error("no private key found in PEM file")]
    NoKey,
    #[error("invalid server name: {0}")]
    BadServerName(String),
    #[error("failed to build TLS config: {0}")]
    Config(#[from] tokio_rustls::rustls::Error),
}

/// Ensure a rustls CryptoProvider is installed; idempotent.
fn install_provider() {
    let _ = tokio_rustls::rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Load the host credential (PEM certificate chain + private key) and
/// build a `TlsAcceptor` for the accept loop.
pub fn load_host_credential(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let cert_data = std::fs::read(cert_path).map_err(TlsError::CertRead)?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut &cert_data[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::CertRead)?;
    if certs.is_empty() {
        return Err(TlsError::NoCerts);
    }

    let key_data = std::fs::read(key_path).map_err(TlsError::KeyRead)?;
    let key = rustls_pemfile::private_key(&mut &key_data[..])
        .map_err(TlsError::KeyRead)?
        .ok_or(TlsError::NoKey)?;

    install_provider();

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build a client `TlsConnector` trusting the certificates in `ca_path`.
pub fn client_connector(ca_path: &Path) -> Result<TlsConnector, TlsError> {
    let ca_data = std::fs::read(ca_path).map_err(TlsError::CertRead)?;
    let mut roots = RootCertStore::empty();
    let mut added = 0;
    for cert in rustls_pemfile::certs(&mut &ca_data[..]) {
        let cert = cert.map_err(TlsError::CertRead)?;
        if roots.add(cert).is_ok() {
            added += 1;
        }
    }
    if added == 0 {
        return Err(TlsError::NoCerts);
    }

    install_provider();

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Parse the host part of an address into a rustls `ServerName`.
pub fn server_name(host: &str) -> Result<ServerName<'static>, TlsError> {
    ServerName::try_from(host.to_string()).map_err(|_| TlsError::BadServerName(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_nonexistent_credential_returns_error() {
        let result = load_host_credential(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        );
        assert!(matches!(result, Err(TlsError::CertRead(_))));
    }

    #[test]
    fn load_empty_credential_returns_no_certs() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, "").unwrap();
        std::fs::write(&key_path, "").unwrap();

        let result = load_host_credential(&cert_path, &key_path);
        assert!(matches!(result, Err(TlsError::NoCerts)));
    }

    #[test]
    fn load_valid_self_signed_credential() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");

        std::fs::write(&cert_path, cert.cert.pem()).unwrap();
        std::fs::write(&key_path, cert.key_pair.serialize_pem()).unwrap();

        let result = load_host_credential(&cert_path, &key_path);
        assert!(result.is_ok(), "self-signed credential should load: {:?}", result.err());
    }

    #[test]
    fn load_cert_without_key_returns_no_key() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");

        std::fs::write(&cert_path, cert.cert.pem()).unwrap();
        std::fs::write(&key_path, "not a key").unwrap();

        let result = load_host_credential(&cert_path, &key_path);
        assert!(matches!(result, Err(TlsError::NoKey)));
    }

    #[test]
    fn client_connector_trusts_pem_bundle() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let ca_path = dir.path().join("ca.pem");
        std::fs::write(&ca_path, cert.cert.pem()).unwrap();

        assert!(client_connector(&ca_path).is_ok());
    }

    #[test]
    fn server_name_accepts_hostname_and_ip() {
        assert!(server_name("localhost").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("not a hostname").is_err());
    }
}
