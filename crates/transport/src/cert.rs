//! Server certificate loading shared by the TLS and HTTPS listeners (§4.3).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;

use crate::error::TransportError;

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path).map_err(|e| TransportError::TlsLoad(format!("{}: {e}", path.display())))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::TlsLoad(format!("{}: {e}", path.display())))
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let file = File::open(path).map_err(|e| TransportError::TlsLoad(format!("{}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TransportError::TlsLoad(format!("{}: {e}", path.display())))?
        .ok_or_else(|| TransportError::TlsLoad(format!("no private key found in {}", path.display())))
}

/// Builds a server-side `rustls::ServerConfig`. When `trusted_client_cert_path`
/// is set, client certificates are required and verified against that pinned
/// trust anchor (§4.3's optional mutual-TLS validation for HTTPS/TLS).
pub fn build_server_config(
    cert_path: &Path,
    key_path: &Path,
    trusted_client_cert_path: Option<&Path>,
) -> Result<rustls::ServerConfig, TransportError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let builder = rustls::ServerConfig::builder();
    let config = match trusted_client_cert_path {
        Some(path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(path)? {
                roots
                    .add(cert)
                    .map_err(|e| TransportError::TlsLoad(format!("trust anchor: {e}")))?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|e| TransportError::TlsLoad(format!("client verifier: {e}")))?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    config
        .with_single_cert(certs, key)
        .map_err(|e| TransportError::TlsLoad(format!("invalid cert/key pair: {e}")))
}
