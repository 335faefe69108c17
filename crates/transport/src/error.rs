use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {0}: {1}")]
    Bind(std::net::SocketAddr, #[source] std::io::Error),
    #[error("failed to load TLS certificate material: {0}")]
    TlsLoad(String),
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),
}
