use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("transport error: {0}")]
    Transport(#[from] transport::TransportError),
    #[error("TLS listener configured without a cert/key pair")]
    MissingTlsConfig,
}
