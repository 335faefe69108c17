mod config;
mod error;
mod server;

pub use config::{BindConfig, ConfigError, ServerConfig, TlsConfig};
pub use error::ServerError;
pub use server::Server;
