//! Transport listeners (§4.3): TCP, TLS, UDP and HTTP/HTTPS, all sharing
//! the `start(cancellation)` / `stop()` contract realized as `tokio::spawn`
//! plus a shared `tokio_util::sync::CancellationToken`.

mod cert;
mod connection;
mod context;
mod error;
mod http;
mod tcp;
mod tls;
mod udp;

pub use context::{IngressItem, TransportContext};
pub use error::TransportError;
pub use http::{spawn_http_listener, spawn_https_listener, HttpsListenerConfig};
pub use tcp::spawn_tcp_listener;
pub use tls::{spawn_tls_listener, TlsListenerConfig};
pub use udp::spawn_udp_listener;
