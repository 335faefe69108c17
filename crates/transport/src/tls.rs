use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cert::build_server_config;
use crate::connection::{read_loop, writer_loop};
use crate::context::TransportContext;
use crate::error::TransportError;
use registry::TransportKind;

#[derive(Debug, Clone)]
pub struct TlsListenerConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub trusted_client_cert_path: Option<PathBuf>,
}

/// Binds and spawns the TLS-over-TCP accept loop (§4.3). A handshake
/// failure closes the socket and records no session; it never tears down
/// the listener.
pub async fn spawn_tls_listener(
    addr: SocketAddr,
    tls_config: TlsListenerConfig,
    ctx: Arc<TransportContext>,
    cancellation: CancellationToken,
) -> Result<JoinHandle<()>, TransportError> {
    let server_config = build_server_config(
        &tls_config.cert_path,
        &tls_config.key_path,
        tls_config.trusted_client_cert_path.as_deref(),
    )?;
    let acceptor = TlsAcceptor::from(Arc::new(server_config));
    let listener = TcpListener::bind(addr).await.map_err(|e| TransportError::Bind(addr, e))?;
    info!(%addr, "tls listener bound");

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => {
                    debug!(%addr, "tls listener stopping");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let acceptor = acceptor.clone();
                        let ctx = ctx.clone();
                        let cancellation = cancellation.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, acceptor, ctx, cancellation).await;
                        });
                    }
                    Err(err) => {
                        warn!(%addr, error = %err, "tls accept error; backing off");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
    }))
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    ctx: Arc<TransportContext>,
    cancellation: CancellationToken,
) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(s) => s,
        Err(err) => {
            warn!(%peer, error = %err, "tls handshake failed; no session recorded");
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let session = ctx.registry.create(TransportKind::Tls, peer, tx);
    let (read_half, write_half) = tokio::io::split(tls_stream);

    let conn_cancellation = cancellation.child_token();
    let writer = tokio::spawn(writer_loop(write_half, rx, conn_cancellation.clone()));

    read_loop(session.clone(), read_half, ctx.clone(), conn_cancellation.clone()).await;

    conn_cancellation.cancel();
    let _ = writer.await;
    ctx.registry.remove(session.id);
}
