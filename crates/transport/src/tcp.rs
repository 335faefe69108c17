use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{read_loop, writer_loop};
use crate::context::TransportContext;
use crate::error::TransportError;
use registry::TransportKind;

/// Binds and spawns the TCP accept loop (§4.3). The returned handle runs
/// until `cancellation` fires; the caller awaits it to implement `stop()`.
pub async fn spawn_tcp_listener(
    addr: SocketAddr,
    ctx: Arc<TransportContext>,
    cancellation: CancellationToken,
) -> Result<JoinHandle<()>, TransportError> {
    let listener = TcpListener::bind(addr).await.map_err(|e| TransportError::Bind(addr, e))?;
    info!(%addr, "tcp listener bound");

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => {
                    debug!(%addr, "tcp listener stopping");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let ctx = ctx.clone();
                        let cancellation = cancellation.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, ctx, cancellation).await;
                        });
                    }
                    Err(err) => {
                        warn!(%addr, error = %err, "tcp accept error; backing off");
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
    ctx: Arc<TransportContext>,
    cancellation: CancellationToken,
) {
    let _ = stream.set_nodelay(true);
    let (tx, rx) = mpsc::unbounded_channel();
    let session = ctx.registry.create(TransportKind::Tcp, peer, tx);
    let (read_half, write_half) = stream.into_split();

    let conn_cancellation = cancellation.child_token();
    let writer = tokio::spawn(writer_loop(write_half, rx, conn_cancellation.clone()));

    read_loop(session.clone(), read_half, ctx.clone(), conn_cancellation.clone()).await;

    conn_cancellation.cancel();
    let _ = writer.await;
    ctx.registry.remove(session.id);
}
