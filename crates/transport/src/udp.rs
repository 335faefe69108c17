//! UDP listener (§4.3, §9 Open Question): each distinct peer address is a
//! long-lived session, reaped by the same heartbeat monitor as stream
//! transports — there is no per-datagram connection teardown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use registry::{Session, TransportKind};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::TransportContext;
use crate::error::TransportError;

const RECV_BUF_SIZE: usize = 65_536;

pub async fn spawn_udp_listener(
    addr: SocketAddr,
    ctx: Arc<TransportContext>,
    cancellation: CancellationToken,
) -> Result<JoinHandle<()>, TransportError> {
    let socket = Arc::new(UdpSocket::bind(addr).await.map_err(|e| TransportError::Bind(addr, e))?);
    info!(%addr, "udp listener bound");

    let sessions: Arc<DashMap<SocketAddr, Arc<Session>>> = Arc::new(DashMap::new());

    Ok(tokio::spawn(async move {
        let mut buf = vec![0u8; RECV_BUF_SIZE];
        loop {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => {
                    debug!(%addr, "udp listener stopping");
                    return;
                }
                received = socket.recv_from(&mut buf) => match received {
                    Ok((n, peer)) => {
                        handle_datagram(
                            &buf[..n],
                            peer,
                            &socket,
                            &sessions,
                            &ctx,
                            &cancellation,
                        ).await;
                    }
                    Err(err) => {
                        warn!(%addr, error = %err, "udp recv error; backing off");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
    }))
}

async fn handle_datagram(
    datagram: &[u8],
    peer: SocketAddr,
    socket: &Arc<UdpSocket>,
    sessions: &Arc<DashMap<SocketAddr, Arc<Session>>>,
    ctx: &Arc<TransportContext>,
    cancellation: &CancellationToken,
) {
    let session = match sessions.get(&peer) {
        Some(existing) => existing.clone(),
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            let session = ctx.registry.create(TransportKind::Udp, peer, tx);
            sessions.insert(peer, session.clone());
            tokio::spawn(udp_writer_loop(socket.clone(), peer, rx, cancellation.clone()));
            session
        }
    };

    let mut cursor = std::io::Cursor::new(datagram.to_vec());
    match ctx.codec.decode_with_len(&mut cursor).await {
        Ok((message, frame_len)) => {
            session.touch_activity();
            session.add_bytes_in(frame_len);
            let priority = message.priority();
            if ctx.ingress.sender(priority).send((session.id, message)).is_err() {
                warn!(session_id = session.id, "ingress pool is gone; dropping datagram");
            }
        }
        Err((err, consumed)) => {
            session.add_bytes_in(consumed);
            warn!(%peer, session_id = session.id, error = %err, "udp frame decode error; terminating session");
            sessions.remove(&peer);
            ctx.registry.remove(session.id);
        }
    }
}

async fn udp_writer_loop(
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    cancellation: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = cancellation.cancelled() => return,
            item = rx.recv() => item,
        };
        let Some(bytes) = item else { return };
        if let Err(err) = socket.send_to(&bytes, peer).await {
            warn!(%peer, error = %err, "udp send failed");
            return;
        }
    }
}
