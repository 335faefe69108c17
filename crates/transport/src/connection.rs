//! Reader/writer loop shared by the stream-oriented listeners (TCP, TLS).
//!
//! A session has one reader task (decode-classify-publish) and one writer
//! task (drain the session's outbound channel), mirroring the split most
//! stream transports already offer between a read half and a write half.

use std::sync::Arc;

use codec::FrameError;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::TransportContext;
use registry::Session;

pub async fn writer_loop<W>(mut write_half: W, mut rx: mpsc::UnboundedReceiver<Vec<u8>>, cancellation: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let item = tokio::select! {
            biased;
            () = cancellation.cancelled() => return,
            item = rx.recv() => item,
        };
        let Some(bytes) = item else { return };
        if write_half.write_all(&bytes).await.is_err() {
            return;
        }
        if write_half.flush().await.is_err() {
            return;
        }
    }
}

pub async fn read_loop<R>(
    session: Arc<Session>,
    mut read_half: R,
    ctx: Arc<TransportContext>,
    cancellation: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let result = tokio::select! {
            biased;
            () = cancellation.cancelled() => return,
            result = ctx.codec.decode_with_len(&mut read_half) => result,
        };
        match result {
            Ok((message, frame_len)) => {
                session.touch_activity();
                session.add_bytes_in(frame_len);
                let priority = message.priority();
                if ctx.ingress.sender(priority).send((session.id, message)).is_err() {
                    warn!(session_id = session.id, "ingress pool is gone; dropping message");
                    return;
                }
            }
            Err((FrameError::TransportClosed, _consumed)) => {
                debug!(session_id = session.id, "session closed cleanly");
                return;
            }
            Err((err, consumed)) => {
                session.add_bytes_in(consumed);
                warn!(session_id = session.id, error = %err, "frame decode error; terminating session");
                return;
            }
        }
    }
}
