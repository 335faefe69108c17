//! Branches a decoded message to its handler (§4.6).

use std::sync::Arc;

use codec::Message;
use dispatch::Handler;
use egress::OutgoingEnvelope;
use filetransfer::{ChunkInput, ChunkOutcome};
use tracing::{debug, warn};

use crate::context::{IngressItem, RouterContext};

pub fn build_handler(ctx: Arc<RouterContext>) -> Handler<IngressItem> {
    Arc::new(move |(session_id, message): IngressItem| {
        let ctx = ctx.clone();
        Box::pin(async move { route(session_id, message, &ctx).await })
    })
}

async fn route(session_id: u32, message: Message, ctx: &RouterContext) {
    match message {
        Message::Heartbeat { seq_num, source_id, priority, .. } => {
            if let Some(session) = ctx.registry.get(session_id) {
                session.touch_heartbeat();
            }
            let ack = Message::Heartbeat {
                priority,
                seq_num,
                ack_num: seq_num,
                source_id,
                message: Some("ACK".to_string()),
            };
            ctx.egress.enqueue(OutgoingEnvelope::first_attempt(session_id, ack));
        }

        Message::NormalClientToServer { seq_num, source_id, priority, .. } => {
            let ack = Message::Ack { priority, seq_num, ack_num: seq_num, source_id, message: Some("ACK".to_string()) };
            ctx.egress.enqueue(OutgoingEnvelope::first_attempt(session_id, ack));
        }

        Message::ClientToClientNormal { target_id, .. } | Message::ClientToClientFile { target_id, .. } => {
            relay_to_peer(target_id, message, ctx);
        }

        Message::FileChunkClientToServer {
            seq_num,
            source_id,
            priority,
            transfer_id,
            chunk_index,
            total_chunks,
            chunk_hash,
            file_hash,
            file_name,
            bytes,
            ..
        } => {
            let outcome = ctx
                .file_transfer
                .handle_chunk(ChunkInput { transfer_id, chunk_index, total_chunks, chunk_hash, file_hash, file_name, bytes })
                .await;

            match outcome {
                Ok(ChunkOutcome::Acked) => {
                    let ack = Message::Ack { priority, seq_num, ack_num: chunk_index as u64, source_id, message: Some("ACK".to_string()) };
                    ctx.egress.enqueue(OutgoingEnvelope::first_attempt(session_id, ack));
                }
                Ok(ChunkOutcome::Nacked) => {
                    let nack =
                        Message::Ack { priority, seq_num, ack_num: chunk_index as u64, source_id, message: Some("NACK".to_string()) };
                    ctx.egress.enqueue(OutgoingEnvelope::first_attempt(session_id, nack));
                }
                Ok(ChunkOutcome::Completed { destination_path }) => {
                    debug!(transfer_id, path = %destination_path.display(), "file transfer complete");
                    let complete = Message::FileCompleteStCommand {
                        source_id,
                        target_id: source_id,
                        transfer_id,
                        message: "FILE_COMPLETE".to_string(),
                    };
                    ctx.egress.enqueue(OutgoingEnvelope::first_attempt(session_id, complete));
                }
                Ok(ChunkOutcome::Aborted { reason }) => {
                    warn!(transfer_id, reason, "file transfer aborted");
                    let aborted = Message::Ack {
                        priority,
                        seq_num,
                        ack_num: chunk_index as u64,
                        source_id,
                        message: Some(format!("ABORTED: {reason}")),
                    };
                    ctx.egress.enqueue(OutgoingEnvelope::first_attempt(session_id, aborted));
                }
                Err(err) => {
                    warn!(transfer_id, error = %err, "file transfer engine error");
                }
            }
        }

        Message::Ack { seq_num, ack_num, .. } => {
            debug!(session_id, seq_num, ack_num, "received ack");
        }

        Message::FileCompleteStCommand { .. } => {
            // Clients don't send this kind; the router only ever emits it.
            warn!(session_id, "ignoring unexpected client-sent file-complete marker");
        }
    }

    // A parked envelope can only have been queued while this exact session
    // id was already registered (ids are never reused), so observing any
    // routable traffic on it is the right moment to retry delivery.
    ctx.egress.drain_pending_for(session_id);
}

fn relay_to_peer(target_id: u32, message: Message, ctx: &RouterContext) {
    let envelope = OutgoingEnvelope::first_attempt(target_id, message);
    if ctx.registry.get(target_id).is_some() {
        ctx.egress.enqueue(envelope);
    } else {
        ctx.egress.pending().push(target_id, envelope);
    }
}
