//! Message router (§4.6): branches decoded messages to an ack, a peer
//! relay, or the file transfer engine.

mod context;
mod handler;

pub use context::{IngressItem, RouterContext};
pub use handler::build_handler;

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use codec::{Message, Priority};
    use egress::EgressPipeline;
    use filetransfer::FileTransferEngine;
    use registry::{ConnectionRegistry, TransportKind};
    use tokio::sync::mpsc;

    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9100".parse().unwrap()
    }

    fn test_codec() -> Arc<codec::FrameCodec> {
        Arc::new(codec::FrameCodec::new(
            codec::FrameCodecConfig::default(),
            Box::new(codec::JsonSerializer),
            Box::new(codec::Fletcher16),
            None,
        ))
    }

    fn test_ctx(registry: Arc<ConnectionRegistry>) -> Arc<RouterContext> {
        let egress = EgressPipeline::new(registry.clone(), test_codec(), 4, dispatch::DEFAULT_DEPTH_THRESHOLD, 100);
        let file_transfer = FileTransferEngine::new(std::env::temp_dir());
        RouterContext::new(registry, egress, file_transfer)
    }

    async fn wait_for_frame(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>, codec: &codec::FrameCodec) -> Message {
        let bytes = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("reply within deadline")
            .expect("sink not closed");
        let mut cursor = std::io::Cursor::new(bytes);
        codec.decode(&mut cursor).await.expect("a valid frame")
    }

    #[tokio::test]
    async fn heartbeat_is_acked_with_the_same_seq_and_updates_last_heartbeat() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = registry.create(TransportKind::Tcp, test_addr(), tx);
        let ctx = test_ctx(registry.clone());
        let handler = build_handler(ctx);

        let heartbeat = Message::Heartbeat { priority: Priority::High, seq_num: 7, ack_num: 0, source_id: session.id, message: None };
        handler((session.id, heartbeat)).await;

        let reply = wait_for_frame(&mut rx, &test_codec()).await;
        match reply {
            Message::Heartbeat { ack_num, message, .. } => {
                assert_eq!(ack_num, 7);
                assert_eq!(message, Some("ACK".to_string()));
            }
            other => panic!("expected a Heartbeat ack, got {other:?}"),
        }
        assert!(session.last_activity_elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn normal_message_is_acked() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = registry.create(TransportKind::Tcp, test_addr(), tx);
        let ctx = test_ctx(registry.clone());
        let handler = build_handler(ctx);

        let normal =
            Message::NormalClientToServer { priority: Priority::Medium, seq_num: 3, source_id: session.id, message: None, bytes: None };
        handler((session.id, normal)).await;

        let reply = wait_for_frame(&mut rx, &test_codec()).await;
        assert!(matches!(reply, Message::Ack { ack_num: 3, .. }));
    }

    #[tokio::test]
    async fn relay_to_an_online_peer_is_delivered_immediately() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (sender_tx, _sender_rx) = mpsc::unbounded_channel();
        let sender_session = registry.create(TransportKind::Tcp, test_addr(), sender_tx);
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
        let peer_session = registry.create(TransportKind::Tcp, test_addr(), peer_tx);
        let ctx = test_ctx(registry.clone());
        let handler = build_handler(ctx);

        let relay = Message::ClientToClientNormal {
            priority: Priority::High,
            seq_num: 1,
            source_id: sender_session.id,
            target_id: peer_session.id,
            message: Some("hi".to_string()),
            bytes: None,
        };
        handler((sender_session.id, relay)).await;

        let reply = wait_for_frame(&mut peer_rx, &test_codec()).await;
        assert!(matches!(reply, Message::ClientToClientNormal { .. }));
    }

    #[tokio::test]
    async fn relay_to_an_offline_peer_is_parked_in_the_pending_queue() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (sender_tx, _sender_rx) = mpsc::unbounded_channel();
        let sender_session = registry.create(TransportKind::Tcp, test_addr(), sender_tx);
        let ctx = test_ctx(registry.clone());
        let handler = build_handler(ctx.clone());

        let offline_target = 999_999;
        let relay = Message::ClientToClientNormal {
            priority: Priority::High,
            seq_num: 1,
            source_id: sender_session.id,
            target_id: offline_target,
            message: Some("hi".to_string()),
            bytes: None,
        };
        handler((sender_session.id, relay)).await;

        assert_eq!(ctx.egress.pending().len(offline_target), 1);
    }

    #[tokio::test]
    async fn a_single_chunk_transfer_completes_and_fires_the_completion_marker() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = registry.create(TransportKind::Tcp, test_addr(), tx);
        let ctx = test_ctx(registry.clone());
        let handler = build_handler(ctx);

        let bytes = b"chunk-one".to_vec();
        let chunk_hash = sha2_hex(&bytes);
        let whole_hash = sha2_hex(&bytes);
        let chunk = Message::FileChunkClientToServer {
            priority: Priority::Low,
            seq_num: 1,
            source_id: session.id,
            transfer_id: 42,
            chunk_index: 0,
            total_chunks: 1,
            chunk_hash,
            file_hash: Some(whole_hash),
            file_name: Some("router-test-transfer.bin".to_string()),
            file_size: Some(bytes.len() as u64),
            bytes,
        };
        handler((session.id, chunk)).await;

        let reply = wait_for_frame(&mut rx, &test_codec()).await;
        assert!(matches!(reply, Message::FileCompleteStCommand { .. }));
    }

    fn sha2_hex(bytes: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
    }
}
