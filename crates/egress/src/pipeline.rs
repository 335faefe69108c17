//! Egress pipeline (§4.7): three priority channels/pools send outgoing
//! envelopes with per-priority retry, parking exhausted ones in the
//! [`PendingQueue`].

use std::sync::Arc;

use codec::{FrameCodec, Priority};
use dashmap::DashMap;
use dispatch::{Handler, PriorityPools};
use registry::ConnectionRegistry;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::envelope::OutgoingEnvelope;
use crate::pending::PendingQueue;
use crate::retry::policy_for;

pub struct EgressPipeline {
    pools: PriorityPools<OutgoingEnvelope>,
    pending: Arc<PendingQueue>,
    registry: Arc<ConnectionRegistry>,
    codec: Arc<FrameCodec>,
}

impl EgressPipeline {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        codec: Arc<FrameCodec>,
        cpu_count: usize,
        depth_threshold: usize,
        pending_queue_cap: usize,
    ) -> Arc<Self> {
        Arc::new(EgressPipeline {
            pools: PriorityPools::new(cpu_count, depth_threshold),
            pending: Arc::new(PendingQueue::new(pending_queue_cap)),
            registry,
            codec,
        })
    }

    pub fn pending(&self) -> &Arc<PendingQueue> {
        &self.pending
    }

    /// Submits an envelope for its first send attempt.
    pub fn enqueue(&self, envelope: OutgoingEnvelope) {
        let _ = self.pools.sender(envelope.priority).send(envelope);
    }

    /// Spawns the three worker pools, each running the retry/park handler
    /// in [`make_handler`].
    pub fn spawn(self: &Arc<Self>, cancellation: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        for priority in Priority::ALL {
            let pool = self.pools.pool(priority).clone();
            let handler = make_handler(
                priority,
                self.registry.clone(),
                self.codec.clone(),
                self.pending.clone(),
                pool.sender(),
                cancellation.clone(),
            );
            handles.extend(pool.spawn(cancellation.clone(), handler));
        }
        handles
    }

    /// Resubmits every envelope parked for `target_id`, in FIFO order,
    /// after that peer reconnects.
    pub fn drain_pending_for(&self, target_id: u32) {
        for envelope in self.pending.drain(target_id) {
            self.enqueue(envelope);
        }
    }
}

fn make_handler(
    priority: Priority,
    registry: Arc<ConnectionRegistry>,
    codec: Arc<FrameCodec>,
    pending: Arc<PendingQueue>,
    sender: tokio::sync::mpsc::UnboundedSender<OutgoingEnvelope>,
    cancellation: CancellationToken,
) -> Handler<OutgoingEnvelope> {
    let policy = policy_for(priority);
    Arc::new(move |envelope: OutgoingEnvelope| {
        let registry = registry.clone();
        let codec = codec.clone();
        let pending = pending.clone();
        let sender = sender.clone();
        let cancellation = cancellation.clone();
        Box::pin(async move { attempt_send(envelope, registry, codec, pending, policy, sender, cancellation).await })
    })
}

async fn attempt_send(
    envelope: OutgoingEnvelope,
    registry: Arc<ConnectionRegistry>,
    codec: Arc<FrameCodec>,
    pending: Arc<PendingQueue>,
    policy: crate::retry::RetryPolicy,
    sender: tokio::sync::mpsc::UnboundedSender<OutgoingEnvelope>,
    cancellation: CancellationToken,
) {
    let Some(session) = registry.get(envelope.target_id) else {
        return retry_or_park(envelope, pending, policy, sender, cancellation).await;
    };

    let encoded = match codec.encode(&envelope.message) {
        Ok(bytes) => bytes,
        Err(err) => {
            // SerializationError is a deterministic failure (§7): drop, never retry.
            warn!(target_id = envelope.target_id, error = %err, "dropping envelope: serialization failed");
            return;
        }
    };
    let len = encoded.len() as u64;

    if session.sink.send(encoded).is_ok() {
        session.add_bytes_out(len);
        return;
    }

    retry_or_park(envelope, pending, policy, sender, cancellation).await;
}

async fn retry_or_park(
    mut envelope: OutgoingEnvelope,
    pending: Arc<PendingQueue>,
    policy: crate::retry::RetryPolicy,
    sender: tokio::sync::mpsc::UnboundedSender<OutgoingEnvelope>,
    cancellation: CancellationToken,
) {
    if envelope.message.is_terminal() {
        // Terminal kinds (e.g. the file-complete marker) are never retried (§4.7 step 3).
        warn!(target_id = envelope.target_id, "terminal message undeliverable; dropping without retry");
        return;
    }

    let new_retry_count = envelope.retry_count + 1;
    if new_retry_count >= policy.max_retries {
        pending.push(envelope.target_id, envelope);
        return;
    }
    envelope.retry_count = new_retry_count;

    tokio::select! {
        biased;
        () = cancellation.cancelled() => {
            // Cancellation during the retry sleep is an expected outcome;
            // the envelope is parked rather than lost.
            pending.push(envelope.target_id, envelope);
        }
        () = tokio::time::sleep(policy.interval) => {
            let _ = sender.send(envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use codec::{Fletcher16, FrameCodecConfig, JsonSerializer, Priority};
    use registry::TransportKind;
    use std::time::Duration;

    fn normal_message(target_id: u32) -> codec::Message {
        codec::Message::ClientToClientNormal {
            priority: Priority::High,
            seq_num: 1,
            source_id: 1,
            target_id,
            message: Some("hi".into()),
            bytes: None,
        }
    }

    #[tokio::test]
    async fn a_message_with_no_target_session_is_parked_after_one_retry() {
        let pending = Arc::new(PendingQueue::new(10));
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();
        let fast_policy = RetryPolicy { max_retries: 1, interval: Duration::from_millis(5) };

        let envelope = OutgoingEnvelope::first_attempt(7, normal_message(7));
        retry_or_park(envelope, pending.clone(), fast_policy, sender.clone(), cancellation.clone()).await;

        // retry_count -1 -> 0, below max_retries(1): resent onto the channel.
        let resent = receiver.recv().await.expect("requeued for one retry");
        assert_eq!(resent.retry_count, 0);

        retry_or_park(resent, pending.clone(), fast_policy, sender, cancellation).await;
        // retry_count 0 -> 1, reaches max_retries(1): parked, not requeued.
        assert_eq!(pending.len(7), 1);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancellation_during_the_retry_sleep_parks_instead_of_requeuing() {
        let pending = Arc::new(PendingQueue::new(10));
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();
        let slow_policy = RetryPolicy { max_retries: 5, interval: Duration::from_secs(30) };
        let envelope = OutgoingEnvelope::first_attempt(3, normal_message(3));

        cancellation.cancel();
        retry_or_park(envelope, pending.clone(), slow_policy, sender, cancellation).await;

        assert_eq!(pending.len(3), 1);
    }

    #[tokio::test]
    async fn terminal_messages_are_dropped_rather_than_retried() {
        let pending = Arc::new(PendingQueue::new(10));
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();
        let policy = RetryPolicy { max_retries: 5, interval: Duration::from_millis(5) };
        let envelope = OutgoingEnvelope::first_attempt(
            1,
            codec::Message::FileCompleteStCommand { source_id: 1, target_id: 1, transfer_id: 9, message: "FILE_COMPLETE".into() },
        );

        retry_or_park(envelope, pending.clone(), policy, sender, cancellation).await;
        assert_eq!(pending.len(1), 0);
    }

    #[tokio::test]
    async fn attempt_send_delivers_immediately_to_an_online_session() {
        let registry = Arc::new(ConnectionRegistry::new());
        let codec = Arc::new(FrameCodec::new(
            FrameCodecConfig::default(),
            Box::new(JsonSerializer),
            Box::new(Fletcher16),
            None,
        ));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session = registry.create(TransportKind::Tcp, "127.0.0.1:7000".parse().unwrap(), tx);
        let pending = Arc::new(PendingQueue::new(10));
        let (sender, _r) = tokio::sync::mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();
        let policy = RetryPolicy { max_retries: 5, interval: Duration::from_millis(5) };

        let envelope = OutgoingEnvelope::first_attempt(session.id, normal_message(session.id));
        attempt_send(envelope, registry.clone(), codec, pending.clone(), policy, sender, cancellation).await;

        assert!(rx.try_recv().is_ok(), "a frame should have been written to the session sink");
        assert_eq!(pending.len(session.id), 0);
    }
}
