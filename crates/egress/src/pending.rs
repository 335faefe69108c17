//! Per-target buffer of undelivered envelopes (§3, §9 Open Question: bounded
//! per target, oldest entry dropped and logged on overflow).

use std::collections::VecDeque;

use dashmap::DashMap;
use tracing::warn;

use crate::envelope::OutgoingEnvelope;

pub struct PendingQueue {
    queues: DashMap<u32, VecDeque<OutgoingEnvelope>>,
    cap: usize,
}

impl PendingQueue {
    pub fn new(cap: usize) -> Self {
        PendingQueue { queues: DashMap::new(), cap }
    }

    /// Appends `envelope` to `target_id`'s FIFO, dropping the oldest entry
    /// (and logging it) if the queue is already at capacity.
    pub fn push(&self, target_id: u32, envelope: OutgoingEnvelope) {
        let mut queue = self.queues.entry(target_id).or_default();
        if queue.len() >= self.cap {
            if let Some(dropped) = queue.pop_front() {
                warn!(
                    target_id,
                    cap = self.cap,
                    kind = dropped.message.kind_name(),
                    "pending queue at capacity; dropping oldest envelope"
                );
            }
        }
        queue.push_back(envelope);
    }

    /// Drains every envelope queued for `target_id`, in FIFO order, for
    /// redelivery once that peer reconnects.
    pub fn drain(&self, target_id: u32) -> Vec<OutgoingEnvelope> {
        match self.queues.remove(&target_id) {
            Some((_, queue)) => queue.into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self, target_id: u32) -> usize {
        self.queues.get(&target_id).map(|q| q.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{Message, Priority};

    fn envelope(source: u32) -> OutgoingEnvelope {
        OutgoingEnvelope::first_attempt(
            99,
            Message::NormalClientToServer {
                priority: Priority::Low,
                seq_num: source as u64,
                source_id: source,
                message: None,
                bytes: None,
            },
        )
    }

    #[test]
    fn fifo_order_is_preserved_across_push_and_drain() {
        let queue = PendingQueue::new(10);
        queue.push(99, envelope(1));
        queue.push(99, envelope(2));
        queue.push(99, envelope(3));
        let drained = queue.drain(99);
        let seqs: Vec<u64> = drained
            .into_iter()
            .map(|e| match e.message {
                Message::NormalClientToServer { seq_num, .. } => seq_num,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn overflow_drops_the_oldest_entry() {
        let queue = PendingQueue::new(2);
        queue.push(99, envelope(1));
        queue.push(99, envelope(2));
        queue.push(99, envelope(3));
        let drained = queue.drain(99);
        assert_eq!(drained.len(), 2);
        let seqs: Vec<u64> = drained
            .into_iter()
            .map(|e| match e.message {
                Message::NormalClientToServer { seq_num, .. } => seq_num,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(seqs, vec![2, 3], "the oldest entry (seq 1) must be the one dropped");
    }

    #[test]
    fn draining_an_unknown_target_returns_empty() {
        let queue = PendingQueue::new(10);
        assert!(queue.drain(42).is_empty());
        assert_eq!(queue.len(42), 0);
    }
}
