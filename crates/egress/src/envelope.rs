use codec::{Message, Priority};
use dispatch::PrioritizedItem;

/// An outgoing message on its way to `target_id` (§3).
///
/// `retry_count` starts at -1, meaning "no retry has happened yet — this
/// is the original send attempt". It is incremented once per failed
/// attempt that gets re-enqueued, so the number of sends a message
/// receives is always `retry_count + 2` at the moment it is parked or
/// dropped (one original send plus the retries already made).
#[derive(Debug, Clone)]
pub struct OutgoingEnvelope {
    pub target_id: u32,
    pub message: Message,
    pub priority: Priority,
    pub retry_count: i32,
}

impl OutgoingEnvelope {
    pub fn first_attempt(target_id: u32, message: Message) -> Self {
        let priority = message.priority();
        OutgoingEnvelope { target_id, message, priority, retry_count: -1 }
    }
}

impl PrioritizedItem for OutgoingEnvelope {
    fn priority(&self) -> Priority {
        self.priority
    }
}
