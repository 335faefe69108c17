//! Priority-classified dispatch: three channels, three dynamically-sized
//! worker pools (§4.4, §4.5).

mod bounds;
mod pool;

pub use bounds::{bounds_for, detected_cpu_count, permits_for, WorkerBounds};
pub use pool::{processing_timeout, DispatchError, DispatchPool, Handler, PrioritizedItem};

use std::sync::Arc;

use codec::Priority;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Default queue-depth threshold a pool scales toward `max` past (§4.5).
pub const DEFAULT_DEPTH_THRESHOLD: usize = 100;

/// The three priority-keyed pools that together form either the ingress
/// dispatch stage (§4.5) or the egress send stage (§4.7) — both share this
/// shape, only the item type and handler differ.
pub struct PriorityPools<T> {
    pub high: Arc<DispatchPool<T>>,
    pub medium: Arc<DispatchPool<T>>,
    pub low: Arc<DispatchPool<T>>,
}

impl<T: Send + 'static + PrioritizedItem> PriorityPools<T> {
    pub fn new(cpu_count: usize, depth_threshold: usize) -> Self {
        PriorityPools {
            high: DispatchPool::new(Priority::High, cpu_count, depth_threshold),
            medium: DispatchPool::new(Priority::Medium, cpu_count, depth_threshold),
            low: DispatchPool::new(Priority::Low, cpu_count, depth_threshold),
        }
    }

    pub fn pool(&self, priority: Priority) -> &Arc<DispatchPool<T>> {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    pub fn sender(&self, priority: Priority) -> UnboundedSender<T> {
        self.pool(priority).sender()
    }

    /// Spawns every pool's worker loops and monitor task under the same
    /// handler. When each priority needs its own handler closure (egress
    /// does, for its per-priority retry policy), spawn each
    /// [`Self::pool`] individually instead.
    pub fn spawn(&self, cancellation: CancellationToken, handler: Handler<T>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = self.high.spawn(cancellation.clone(), handler.clone());
        handles.extend(self.medium.spawn(cancellation.clone(), handler.clone()));
        handles.extend(self.low.spawn(cancellation, handler));
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn each_priority_pool_drains_independently() {
        use crate::pool::TestItem;

        let pools = PriorityPools::<TestItem>::new(4, DEFAULT_DEPTH_THRESHOLD);
        let total = Arc::new(AtomicUsize::new(0));
        let total_clone = total.clone();
        let handler: Handler<TestItem> = Arc::new(move |_item| {
            let total = total_clone.clone();
            Box::pin(async move {
                total.fetch_add(1, Ordering::Relaxed);
            })
        });
        let cancellation = CancellationToken::new();
        let handles = pools.spawn(cancellation.clone(), handler);

        pools.sender(Priority::High).send(TestItem(Priority::High, 1)).unwrap();
        pools.sender(Priority::Medium).send(TestItem(Priority::Medium, 2)).unwrap();
        pools.sender(Priority::Low).send(TestItem(Priority::Low, 3)).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(total.load(Ordering::Relaxed), 3);

        cancellation.cancel();
        for h in handles {
            let _ = h.await;
        }
    }
}
