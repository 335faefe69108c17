//! Dynamically-sized worker pool for one priority class (§4.5).

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use codec::{Message, Priority};
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bounds::{bounds_for, permits_for, WorkerBounds};

/// Anything dispatched through a priority pool must report which priority
/// class it was classified under (§4.5 step 2), so a worker can assert the
/// item actually landed in the pool matching its own priority before
/// invoking the handler, guarding against a classification bug at the
/// `ingress.sender(priority)` call sites upstream.
pub trait PrioritizedItem {
    fn priority(&self) -> Priority;
}

impl PrioritizedItem for (u32, Message) {
    fn priority(&self) -> Priority {
        self.1.priority()
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler did not complete within {0:?}")]
    HandlerTimeout(Duration),
    #[error("handler panicked")]
    HandlerPanicked,
}

/// Per-priority processing timeout (§4.5): High 100ms, Medium 500ms, Low 1s.
pub fn processing_timeout(priority: Priority) -> Duration {
    match priority {
        Priority::High => Duration::from_millis(100),
        Priority::Medium => Duration::from_millis(500),
        Priority::Low => Duration::from_secs(1),
    }
}

/// A boxed unit of work handed to a pool's handler function.
pub type Handler<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// A single priority class's channel, semaphore and worker-count state.
///
/// Concurrency is throttled by holding back semaphore permits rather than
/// spawning and killing worker tasks: `max` worker loops are spawned once,
/// and only `worker_count` of them can be running a handler at any moment
/// because the rest block acquiring a permit. Scaling down "reserves" a
/// permit by acquiring and holding it; scaling up releases a reserved one.
pub struct DispatchPool<T> {
    priority: Priority,
    bounds: WorkerBounds,
    depth_threshold: usize,
    sender: mpsc::UnboundedSender<T>,
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<T>>>,
    semaphore: Arc<Semaphore>,
    reserved: StdMutex<Vec<OwnedSemaphorePermit>>,
    worker_count: AtomicUsize,
}

impl<T: Send + 'static + PrioritizedItem> DispatchPool<T> {
    /// `depth_threshold` is the queue-depth §4.5 scales toward `max` past
    /// (default 100 at the call site).
    pub fn new(priority: Priority, cpu_count: usize, depth_threshold: usize) -> Arc<Self> {
        let bounds = bounds_for(priority, cpu_count);
        let permits = permits_for(priority, cpu_count).max(bounds.max);
        let (sender, receiver) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(permits));

        // Start at `min` concurrency: reserve (permits - min) permits up front.
        let mut reserved = Vec::new();
        for _ in 0..permits.saturating_sub(bounds.min) {
            if let Ok(permit) = semaphore.clone().try_acquire_owned() {
                reserved.push(permit);
            }
        }

        Arc::new(DispatchPool {
            priority,
            bounds,
            depth_threshold,
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
            semaphore,
            reserved: StdMutex::new(reserved),
            worker_count: AtomicUsize::new(bounds.min),
        })
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<T> {
        self.sender.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Relaxed)
    }

    /// Current queue depth, sampled without consuming any item.
    async fn depth(&self) -> usize {
        self.receiver.lock().await.len()
    }

    fn scale_up(&self) {
        let mut reserved = self.reserved.lock().expect("reserved permit lock poisoned");
        if reserved.pop().is_some() && self.worker_count.load(Ordering::Relaxed) < self.bounds.max {
            self.worker_count.fetch_add(1, Ordering::Relaxed);
            debug!(priority = ?self.priority, workers = self.worker_count(), "scaled dispatch pool up");
        }
    }

    fn scale_down(&self) {
        if self.worker_count.load(Ordering::Relaxed) <= self.bounds.min {
            return;
        }
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            self.reserved.lock().expect("reserved permit lock poisoned").push(permit);
            self.worker_count.fetch_sub(1, Ordering::Relaxed);
            debug!(priority = ?self.priority, workers = self.worker_count(), "scaled dispatch pool down");
        }
    }

    /// Spawns the pool's `max` worker loops plus a monitor task that
    /// samples queue depth roughly once a second and scales the active
    /// worker count between `min` and `max`. Returns their join handles.
    pub fn spawn(
        self: &Arc<Self>,
        cancellation: CancellationToken,
        handler: Handler<T>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.bounds.max + 1);

        for _ in 0..self.bounds.max {
            let pool = self.clone();
            let handler = handler.clone();
            let cancellation = cancellation.clone();
            handles.push(tokio::spawn(async move { pool.worker_loop(cancellation, handler).await }));
        }

        let monitor_pool = self.clone();
        let monitor_cancellation = cancellation;
        handles.push(tokio::spawn(async move {
            monitor_pool.monitor_loop(monitor_cancellation).await
        }));

        handles
    }

    async fn worker_loop(self: Arc<Self>, cancellation: CancellationToken, handler: Handler<T>) {
        loop {
            let item = tokio::select! {
                biased;
                () = cancellation.cancelled() => return,
                item = async { self.receiver.lock().await.recv().await } => item,
            };
            let Some(item) = item else { return };

            if item.priority() != self.priority {
                warn!(
                    pool = ?self.priority,
                    item = ?item.priority(),
                    "dispatch item priority does not match its pool; dropping"
                );
                continue;
            }

            let permit = tokio::select! {
                biased;
                () = cancellation.cancelled() => return,
                permit = self.semaphore.clone().acquire_owned() => permit,
            };
            let Ok(_permit) = permit else { return };

            let fut = AssertUnwindSafe(handler(item)).catch_unwind();
            match tokio::time::timeout(processing_timeout(self.priority), fut).await {
                Ok(Ok(())) => {}
                Ok(Err(_panic)) => warn!(priority = ?self.priority, "dispatch handler panicked; worker continues"),
                Err(_elapsed) => warn!(
                    priority = ?self.priority,
                    timeout = ?processing_timeout(self.priority),
                    "dispatch handler timed out"
                ),
            }
        }
    }

    async fn monitor_loop(self: Arc<Self>, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let depth = self.depth().await;
            if depth > self.depth_threshold {
                self.scale_up();
            } else if depth == 0 {
                self.scale_down();
            }
        }
    }
}

/// Test-only item carrying an explicit priority tag, so pool mechanics can
/// be exercised without pulling in a real `(u32, Message)` ingress item.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct TestItem(pub Priority, pub u32);

#[cfg(test)]
impl PrioritizedItem for TestItem {
    fn priority(&self) -> Priority {
        self.0
    }
}
