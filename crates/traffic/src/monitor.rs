//! Periodic traffic sampler (§4.10): per-session deltas, global totals,
//! a runtime enable/disable switch, and calendar-day cache rollover.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use registry::{ConnectionRegistry, SessionSnapshot};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::sample::{SessionDelta, TrafficSample};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

pub struct TrafficMonitor {
    registry: Arc<ConnectionRegistry>,
    previous: DashMap<u32, SessionSnapshot>,
    enabled: AtomicBool,
    last_rollover_day: AtomicU64,
    latest: watch::Sender<TrafficSample>,
}

impl TrafficMonitor {
    /// Returns the monitor plus a receiver that observes every sample as
    /// it's produced (e.g. for an admin/status endpoint to subscribe to).
    /// Starts disabled (§6: `enable_traffic_monitor` defaults to false);
    /// call [`Self::enable`] to turn sampling on.
    pub fn new(registry: Arc<ConnectionRegistry>) -> (Arc<Self>, watch::Receiver<TrafficSample>) {
        let (latest, rx) = watch::channel(TrafficSample::default());
        let monitor = Arc::new(TrafficMonitor {
            registry,
            previous: DashMap::new(),
            enabled: AtomicBool::new(false),
            last_rollover_day: AtomicU64::new(current_day()),
            latest,
        });
        (monitor, rx)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn spawn(self: &Arc<Self>, interval: Duration, cancellation: CancellationToken) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancellation.cancelled() => break,
                    _ = ticker.tick() => {
                        if monitor.is_enabled() {
                            let sample = monitor.sample();
                            debug!(sessions = sample.sessions.len(), bytes_in = sample.totals.bytes_in, "traffic sample");
                            let _ = monitor.latest.send(sample);
                        }
                    }
                }
            }
        })
    }

    /// Takes one sample: rolls the previous-sample cache over on a
    /// calendar-day boundary, then diffs every live session against its
    /// cached previous snapshot.
    pub fn sample(&self) -> TrafficSample {
        let today = current_day();
        if self.last_rollover_day.swap(today, Ordering::Relaxed) != today {
            self.previous.clear();
        }

        let deltas: Vec<SessionDelta> = self
            .registry
            .snapshot_live()
            .into_iter()
            .map(|session| {
                let current = session.snapshot();
                let delta = SessionDelta::between(self.previous.get(&current.id).as_deref(), &current);
                self.previous.insert(current.id, current);
                delta
            })
            .collect();

        TrafficSample::from_deltas(deltas)
    }
}

fn current_day() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() / 86_400
}
