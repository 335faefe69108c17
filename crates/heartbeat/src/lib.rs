//! Heartbeat monitor (§4.9): reaps sessions that have gone quiet for
//! longer than `liveness_timeout`, without blocking accept or dispatch.

use std::sync::Arc;
use std::time::Duration;

use registry::ConnectionRegistry;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub liveness_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig { interval: DEFAULT_HEARTBEAT_INTERVAL, liveness_timeout: DEFAULT_LIVENESS_TIMEOUT }
    }
}

/// Spawns the sweep loop. Each tick walks `registry.snapshot_live()` once;
/// disconnecting a stale session only touches the registry, never blocks
/// on transport I/O.
pub fn spawn(registry: Arc<ConnectionRegistry>, config: HeartbeatConfig, cancellation: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => break,
                _ = ticker.tick() => sweep(&registry, config.liveness_timeout),
            }
        }
    })
}

fn sweep(registry: &ConnectionRegistry, liveness_timeout: Duration) {
    for session in registry.snapshot_live() {
        if session.last_activity_elapsed() > liveness_timeout {
            info!(session_id = session.id, "heartbeat timeout; disconnecting session");
            registry.remove(session.id);
        }
    }
}
