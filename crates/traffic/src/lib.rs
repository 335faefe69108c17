mod monitor;
mod sample;

pub use monitor::{TrafficMonitor, DEFAULT_SAMPLE_INTERVAL};
pub use sample::{GlobalTotals, SessionDelta, TrafficSample};

#[cfg(test)]
mod tests {
    use super::*;
    use registry::{ConnectionRegistry, TransportKind};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn addr() -> std::net::SocketAddr {
        "127.0.0.1:9300".parse().unwrap()
    }

    #[tokio::test]
    async fn a_fresh_session_reports_its_full_counters_as_the_first_delta() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let session = registry.create(TransportKind::Tcp, addr(), tx);
        session.add_bytes_in(100);
        let (monitor, _watch) = TrafficMonitor::new(registry);

        let sample = monitor.sample();
        assert_eq!(sample.totals.bytes_in, 100);
        assert_eq!(sample.sessions.len(), 1);
    }

    #[tokio::test]
    async fn a_second_sample_reports_only_the_bytes_added_since_the_first() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let session = registry.create(TransportKind::Tcp, addr(), tx);
        session.add_bytes_in(100);
        let (monitor, _watch) = TrafficMonitor::new(registry);
        monitor.sample();

        session.add_bytes_in(50);
        let second = monitor.sample();
        assert_eq!(second.totals.bytes_in, 50);
    }

    #[tokio::test]
    async fn disabling_the_monitor_suspends_the_periodic_sample() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (monitor, watch) = TrafficMonitor::new(registry);
        monitor.disable();
        let cancellation = CancellationToken::new();
        let handle = monitor.spawn(Duration::from_millis(10), cancellation.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!watch.has_changed().unwrap_or(false));

        cancellation.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn enabling_the_monitor_resumes_periodic_samples() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (monitor, mut watch) = TrafficMonitor::new(registry);
        monitor.enable();
        let cancellation = CancellationToken::new();
        let handle = monitor.spawn(Duration::from_millis(10), cancellation.clone());

        tokio::time::timeout(Duration::from_millis(500), watch.changed()).await.expect("a sample arrives").unwrap();

        cancellation.cancel();
        let _ = handle.await;
    }
}
