//! Session record (§3) and its atomic counters.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    Tls,
    Udp,
    Http,
}

/// A live, server-side record of one connected client.
///
/// Outbound bytes are handed to the session through `sink`, an unbounded
/// channel drained by that session's own writer task — this decouples the
/// registry and the egress pipeline from the concrete transport (TCP
/// stream half, TLS stream half, or a UDP socket + destination address).
pub struct Session {
    pub id: u32,
    pub transport: TransportKind,
    pub remote_addr: SocketAddr,
    pub sink: UnboundedSender<Vec<u8>>,
    pub connected_at: Instant,
    last_heartbeat_ms: AtomicU64,
    last_activity_ms: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    file_bytes_in: AtomicU64,
    file_bytes_out: AtomicU64,
    send_count: AtomicU64,
    recv_count: AtomicU64,
    connected: AtomicBool,
}

impl Session {
    pub fn new(id: u32, transport: TransportKind, remote_addr: SocketAddr, sink: UnboundedSender<Vec<u8>>) -> Self {
        let now = elapsed_ms(Instant::now());
        Session {
            id,
            transport,
            remote_addr,
            sink,
            connected_at: Instant::now(),
            last_heartbeat_ms: AtomicU64::new(now),
            last_activity_ms: AtomicU64::new(now),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            file_bytes_in: AtomicU64::new(0),
            file_bytes_out: AtomicU64::new(0),
            send_count: AtomicU64::new(0),
            recv_count: AtomicU64::new(0),
            connected: AtomicBool::new(true),
        }
    }

    pub fn touch_activity(&self) {
        self.last_activity_ms.store(elapsed_ms(Instant::now()), Ordering::Relaxed);
    }

    pub fn touch_heartbeat(&self) {
        let now = elapsed_ms(Instant::now());
        self.last_heartbeat_ms.store(now, Ordering::Relaxed);
        self.last_activity_ms.store(now, Ordering::Relaxed);
    }

    pub fn last_activity_elapsed(&self) -> std::time::Duration {
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        let now = elapsed_ms(Instant::now());
        std::time::Duration::from_millis(now.saturating_sub(last))
    }

    pub fn add_bytes_in(&self, n: u64) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
        self.recv_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, n: u64) {
        self.bytes_out.fetch_add(n, Ordering::Relaxed);
        self.send_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_file_bytes_in(&self, n: u64) {
        self.file_bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_file_bytes_out(&self, n: u64) {
        self.file_bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            transport: self.transport,
            remote_addr: self.remote_addr,
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            file_bytes_in: self.file_bytes_in.load(Ordering::Relaxed),
            file_bytes_out: self.file_bytes_out.load(Ordering::Relaxed),
            send_count: self.send_count.load(Ordering::Relaxed),
            recv_count: self.recv_count.load(Ordering::Relaxed),
        }
    }
}

fn elapsed_ms(instant: Instant) -> u64 {
    // Relative to the process start, not wall-clock; sufficient for
    // liveness-window comparisons and monotonic under clock adjustments.
    instant.duration_since(process_start()).as_millis() as u64
}

fn process_start() -> Instant {
    static PROCESS_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    *PROCESS_START.get_or_init(Instant::now)
}

/// Immutable point-in-time copy of a session's counters, moved into the
/// history table on disconnect (§3: "a snapshot is moved to the history table").
#[derive(Debug, Clone, Copy)]
pub struct SessionSnapshot {
    pub id: u32,
    pub transport: TransportKind,
    pub remote_addr: SocketAddr,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub file_bytes_in: u64,
    pub file_bytes_out: u64,
    pub send_count: u64,
    pub recv_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session(id: u32) -> Session {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        Session::new(id, TransportKind::Tcp, "127.0.0.1:9000".parse().unwrap(), tx)
    }

    #[test]
    fn byte_counters_are_monotonically_non_decreasing() {
        let s = make_session(1);
        s.add_bytes_in(10);
        s.add_bytes_in(5);
        let snap = s.snapshot();
        assert_eq!(snap.bytes_in, 15);
        assert_eq!(snap.recv_count, 2);
    }

    #[test]
    fn touch_heartbeat_resets_activity_elapsed_to_near_zero() {
        let s = make_session(2);
        std::thread::sleep(std::time::Duration::from_millis(5));
        s.touch_heartbeat();
        assert!(s.last_activity_elapsed() < std::time::Duration::from_millis(50));
    }

    #[test]
    fn disconnect_flag_starts_true_and_flips_once_marked() {
        let s = make_session(3);
        assert!(s.is_connected());
        s.mark_disconnected();
        assert!(!s.is_connected());
    }
}
