//! Connection registry (§4.2): the live session table and its history.

mod session;

pub use session::{Session, SessionSnapshot, TransportKind};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

/// Thread-safe `id -> Session` mapping plus a history table of snapshots
/// for sessions that have disconnected.
///
/// Both tables are `dashmap::DashMap`, sharded internally, so lookups on
/// one session never block operations on an unrelated one — the teacher's
/// `AppState` guards a whole `HashMap` behind one `RwLock`; this registry
/// generalizes that to per-shard locking since the server juggles many
/// concurrently-active sessions across four listener kinds.
pub struct ConnectionRegistry {
    live: DashMap<u32, Arc<Session>>,
    history: DashMap<u32, SessionSnapshot>,
    next_id: AtomicU32,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            live: DashMap::new(),
            history: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Allocates a new session id and inserts the session into the live
    /// table. Ids increase strictly and are never reused within a process
    /// lifetime, even across disconnects.
    pub fn create(
        &self,
        transport: TransportKind,
        remote_addr: SocketAddr,
        sink: UnboundedSender<Vec<u8>>,
    ) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(id, transport, remote_addr, sink));
        self.live.insert(id, session.clone());
        session
    }

    pub fn get(&self, id: u32) -> Option<Arc<Session>> {
        self.live.get(&id).map(|entry| entry.clone())
    }

    /// Moves a session from the live table to history, marking it
    /// disconnected. A no-op if `id` is not currently live.
    pub fn remove(&self, id: u32) -> Option<SessionSnapshot> {
        let (_, session) = self.live.remove(&id)?;
        session.mark_disconnected();
        let snapshot = session.snapshot();
        self.history.insert(id, snapshot);
        Some(snapshot)
    }

    pub fn history(&self, id: u32) -> Option<SessionSnapshot> {
        self.history.get(&id).map(|entry| *entry)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Snapshot of every currently-live session, for the heartbeat monitor
    /// and traffic sampler to iterate without holding the registry locked.
    pub fn snapshot_live(&self) -> Vec<Arc<Session>> {
        self.live.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9100".parse().unwrap()
    }

    #[test]
    fn ids_are_strictly_increasing_and_never_reused() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let a = registry.create(TransportKind::Tcp, addr(), tx.clone());
        let b = registry.create(TransportKind::Tcp, addr(), tx.clone());
        assert!(b.id > a.id);
        registry.remove(a.id);
        let c = registry.create(TransportKind::Tcp, addr(), tx);
        assert!(c.id > b.id, "removed ids must not be reused");
    }

    #[test]
    fn remove_moves_session_from_live_to_history() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let session = registry.create(TransportKind::Udp, addr(), tx);
        session.add_bytes_in(42);

        assert!(registry.get(session.id).is_some());
        let snapshot = registry.remove(session.id).expect("session was live");
        assert_eq!(snapshot.bytes_in, 42);
        assert!(registry.get(session.id).is_none());
        assert!(registry.history(session.id).is_some());
    }

    #[test]
    fn removing_an_unknown_id_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        assert!(registry.remove(999).is_none());
    }

    #[test]
    fn snapshot_live_reflects_concurrent_inserts() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        for _ in 0..5 {
            registry.create(TransportKind::Http, addr(), tx.clone());
        }
        assert_eq!(registry.snapshot_live().len(), 5);
        assert_eq!(registry.live_count(), 5);
    }
}
