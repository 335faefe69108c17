use registry::SessionSnapshot;

/// A single session's counter delta since its previous sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionDelta {
    pub id: u32,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub file_bytes_in: u64,
    pub file_bytes_out: u64,
    pub send_count: u64,
    pub recv_count: u64,
}

impl SessionDelta {
    pub(crate) fn between(previous: Option<&SessionSnapshot>, current: &SessionSnapshot) -> Self {
        let zero = SessionSnapshot {
            id: current.id,
            transport: current.transport,
            remote_addr: current.remote_addr,
            bytes_in: 0,
            bytes_out: 0,
            file_bytes_in: 0,
            file_bytes_out: 0,
            send_count: 0,
            recv_count: 0,
        };
        let previous = previous.unwrap_or(&zero);
        SessionDelta {
            id: current.id,
            bytes_in: current.bytes_in.saturating_sub(previous.bytes_in),
            bytes_out: current.bytes_out.saturating_sub(previous.bytes_out),
            file_bytes_in: current.file_bytes_in.saturating_sub(previous.file_bytes_in),
            file_bytes_out: current.file_bytes_out.saturating_sub(previous.file_bytes_out),
            send_count: current.send_count.saturating_sub(previous.send_count),
            recv_count: current.recv_count.saturating_sub(previous.recv_count),
        }
    }

    fn accumulate(&mut self, other: &SessionDelta) {
        self.bytes_in += other.bytes_in;
        self.bytes_out += other.bytes_out;
        self.file_bytes_in += other.file_bytes_in;
        self.file_bytes_out += other.file_bytes_out;
        self.send_count += other.send_count;
        self.recv_count += other.recv_count;
    }
}

/// Aggregated totals across every live session at sample time.
#[derive(Debug, Clone, Default)]
pub struct GlobalTotals {
    pub session_count: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub file_bytes_in: u64,
    pub file_bytes_out: u64,
    pub send_count: u64,
    pub recv_count: u64,
}

/// One sampler tick's output: every session's delta plus the global sum.
#[derive(Debug, Clone, Default)]
pub struct TrafficSample {
    pub sessions: Vec<SessionDelta>,
    pub totals: GlobalTotals,
}

impl TrafficSample {
    pub(crate) fn from_deltas(deltas: Vec<SessionDelta>) -> Self {
        let mut totals = GlobalTotals { session_count: deltas.len(), ..Default::default() };
        let mut running = SessionDelta::default();
        for delta in &deltas {
            running.accumulate(delta);
        }
        totals.bytes_in = running.bytes_in;
        totals.bytes_out = running.bytes_out;
        totals.file_bytes_in = running.file_bytes_in;
        totals.file_bytes_out = running.file_bytes_out;
        totals.send_count = running.send_count;
        totals.recv_count = running.recv_count;
        TrafficSample { sessions: deltas, totals }
    }
}
