use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters of a running server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Envelopes received from clients and queued for the application
    pub received: u64,
    /// Packets handed to the transport
    pub sent: u64,
    /// Outbound envelopes dropped, usually because their session was gone
    pub dropped_sends: u64,
    /// Packets received from peers without a session
    pub dropped_receives: u64,
    pub connects: u64,
    pub disconnects: u64,
}

#[derive(Default)]
pub(crate) struct StatCounters {
    received: AtomicU64,
    sent: AtomicU64,
    dropped_sends: AtomicU64,
    dropped_receives: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
}

impl StatCounters {
    pub fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_send(&self) {
        self.dropped_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_receive(&self) {
        self.dropped_receives.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped_sends: self.dropped_sends.load(Ordering::Relaxed),
            dropped_receives: self.dropped_receives.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }
}
