use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters of a client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Envelopes received from the server
    pub received: u64,
    /// Packets handed to the transport
    pub sent: u64,
    /// Outbound envelopes discarded because the connection went away
    pub dropped_sends: u64,
    /// Connection attempts made, including the first
    pub connect_attempts: u64,
}

#[derive(Default)]
pub(crate) struct StatCounters {
    received: AtomicU64,
    sent: AtomicU64,
    dropped_sends: AtomicU64,
    connect_attempts: AtomicU64,
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

    pub fn connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ClientStats {
        ClientStats {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped_sends: self.dropped_sends.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
        }
    }
}
