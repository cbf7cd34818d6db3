use std::sync::Arc;

use conduit_shared::{BoundedQueue, CancelToken, Envelope, Packet, Reliability, SessionId};

use crate::{server::StatCounters, ServerConfig, ServerStats};

/// Queues and signals shared between the thread driving a [`Server`] and
/// the application threads using it.
///
/// [`Server`]: crate::Server
pub(crate) struct ServerIo {
    pub inbound: BoundedQueue<Arc<Envelope>>,
    pub outbound: BoundedQueue<Packet>,
    pub disconnects: BoundedQueue<SessionId>,
    pub cancel: CancelToken,
    pub stats: StatCounters,
}

impl ServerIo {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            inbound: BoundedQueue::with_config(&config.inbound),
            outbound: BoundedQueue::with_config(&config.outbound),
            disconnects: BoundedQueue::new(config.disconnect_queue_size),
            cancel: CancelToken::new(),
            stats: StatCounters::default(),
        }
    }
}

/// Cloneable access to a running [`Server`](crate::Server) from application
/// threads. Every method is safe to call from any thread.
#[derive(Clone)]
pub struct ServerHandle {
    io: Arc<ServerIo>,
}

impl ServerHandle {
    pub(crate) fn new(io: Arc<ServerIo>) -> Self {
        Self { io }
    }

    /// Blocks until an envelope arrives from a client. Returns `None` once
    /// the server has stopped and everything received has been read.
    pub fn read(&self) -> Option<Arc<Envelope>> {
        self.io.inbound.pop()
    }

    /// Returns the next received envelope, if one is ready
    pub fn try_read(&self) -> Option<Arc<Envelope>> {
        self.io.inbound.try_pop()
    }

    /// Queues `envelope` for reliable delivery to the session it is
    /// addressed to. Blocks while the outbound queue is full.
    pub fn send(&self, envelope: Arc<Envelope>) {
        self.send_with(envelope, Reliability::Reliable);
    }

    pub fn send_with(&self, envelope: Arc<Envelope>, reliability: Reliability) {
        self.io.outbound.push(Packet::new(envelope, reliability));
    }

    /// Asks the server to close `session_id` on its next iteration
    pub fn request_disconnect(&self, session_id: SessionId) {
        self.io.disconnects.push(session_id);
    }

    /// Makes [`Server::run`](crate::Server::run) return after its current
    /// iteration
    pub fn stop(&self) {
        self.io.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.io.cancel.is_cancelled()
    }

    pub fn stats(&self) -> ServerStats {
        self.io.stats.snapshot()
    }
}
