use std::sync::Arc;

use super::Envelope;

/// Delivery guarantee requested from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reliability {
    /// Delivered, in order within its channel
    #[default]
    Reliable,
    /// Best effort
    Unreliable,
}

/// A transport-bound packet whose bytes alias an [`Envelope`] payload.
///
/// The packet keeps its own reference to the envelope, so a transport that
/// sends asynchronously can hold on to it for as long as the send takes.
/// Dropping the packet is the release: once both the packet and the queue
/// side have let go, the envelope is freed, exactly once.
#[derive(Debug, Clone)]
pub struct Packet {
    envelope: Arc<Envelope>,
    reliability: Reliability,
}

impl Packet {
    pub fn new(envelope: Arc<Envelope>, reliability: Reliability) -> Self {
        Self {
            envelope,
            reliability,
        }
    }

    pub fn reliable(envelope: Arc<Envelope>) -> Self {
        Self::new(envelope, Reliability::Reliable)
    }

    pub fn data(&self) -> &[u8] {
        self.envelope.payload()
    }

    pub fn reliability(&self) -> Reliability {
        self.reliability
    }

    pub fn envelope(&self) -> &Arc<Envelope> {
        &self.envelope
    }

    pub fn len(&self) -> usize {
        self.envelope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.is_empty()
    }
}
