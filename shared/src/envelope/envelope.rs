use std::sync::Arc;

use crate::types::{ChannelId, SessionId};

/// One message unit moving between application threads and the transport.
///
/// The payload is immutable once built, so an `Arc<Envelope>` can sit in a
/// queue slot and in a transport packet at the same time without any lock.
/// It is freed when the last holder lets go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    session_id: SessionId,
    channel_id: ChannelId,
    payload: Box<[u8]>,
}

impl Envelope {
    /// An envelope not bound to any session, as a client sends them
    pub fn new<B: Into<Box<[u8]>>>(channel_id: ChannelId, payload: B) -> Self {
        Self::addressed(SessionId::UNBOUND, channel_id, payload)
    }

    pub fn addressed<B: Into<Box<[u8]>>>(
        session_id: SessionId,
        channel_id: ChannelId,
        payload: B,
    ) -> Self {
        Self {
            session_id,
            channel_id,
            payload: payload.into(),
        }
    }

    /// Convenience for the common case of handing the envelope to a queue
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Builds a reply on the same session and channel
    pub fn reply<B: Into<Box<[u8]>>>(&self, payload: B) -> Self {
        Self::addressed(self.session_id, self.channel_id, payload)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
