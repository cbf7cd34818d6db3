use std::sync::atomic::{AtomicU8, Ordering};

/// Where the client is in its connect / retry cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientState {
    /// The client thread has not made its first attempt yet
    NotStarted = 0,
    /// A connection attempt is in progress
    Connecting = 1,
    /// Connected; sends are accepted
    Connected = 2,
    /// The server closed the connection gracefully. Terminal.
    Disconnected = 3,
    /// The connection failed or was lost; the client retries after a backoff
    Error = 4,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::NotStarted,
            1 => ClientState::Connecting,
            2 => ClientState::Connected,
            3 => ClientState::Disconnected,
            _ => ClientState::Error,
        }
    }

    /// Whether the client thread will make no further attempts
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientState::Disconnected)
    }
}

pub(crate) struct AtomicClientState(AtomicU8);

impl AtomicClientState {
    pub fn new(state: ClientState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> ClientState {
        ClientState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: ClientState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
